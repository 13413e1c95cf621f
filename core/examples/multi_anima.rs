//! One anima per user, each with its own isolated memory.
//!
//! Uses an owned client instead of the process default so its connections
//! are released when it goes out of scope.
//!
//! ```sh
//! cargo run -p mock-server &
//! ELEPHANTASM_API_KEY=sk_test_mock ELEPHANTASM_ENDPOINT=http://127.0.0.1:8000 \
//!     cargo run -p elephantasm --example multi_anima
//! ```

use elephantasm::{
    Anima, AnimaCreate, Elephantasm, EventType, InjectOptions, MemoryPack, Metadata, NewEvent,
    Role,
};
use serde_json::json;
use tracing_subscriber::EnvFilter;

struct User {
    id: &'static str,
    name: &'static str,
}

fn create_user_agent(client: &Elephantasm, user: &User) -> elephantasm::Result<Anima> {
    let mut meta = Metadata::new();
    meta.insert("user_id".into(), json!(user.id));
    meta.insert("user_name".into(), json!(user.name));
    meta.insert("created_by".into(), json!("multi_anima_example"));

    let anima = client.create_anima(
        AnimaCreate::new(format!("Agent for {}", user.name))
            .with_description(format!("Personal assistant for user {}", user.id))
            .with_meta(meta),
    )?;
    println!("created anima {} for {}", anima.id, user.name);
    Ok(anima)
}

/// Fetch the user's context, then record their message.
fn chat_with_user(
    client: &Elephantasm,
    anima_id: &str,
    message: &str,
    session_id: &str,
) -> elephantasm::Result<Option<MemoryPack>> {
    let pack = client.inject(InjectOptions::new().anima_id(anima_id).query(message))?;
    client.extract(
        NewEvent::new(EventType::MessageIn, message)
            .with_anima_id(anima_id)
            .with_session_id(session_id)
            .with_role(Role::User),
    )?;
    Ok(pack)
}

fn session_count(pack: &Option<MemoryPack>) -> u32 {
    pack.as_ref().map_or(0, |p| p.session_memory_count)
}

fn main() -> elephantasm::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("elephantasm=info")))
        .init();

    let users = [
        User { id: "user-alice-123", name: "Alice" },
        User { id: "user-bob-456", name: "Bob" },
    ];

    {
        let client = Elephantasm::from_env();

        let alice = create_user_agent(&client, &users[0])?;
        let bob = create_user_agent(&client, &users[1])?;

        let pack = chat_with_user(&client, &alice.id, "I prefer morning meetings", "alice-session-001")?;
        println!("Alice's context has {} session memories", session_count(&pack));
        let pack = chat_with_user(&client, &bob.id, "I work best in the afternoon", "bob-session-001")?;
        println!("Bob's context has {} session memories", session_count(&pack));

        for (who, anima, other) in [("Alice", &alice, "afternoon"), ("Bob", &bob, "morning")] {
            match client.inject(InjectOptions::new().anima_id(&anima.id))? {
                Some(pack) => {
                    let prompt = pack.as_prompt();
                    println!(
                        "{who}'s pack: {} tokens, mentions {other}: {}",
                        pack.token_count,
                        prompt.contains(other)
                    );
                }
                None => println!("{who}'s pack: not compiled yet"),
            }
        }

        client.close();
        assert!(client.is_closed());
        match client.inject(InjectOptions::new().anima_id(&alice.id)) {
            Err(elephantasm::Error::Closed) => println!("client closed; further calls are rejected"),
            other => println!("unexpected result after close: {other:?}"),
        }
    }

    // A client dropped without an explicit close releases its transport too.
    let scoped = Elephantasm::from_env();
    drop(scoped);
    Ok(())
}
