//! Capture a short exchange and print the resulting memory pack.
//!
//! Run against the mock server:
//!
//! ```sh
//! cargo run -p mock-server &
//! ELEPHANTASM_API_KEY=sk_test_mock ELEPHANTASM_ENDPOINT=http://127.0.0.1:8000 \
//!     cargo run -p elephantasm --example basic_usage
//! ```

use elephantasm::{AnimaCreate, EventType, InjectOptions, NewEvent, Preset, Role};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), elephantasm::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("elephantasm=debug")))
        .init();

    let anima = elephantasm::create_anima(AnimaCreate::new("demo-agent").with_description("Example agent"))?;
    println!("created anima {} ({})", anima.name, anima.id);

    elephantasm::extract(
        NewEvent::new(EventType::MessageIn, "Hello! Can you help me plan a trip?")
            .with_anima_id(&anima.id)
            .with_role(Role::User),
    )?;
    elephantasm::extract(
        NewEvent::new(EventType::MessageOut, "Of course. Where would you like to go?")
            .with_anima_id(&anima.id)
            .with_role(Role::Assistant),
    )?;

    match elephantasm::inject(InjectOptions::new().anima_id(&anima.id).preset(Preset::Conversational))? {
        Some(pack) => {
            println!("pack uses {}/{} tokens", pack.token_count, pack.max_tokens);
            println!("You are a helpful assistant.\n\n{}", pack.as_prompt());
        }
        None => println!("no memory pack compiled yet"),
    }
    Ok(())
}
