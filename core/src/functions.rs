//! Module-level convenience functions backed by a shared default client.
//!
//! The default client is built from `ELEPHANTASM_*` variables on first use
//! and lives for the rest of the process. It is never closed; code that
//! needs deterministic release of connections should own an `Elephantasm`.

use std::sync::OnceLock;

use crate::client::Elephantasm;
use crate::error::Result;
use crate::types::{Anima, AnimaCreate, Event, InjectOptions, MemoryPack, NewEvent};

static DEFAULT_CLIENT: OnceLock<Elephantasm> = OnceLock::new();

/// The process-wide client. Concurrent first calls construct exactly one.
pub fn default_client() -> &'static Elephantasm {
    DEFAULT_CLIENT.get_or_init(|| {
        tracing::debug!("initializing default elephantasm client from environment");
        Elephantasm::from_env()
    })
}

/// Fetch the latest memory pack using the default client.
///
/// ```no_run
/// use elephantasm::InjectOptions;
///
/// if let Some(pack) = elephantasm::inject(InjectOptions::new())? {
///     let system_prompt = format!("You are a helpful assistant.\n\n{}", pack.as_prompt());
///     println!("{system_prompt}");
/// }
/// # Ok::<(), elephantasm::Error>(())
/// ```
pub fn inject(options: InjectOptions) -> Result<Option<MemoryPack>> {
    default_client().inject(options)
}

/// Capture an event using the default client.
pub fn extract(event: NewEvent) -> Result<Event> {
    default_client().extract(event)
}

/// Create an anima using the default client.
pub fn create_anima(input: AnimaCreate) -> Result<Anima> {
    default_client().create_anima(input)
}
