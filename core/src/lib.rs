//! Blocking client for the Elephantasm long-term agentic memory API.
//!
//! # Overview
//! Capture conversational events with `extract`, fetch an assembled,
//! token-budgeted memory pack with `inject`, and create agent entities
//! (animas) with `create_anima`. Use an explicit [`Elephantasm`] client, or
//! the module-level functions that share one lazily created default client.
//!
//! # Design
//! - `ApiClient` builds `HttpRequest`s and parses `HttpResponse`s without
//!   touching the network; `Transport` performs the round-trip. The split
//!   keeps the request/response contract testable without sockets.
//! - Configuration resolves as explicit value > `ELEPHANTASM_*` environment
//!   variable > default, once, at construction.
//! - Every failure is an [`Error`] with an [`ErrorKind`]. Nothing is retried
//!   internally; `Error::is_retryable` tells the caller when retrying makes
//!   sense.
//! - Model types are defined independently from the mock-server crate;
//!   integration tests catch schema drift.

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod functions;
pub mod http;
pub mod transport;
pub mod types;

pub use api::ApiClient;
pub use client::{ClientBuilder, Elephantasm};
pub use config::Config;
pub use error::{Error, ErrorKind, Result};
pub use functions::{create_anima, default_client, extract, inject};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use transport::{Transport, UreqTransport};
pub use types::{
    Anima, AnimaCreate, Event, EventCreate, EventType, IdentityContext, InjectOptions, Memory,
    MemoryPack, MemoryState, Metadata, NewEvent, PackContent, Preset, Role, ScoredKnowledge,
    ScoredMemory, TemporalContext,
};
