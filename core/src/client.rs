//! Blocking Elephantasm client.
//!
//! # Design
//! `Elephantasm` resolves configuration once, validates inputs locally and
//! then drives `ApiClient` (build/parse) around a `Transport` (I/O). It owns
//! the transport behind a lock so `close()` can release it while other
//! threads share the client; calls already in flight keep their own handle
//! and finish, later calls fail with `Error::Closed`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;

use crate::api::ApiClient;
use crate::config::{Config, Overrides};
use crate::error::{Error, Result};
use crate::transport::{Transport, UreqTransport};
use crate::types::{Anima, AnimaCreate, Event, InjectOptions, MemoryPack, NewEvent};

/// HTTP client for the Elephantasm long-term agentic memory API.
///
/// ```no_run
/// use elephantasm::{Elephantasm, EventType, InjectOptions, NewEvent};
///
/// let client = Elephantasm::builder()
///     .api_key("sk_live_...")
///     .anima_id("my-anima")
///     .build();
/// client.extract(NewEvent::new(EventType::MessageIn, "Hello!"))?;
/// if let Some(pack) = client.inject(InjectOptions::new())? {
///     println!("{}", pack.as_prompt());
/// }
/// # Ok::<(), elephantasm::Error>(())
/// ```
pub struct Elephantasm {
    config: Config,
    transport: RwLock<Option<Arc<dyn Transport>>>,
}

/// Collects explicit settings; anything left unset comes from the
/// environment or the defaults.
#[derive(Default)]
pub struct ClientBuilder {
    overrides: Overrides,
    transport: Option<Arc<dyn Transport>>,
}

impl ClientBuilder {
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.overrides.api_key = Some(api_key.into());
        self
    }

    pub fn anima_id(mut self, anima_id: impl Into<String>) -> Self {
        self.overrides.anima_id = Some(anima_id.into());
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.overrides.endpoint = Some(endpoint.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.overrides.timeout = Some(timeout);
        self
    }

    /// Replace the HTTP transport, e.g. with a recording fake in tests.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn build(self) -> Elephantasm {
        let config = Config::from_env(self.overrides);
        match self.transport {
            Some(transport) => Elephantasm::with_transport(config, transport),
            None => Elephantasm::new(config),
        }
    }
}

impl Elephantasm {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Client configured purely from `ELEPHANTASM_*` variables and defaults.
    pub fn from_env() -> Self {
        Self::builder().build()
    }

    pub fn new(config: Config) -> Self {
        let transport = Arc::new(UreqTransport::new(config.timeout));
        Self::with_transport(config, transport)
    }

    pub fn with_transport(config: Config, transport: Arc<dyn Transport>) -> Self {
        tracing::debug!(?config, "elephantasm client created");
        Self {
            config,
            transport: RwLock::new(Some(transport)),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Fetch the latest memory pack. `None` means the server has not
    /// compiled a pack for this anima yet.
    pub fn inject(&self, options: InjectOptions) -> Result<Option<MemoryPack>> {
        let (api, transport) = self.session()?;
        let anima_id = self.resolve_anima_id(options.anima_id)?;

        let request = api.build_inject(&anima_id, options.query.as_deref(), options.preset);
        let pack = api.parse_inject(transport.execute(&request)?)?;
        if let Some(pack) = &pack {
            tracing::debug!(
                anima_id = %anima_id,
                token_count = pack.token_count,
                max_tokens = pack.max_tokens,
                session_memories = pack.session_memories().len(),
                "memory pack received"
            );
        }
        Ok(pack)
    }

    /// Capture an event for memory synthesis.
    pub fn extract(&self, event: NewEvent) -> Result<Event> {
        let (api, transport) = self.session()?;
        event.validate()?;
        let anima_id = self.resolve_anima_id(event.anima_id.clone())?;

        let create = event.into_create(anima_id, Utc::now());
        let request = api.build_extract(&create)?;
        let created = api.parse_extract(transport.execute(&request)?)?;
        tracing::debug!(event_id = %created.id, event_type = %created.event_type, "event recorded");
        Ok(created)
    }

    /// Create a new anima.
    pub fn create_anima(&self, input: AnimaCreate) -> Result<Anima> {
        let (api, transport) = self.session()?;
        input.validate()?;

        let request = api.build_create_anima(&input)?;
        let anima = api.parse_create_anima(transport.execute(&request)?)?;
        tracing::info!(anima_id = %anima.id, name = %anima.name, "anima created");
        Ok(anima)
    }

    /// Release the HTTP transport. Idempotent; later operations fail with
    /// `Error::Closed`.
    pub fn close(&self) {
        if self.transport.write().take().is_some() {
            tracing::debug!("elephantasm client closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.transport.read().is_none()
    }

    /// Everything a single call needs, checked before any input is looked at.
    fn session(&self) -> Result<(ApiClient, Arc<dyn Transport>)> {
        let transport = self.transport.read().clone().ok_or(Error::Closed)?;
        let api_key = self.config.require_api_key()?;
        Ok((ApiClient::new(&self.config.endpoint, api_key), transport))
    }

    fn resolve_anima_id(&self, explicit: Option<String>) -> Result<String> {
        let present = |id: &String| !id.trim().is_empty();
        explicit
            .filter(present)
            .or_else(|| self.config.anima_id.clone().filter(present))
            .ok_or_else(|| {
                Error::validation("anima_id required. Provide it or set a default anima_id.")
            })
    }
}

impl Drop for Elephantasm {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Elephantasm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Elephantasm")
            .field("config", &self.config)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;

    use super::*;
    use crate::http::{HttpMethod, HttpRequest, HttpResponse};
    use crate::types::{EventType, Preset, Role};

    /// Replays one canned response and records every request it sees.
    struct FakeTransport {
        status: u16,
        body: String,
        calls: AtomicUsize,
        last: Mutex<Option<HttpRequest>>,
    }

    impl FakeTransport {
        fn new(status: u16, body: &str) -> Arc<Self> {
            Arc::new(Self {
                status,
                body: body.to_string(),
                calls: AtomicUsize::new(0),
                last: Mutex::new(None),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn last_body(&self) -> serde_json::Value {
            let last = self.last.lock();
            let body = last.as_ref().and_then(|r| r.body.as_deref()).unwrap();
            serde_json::from_str(body).unwrap()
        }
    }

    impl Transport for FakeTransport {
        fn execute(&self, request: &HttpRequest) -> Result<HttpResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last.lock() = Some(request.clone());
            Ok(HttpResponse {
                status: self.status,
                headers: Vec::new(),
                body: self.body.clone(),
            })
        }
    }

    fn config(anima_id: Option<&str>) -> Config {
        Config {
            api_key: Some("sk_test_abc123".to_string()),
            anima_id: anima_id.map(str::to_string),
            endpoint: "https://test.api.elephantasm.com".to_string(),
            ..Config::default()
        }
    }

    const EVENT_BODY: &str = r#"{
        "id": "e-1", "anima_id": "a1", "event_type": "message.in",
        "content": "hi", "meta": {},
        "created_at": "2025-01-01T00:00:00Z", "updated_at": "2025-01-01T00:00:00Z"
    }"#;

    const PACK_BODY: &str = r#"{
        "id": "p-1", "anima_id": "a1", "preset_name": "conversational",
        "session_memory_count": 2, "token_count": 120, "max_tokens": 2000,
        "content": {"session_memories": [
            {"id": "m1", "summary": "Discussed the launch plan", "score": 0.92},
            {"id": "m2", "summary": "User dislikes long answers", "score": 0.61}
        ]},
        "compiled_at": "2025-01-01T00:00:00Z", "created_at": "2025-01-01T00:00:00Z"
    }"#;

    #[test]
    fn missing_api_key_fails_before_network() {
        let fake = FakeTransport::new(200, EVENT_BODY);
        let client = Elephantasm::with_transport(
            Config {
                api_key: None,
                ..config(Some("a1"))
            },
            fake.clone(),
        );

        let err = client.extract(NewEvent::new(EventType::MessageIn, "hi")).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        let err = client.inject(InjectOptions::new()).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        let err = client.create_anima(AnimaCreate::new("bot")).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert_eq!(fake.calls(), 0);
    }

    #[test]
    fn blank_configured_values_fail_before_network() {
        let fake = FakeTransport::new(200, PACK_BODY);
        let overrides = Overrides {
            api_key: Some(String::new()),
            anima_id: Some(String::new()),
            endpoint: Some("http://x.test".into()),
            timeout: None,
        };
        let client = Elephantasm::with_transport(Config::resolve(overrides, |_| None), fake.clone());

        let err = client.inject(InjectOptions::new()).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)), "{err:?}");
        let err = client.extract(NewEvent::new(EventType::MessageIn, "hi")).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)), "{err:?}");
        assert_eq!(fake.calls(), 0);

        // A key is present but the only anima id is blank.
        let client = Elephantasm::with_transport(
            Config {
                anima_id: Some("  ".into()),
                ..config(None)
            },
            fake.clone(),
        );
        let err = client.inject(InjectOptions::new()).unwrap_err();
        assert!(matches!(err, Error::Validation { status: None, .. }), "{err:?}");
        let err = client.extract(NewEvent::new(EventType::MessageIn, "hi")).unwrap_err();
        assert!(matches!(err, Error::Validation { status: None, .. }), "{err:?}");
        let err = client
            .inject(InjectOptions::new().anima_id(""))
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }), "{err:?}");
        assert_eq!(fake.calls(), 0);
    }

    #[test]
    fn empty_content_fails_before_network() {
        let fake = FakeTransport::new(201, EVENT_BODY);
        let client = Elephantasm::with_transport(config(Some("a1")), fake.clone());

        let err = client.extract(NewEvent::new(EventType::MessageIn, "")).unwrap_err();
        assert!(matches!(err, Error::Validation { status: None, .. }));
        assert_eq!(fake.calls(), 0);
    }

    #[test]
    fn inject_without_anima_id_fails_before_network() {
        let fake = FakeTransport::new(200, PACK_BODY);
        let client = Elephantasm::with_transport(config(None), fake.clone());

        let err = client.inject(InjectOptions::new().preset(Preset::Conversational)).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert!(err.to_string().contains("anima_id required"));
        assert_eq!(fake.calls(), 0);
    }

    #[test]
    fn empty_anima_name_fails_before_network() {
        let fake = FakeTransport::new(201, "{}");
        let client = Elephantasm::with_transport(config(None), fake.clone());

        assert!(matches!(
            client.create_anima(AnimaCreate::new("")).unwrap_err(),
            Error::Validation { .. }
        ));
        assert_eq!(fake.calls(), 0);
    }

    #[test]
    fn extract_sends_typed_event() {
        let fake = FakeTransport::new(201, EVENT_BODY);
        let client = Elephantasm::with_transport(config(None), fake.clone());

        let event = client
            .extract(
                NewEvent::new(EventType::MessageIn, "hi")
                    .with_anima_id("a1")
                    .with_role(Role::User)
                    .with_session_id("session-123"),
            )
            .unwrap();
        assert_eq!(event.id, "e-1");
        assert_eq!(event.kind().unwrap(), EventType::MessageIn);

        let body = fake.last_body();
        assert_eq!(body["event_type"], "message.in");
        assert_eq!(body["content"], "hi");
        assert_eq!(body["anima_id"], "a1");
        assert_eq!(body["session_id"], "session-123");
        assert!(body["occurred_at"].is_string(), "occurred_at defaults to now");
    }

    #[test]
    fn explicit_anima_id_overrides_default() {
        let fake = FakeTransport::new(200, PACK_BODY);
        let client = Elephantasm::with_transport(config(Some("default-anima")), fake.clone());

        client.inject(InjectOptions::new().anima_id("a1")).unwrap();
        let url = fake.last.lock().as_ref().unwrap().url.clone();
        assert!(url.contains("/animas/a1/"), "{url}");

        client.inject(InjectOptions::new()).unwrap();
        let url = fake.last.lock().as_ref().unwrap().url.clone();
        assert!(url.contains("/animas/default-anima/"), "{url}");
    }

    #[test]
    fn inject_returns_pack_in_received_order() {
        let fake = FakeTransport::new(200, PACK_BODY);
        let client = Elephantasm::with_transport(config(Some("a1")), fake.clone());

        let pack = client
            .inject(InjectOptions::new().preset(Preset::Conversational))
            .unwrap()
            .unwrap();
        assert!(pack.token_count <= pack.max_tokens);
        assert_eq!(pack.token_count, 120);

        let prompt = pack.as_prompt();
        let first = prompt.find("Discussed the launch plan").unwrap();
        let second = prompt.find("User dislikes long answers").unwrap();
        assert!(first < second);

        let sent = fake.last.lock().clone().unwrap();
        assert_eq!(sent.method, HttpMethod::Get);
        assert!(sent.url.ends_with("?preset=conversational"));
    }

    #[test]
    fn each_inject_refetches() {
        let fake = FakeTransport::new(200, PACK_BODY);
        let client = Elephantasm::with_transport(config(Some("a1")), fake.clone());
        client.inject(InjectOptions::new()).unwrap();
        client.inject(InjectOptions::new()).unwrap();
        assert_eq!(fake.calls(), 2);
    }

    #[test]
    fn server_status_surfaces_as_error() {
        let fake = FakeTransport::new(401, r#"{"detail":"Invalid API key"}"#);
        let client = Elephantasm::with_transport(config(Some("a1")), fake.clone());

        let err = client.inject(InjectOptions::new()).unwrap_err();
        assert!(matches!(err, Error::Authentication { status: 401, .. }));
        assert_eq!(fake.calls(), 1, "no automatic retry");
    }

    #[test]
    fn closed_client_rejects_operations() {
        let fake = FakeTransport::new(200, PACK_BODY);
        let client = Elephantasm::with_transport(config(Some("a1")), fake.clone());
        assert!(!client.is_closed());

        client.close();
        client.close();
        assert!(client.is_closed());

        assert!(matches!(client.inject(InjectOptions::new()).unwrap_err(), Error::Closed));
        assert!(matches!(
            client.extract(NewEvent::new(EventType::System, "boot")).unwrap_err(),
            Error::Closed
        ));
        assert!(matches!(client.create_anima(AnimaCreate::new("bot")).unwrap_err(), Error::Closed));
        assert_eq!(fake.calls(), 0);
    }

    #[test]
    fn dropping_client_releases_transport() {
        let fake = FakeTransport::new(200, PACK_BODY);
        {
            let _client = Elephantasm::with_transport(config(Some("a1")), fake.clone());
            assert_eq!(Arc::strong_count(&fake), 2);
        }
        assert_eq!(Arc::strong_count(&fake), 1);
    }
}
