use std::{collections::HashMap, sync::Arc, time::Duration};

use axum::{
    extract::{Path, Query, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

pub const DEFAULT_MAX_TOKENS: u32 = 4000;
const EVENT_TYPES: [&str; 5] = ["message.in", "message.out", "tool.call", "tool.result", "system"];
const PRESETS: [&str; 2] = ["conversational", "self_determined"];

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Anima {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub meta: Option<Map<String, Value>>,
    pub user_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Deserialize)]
pub struct AnimaCreate {
    pub name: String,
    pub description: Option<String>,
    pub meta: Option<Map<String, Value>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub anima_id: Uuid,
    pub event_type: String,
    pub role: Option<String>,
    pub author: Option<String>,
    pub summary: Option<String>,
    pub content: String,
    pub occurred_at: Option<DateTime<Utc>>,
    pub session_id: Option<String>,
    pub meta: Map<String, Value>,
    pub source_uri: Option<String>,
    pub dedupe_key: Option<String>,
    pub importance_score: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Deserialize)]
pub struct EventCreate {
    pub anima_id: String,
    pub event_type: String,
    pub content: String,
    pub role: Option<String>,
    pub author: Option<String>,
    pub summary: Option<String>,
    pub occurred_at: Option<DateTime<Utc>>,
    pub session_id: Option<String>,
    #[serde(default)]
    pub meta: Map<String, Value>,
    pub source_uri: Option<String>,
    pub dedupe_key: Option<String>,
    pub importance_score: Option<f64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScoredMemory {
    pub id: Uuid,
    pub summary: Option<String>,
    pub score: f64,
    pub reason: Option<String>,
    pub breakdown: HashMap<String, f64>,
    pub similarity: Option<f64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TemporalContext {
    pub last_event_at: DateTime<Utc>,
    pub hours_ago: f64,
    pub memory_summary: Option<String>,
    pub formatted: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PackContent {
    pub context: String,
    pub session_memories: Vec<ScoredMemory>,
    pub temporal_context: Option<TemporalContext>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MemoryPack {
    pub id: Uuid,
    pub anima_id: Uuid,
    pub query: Option<String>,
    pub preset_name: String,
    pub session_memory_count: u32,
    pub knowledge_count: u32,
    pub long_term_memory_count: u32,
    pub has_identity: bool,
    pub token_count: u32,
    pub max_tokens: u32,
    pub content: PackContent,
    pub compiled_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Deserialize)]
pub struct PackParams {
    pub query: Option<String>,
    pub preset: Option<String>,
}

#[derive(Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn api_error(status: StatusCode, detail: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorBody {
            detail: detail.into(),
        }),
    )
}

#[derive(Default)]
pub struct Store {
    animas: HashMap<Uuid, Anima>,
    events: Vec<Event>,
}

pub type Db = Arc<RwLock<Store>>;

#[derive(Clone)]
pub struct AppState {
    db: Db,
    api_key: Arc<str>,
}

/// Router serving the memory API, accepting only `Bearer {api_key}`.
pub fn app(api_key: &str) -> Router {
    let state = AppState {
        db: Arc::new(RwLock::new(Store::default())),
        api_key: Arc::from(api_key),
    };
    let api = Router::new()
        .route("/animas", post(create_anima))
        .route("/animas/{id}/memory-packs/latest", get(latest_pack))
        .route("/events", post(create_event))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key))
        .with_state(state);
    Router::new().nest("/api", api)
}

/// Router answering every request with `status` and `{"detail": detail}`.
pub fn fixed_status(status: u16, detail: &'static str) -> Router {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    Router::new().fallback(move || async move { api_error(status, detail) })
}

/// Router answering every request with `null`, after `delay`.
pub fn slow(delay: Duration) -> Router {
    Router::new().fallback(move || async move {
        tokio::time::sleep(delay).await;
        Json(Value::Null)
    })
}

pub async fn run(listener: TcpListener, api_key: &str) -> Result<(), std::io::Error> {
    serve(listener, app(api_key)).await
}

pub async fn serve(listener: TcpListener, router: Router) -> Result<(), std::io::Error> {
    axum::serve(listener, router).await
}

async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "));

    match token {
        Some(token) if token == &*state.api_key => Ok(next.run(request).await),
        Some(_) => {
            tracing::warn!("invalid API key attempted");
            Err(api_error(StatusCode::UNAUTHORIZED, "Invalid API key"))
        }
        None => {
            tracing::warn!("missing bearer token");
            Err(api_error(StatusCode::UNAUTHORIZED, "Missing API key"))
        }
    }
}

async fn create_anima(
    State(state): State<AppState>,
    Json(input): Json<AnimaCreate>,
) -> Result<(StatusCode, Json<Anima>), ApiError> {
    if input.name.trim().is_empty() || input.name.chars().count() > 255 {
        return Err(api_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "name must be between 1 and 255 characters",
        ));
    }
    let now = Utc::now();
    let anima = Anima {
        id: Uuid::new_v4(),
        name: input.name,
        description: input.description,
        meta: input.meta,
        user_id: None,
        created_at: now,
        updated_at: now,
    };
    state.db.write().await.animas.insert(anima.id, anima.clone());
    tracing::info!(anima_id = %anima.id, "anima created");
    Ok((StatusCode::CREATED, Json(anima)))
}

async fn create_event(
    State(state): State<AppState>,
    Json(input): Json<EventCreate>,
) -> Result<(StatusCode, Json<Event>), ApiError> {
    if !EVENT_TYPES.contains(&input.event_type.as_str()) {
        return Err(api_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("Invalid event_type '{}'", input.event_type),
        ));
    }
    if input.content.trim().is_empty() {
        return Err(api_error(StatusCode::UNPROCESSABLE_ENTITY, "content must not be empty"));
    }
    if let Some(score) = input.importance_score {
        if !(0.0..=1.0).contains(&score) {
            return Err(api_error(
                StatusCode::UNPROCESSABLE_ENTITY,
                "importance_score must be between 0.0 and 1.0",
            ));
        }
    }

    let mut store = state.db.write().await;
    let anima_id = find_anima(&store, &input.anima_id)?;
    let now = Utc::now();
    let event = Event {
        id: Uuid::new_v4(),
        anima_id,
        event_type: input.event_type,
        role: input.role,
        author: input.author,
        summary: input.summary,
        content: input.content,
        occurred_at: Some(input.occurred_at.unwrap_or(now)),
        session_id: input.session_id,
        meta: input.meta,
        source_uri: input.source_uri,
        dedupe_key: input.dedupe_key,
        importance_score: input.importance_score,
        created_at: now,
        updated_at: now,
    };
    store.events.push(event.clone());
    Ok((StatusCode::CREATED, Json(event)))
}

async fn latest_pack(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<PackParams>,
) -> Result<Json<Option<MemoryPack>>, ApiError> {
    let preset = params.preset.as_deref().unwrap_or("conversational");
    if !PRESETS.contains(&preset) {
        return Err(api_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("Unknown preset '{preset}'"),
        ));
    }

    let store = state.db.read().await;
    let anima_id = find_anima(&store, &id)?;
    Ok(Json(compile_pack(
        &store,
        anima_id,
        params.query.as_deref(),
        preset,
        Utc::now(),
    )))
}

fn find_anima(store: &Store, id: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(id)
        .ok()
        .filter(|id| store.animas.contains_key(id))
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Anima not found"))
}

/// Rough token estimate: four characters per token.
fn estimate_tokens(text: &str) -> u32 {
    (text.chars().count() as u32).div_ceil(4)
}

/// Newest events first, scored by recency, cut off at the token budget.
///
/// `conversational` only looks at message events; `self_determined` at all
/// of them. A query keeps events whose content mentions it. Returns `None`
/// while the anima has no matching events.
pub fn compile_pack(
    store: &Store,
    anima_id: Uuid,
    query: Option<&str>,
    preset: &str,
    now: DateTime<Utc>,
) -> Option<MemoryPack> {
    let needle = query.map(str::to_lowercase);
    let mut events: Vec<&Event> = store
        .events
        .iter()
        .filter(|e| e.anima_id == anima_id)
        .filter(|e| preset != "conversational" || e.event_type.starts_with("message."))
        .filter(|e| match &needle {
            Some(n) => e.content.to_lowercase().contains(n.as_str()),
            None => true,
        })
        .collect();
    if events.is_empty() {
        return None;
    }
    // Stable sort keeps insertion order among equal timestamps; reversed
    // afterwards so the newest event wins ties too.
    events.sort_by_key(|e| e.occurred_at.unwrap_or(e.created_at));
    events.reverse();

    let mut token_count = 0;
    let mut memories = Vec::new();
    for (rank, event) in events.iter().enumerate() {
        let summary = event.summary.clone().unwrap_or_else(|| event.content.clone());
        let cost = estimate_tokens(&summary) + 2;
        if token_count + cost > DEFAULT_MAX_TOKENS {
            break;
        }
        token_count += cost;
        let recency = 1.0 / (rank as f64 + 1.0);
        let importance = event.importance_score.unwrap_or(0.5);
        memories.push(ScoredMemory {
            id: event.id,
            summary: Some(summary),
            score: (recency + importance) / 2.0,
            reason: Some("recent interaction".to_string()),
            breakdown: HashMap::from([
                ("recency".to_string(), recency),
                ("importance".to_string(), importance),
            ]),
            similarity: needle.as_ref().map(|_| 1.0),
        });
    }

    let last_event_at = events[0].occurred_at.unwrap_or(events[0].created_at);
    let hours_ago = (now - last_event_at).num_seconds().max(0) as f64 / 3600.0;
    let lines: Vec<String> = memories
        .iter()
        .filter_map(|m| m.summary.as_deref())
        .map(|s| format!("- {s}"))
        .collect();

    Some(MemoryPack {
        id: Uuid::new_v4(),
        anima_id,
        query: query.map(str::to_string),
        preset_name: preset.to_string(),
        session_memory_count: memories.len() as u32,
        knowledge_count: 0,
        long_term_memory_count: 0,
        has_identity: false,
        token_count,
        max_tokens: DEFAULT_MAX_TOKENS,
        content: PackContent {
            context: format!("## Session Memories\n{}", lines.join("\n")),
            session_memories: memories,
            temporal_context: Some(TemporalContext {
                last_event_at,
                hours_ago,
                memory_summary: None,
                formatted: format!("Your last interaction was {hours_ago:.1} hours ago."),
            }),
        },
        compiled_at: now,
        created_at: now,
    })
}
