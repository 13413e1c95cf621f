//! Wire models for the Elephantasm API.
//!
//! # Design
//! Response models (`Anima`, `Event`, `MemoryPack`) mirror the server schema
//! and are plain owned values with no link back to the client. Request
//! inputs (`AnimaCreate`, `NewEvent`, `InjectOptions`) are what callers
//! build; `EventCreate` is the fully resolved body actually sent.
//!
//! Enumerations parse from strings through `FromStr`, failing with
//! `Error::Validation` so a bad label is rejected before any request leaves
//! the process.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Free-form key/value metadata attached to animas and events.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

/// Kind of captured interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "message.in")]
    MessageIn,
    #[serde(rename = "message.out")]
    MessageOut,
    #[serde(rename = "tool.call")]
    ToolCall,
    #[serde(rename = "tool.result")]
    ToolResult,
    #[serde(rename = "system")]
    System,
}

impl EventType {
    pub const ALL: [EventType; 5] = [
        EventType::MessageIn,
        EventType::MessageOut,
        EventType::ToolCall,
        EventType::ToolResult,
        EventType::System,
    ];

    /// Label used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::MessageIn => "message.in",
            EventType::MessageOut => "message.out",
            EventType::ToolCall => "tool.call",
            EventType::ToolResult => "tool.result",
            EventType::System => "system",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepts the wire label (`message.in`) or the constant name
/// (`MESSAGE_IN`), ignoring case.
impl FromStr for EventType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', ".");
        EventType::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| {
                let valid: Vec<&str> = EventType::ALL.iter().map(|t| t.as_str()).collect();
                Error::validation(format!(
                    "Invalid event_type '{s}'. Must be one of: {}",
                    valid.join(", ")
                ))
            })
    }
}

/// Speaker of a message event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Tool => "tool",
        }
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            "tool" => Ok(Role::Tool),
            _ => Err(Error::validation(format!(
                "Invalid role '{s}'. Must be one of: user, assistant, system, tool"
            ))),
        }
    }
}

/// Named server-side strategy for assembling a memory pack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    Conversational,
    SelfDetermined,
}

impl Preset {
    pub fn as_str(&self) -> &'static str {
        match self {
            Preset::Conversational => "conversational",
            Preset::SelfDetermined => "self_determined",
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Preset {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "conversational" => Ok(Preset::Conversational),
            "self_determined" => Ok(Preset::SelfDetermined),
            _ => Err(Error::validation(format!(
                "Invalid preset '{s}'. Must be one of: conversational, self_determined"
            ))),
        }
    }
}

/// Lifecycle state of a server-side memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryState {
    Active,
    Decaying,
    Archived,
}

// ---------------------------------------------------------------------------
// Anima
// ---------------------------------------------------------------------------

/// Agent entity that owns memories and events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Anima {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub meta: Option<Metadata>,
    #[serde(default)]
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request payload for creating an anima.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnimaCreate {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Metadata>,
}

impl AnimaCreate {
    pub const MAX_NAME_LEN: usize = 255;

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            meta: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_meta(mut self, meta: Metadata) -> Self {
        self.meta = Some(meta);
        self
    }

    pub(crate) fn validate(&self) -> Result<(), Error> {
        if self.name.trim().is_empty() {
            return Err(Error::validation("name must not be empty"));
        }
        if self.name.chars().count() > Self::MAX_NAME_LEN {
            return Err(Error::validation(format!(
                "name must be at most {} characters",
                Self::MAX_NAME_LEN
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// Atomic unit of experience as stored by the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub id: String,
    pub anima_id: String,
    pub event_type: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    pub content: String,
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub meta: Metadata,
    #[serde(default)]
    pub source_uri: Option<String>,
    #[serde(default)]
    pub dedupe_key: Option<String>,
    #[serde(default)]
    pub importance_score: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Event {
    /// The stored `event_type` as a typed value. Fails for labels this
    /// client version does not know.
    pub fn kind(&self) -> Result<EventType, Error> {
        self.event_type.parse()
    }
}

/// Caller-side description of an event to capture.
///
/// `anima_id` falls back to the client's configured default and
/// `occurred_at` to the time of the call.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub event_type: EventType,
    pub content: String,
    pub anima_id: Option<String>,
    pub session_id: Option<String>,
    pub role: Option<Role>,
    pub author: Option<String>,
    pub summary: Option<String>,
    pub occurred_at: Option<DateTime<Utc>>,
    pub meta: Option<Metadata>,
    pub source_uri: Option<String>,
    pub dedupe_key: Option<String>,
    pub importance_score: Option<f64>,
}

impl NewEvent {
    pub fn new(event_type: EventType, content: impl Into<String>) -> Self {
        Self {
            event_type,
            content: content.into(),
            anima_id: None,
            session_id: None,
            role: None,
            author: None,
            summary: None,
            occurred_at: None,
            meta: None,
            source_uri: None,
            dedupe_key: None,
            importance_score: None,
        }
    }

    /// Like `new`, but takes the event type as a label such as
    /// `"message.in"` or `"MESSAGE_IN"`.
    pub fn parse(event_type: &str, content: impl Into<String>) -> Result<Self, Error> {
        Ok(Self::new(event_type.parse()?, content))
    }

    pub fn with_anima_id(mut self, anima_id: impl Into<String>) -> Self {
        self.anima_id = Some(anima_id.into());
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn with_occurred_at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = Some(occurred_at);
        self
    }

    pub fn with_meta(mut self, meta: Metadata) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn with_source_uri(mut self, source_uri: impl Into<String>) -> Self {
        self.source_uri = Some(source_uri.into());
        self
    }

    pub fn with_dedupe_key(mut self, dedupe_key: impl Into<String>) -> Self {
        self.dedupe_key = Some(dedupe_key.into());
        self
    }

    pub fn with_importance_score(mut self, score: f64) -> Self {
        self.importance_score = Some(score);
        self
    }

    /// Check the fields the server would reject anyway, without sending.
    pub(crate) fn validate(&self) -> Result<(), Error> {
        if self.content.trim().is_empty() {
            return Err(Error::validation("content must not be empty"));
        }
        if let Some(score) = self.importance_score {
            if !(0.0..=1.0).contains(&score) {
                return Err(Error::validation(format!(
                    "importance_score must be between 0.0 and 1.0, got {score}"
                )));
            }
        }
        Ok(())
    }

    /// Resolve into the request body, filling the anima and timestamp.
    pub(crate) fn into_create(self, anima_id: String, now: DateTime<Utc>) -> EventCreate {
        EventCreate {
            anima_id,
            event_type: self.event_type,
            content: self.content,
            role: self.role,
            author: self.author,
            summary: self.summary,
            occurred_at: self.occurred_at.unwrap_or(now),
            session_id: self.session_id,
            meta: self.meta.unwrap_or_default(),
            source_uri: self.source_uri,
            dedupe_key: self.dedupe_key,
            importance_score: self.importance_score,
        }
    }
}

/// Request payload for `POST /events`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventCreate {
    pub anima_id: String,
    pub event_type: EventType,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub occurred_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub meta: Metadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dedupe_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importance_score: Option<f64>,
}

// ---------------------------------------------------------------------------
// Memory pack
// ---------------------------------------------------------------------------

/// Parameters for `inject`. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InjectOptions {
    pub anima_id: Option<String>,
    pub query: Option<String>,
    pub preset: Option<Preset>,
}

impl InjectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn anima_id(mut self, anima_id: impl Into<String>) -> Self {
        self.anima_id = Some(anima_id.into());
        self
    }

    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn preset(mut self, preset: Preset) -> Self {
        self.preset = Some(preset);
        self
    }
}

/// Subjective interpretation of events, as stored by the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Memory {
    pub id: String,
    pub anima_id: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub importance: Option<f64>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub state: Option<MemoryState>,
    #[serde(default)]
    pub recency_score: Option<f64>,
    #[serde(default)]
    pub decay_score: Option<f64>,
    #[serde(default)]
    pub time_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub time_end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub meta: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Memory selected into a pack, with its scoring breakdown.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredMemory {
    pub id: String,
    #[serde(default)]
    pub summary: Option<String>,
    pub score: f64,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub breakdown: BTreeMap<String, f64>,
    #[serde(default)]
    pub similarity: Option<f64>,
}

/// Knowledge item selected into a pack.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredKnowledge {
    pub id: String,
    pub content: String,
    #[serde(rename = "type")]
    pub knowledge_type: String,
    pub score: f64,
    #[serde(default)]
    pub similarity: Option<f64>,
}

/// Time since the anima's last interaction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TemporalContext {
    pub last_event_at: DateTime<Utc>,
    pub hours_ago: f64,
    #[serde(default)]
    pub memory_summary: Option<String>,
    pub formatted: String,
}

/// Identity layer of a pack.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IdentityContext {
    #[serde(default)]
    pub personality_type: Option<String>,
    #[serde(default)]
    pub communication_style: Option<String>,
    #[serde(default)]
    pub self_reflection: Option<Metadata>,
    #[serde(default)]
    pub prose: Option<String>,
}

impl IdentityContext {
    fn render(&self) -> Option<String> {
        if let Some(prose) = self.prose.as_deref().filter(|p| !p.trim().is_empty()) {
            return Some(prose.to_string());
        }
        let mut lines = Vec::new();
        if let Some(p) = &self.personality_type {
            lines.push(format!("Personality: {p}"));
        }
        if let Some(s) = &self.communication_style {
            lines.push(format!("Communication style: {s}"));
        }
        (!lines.is_empty()).then(|| lines.join("\n"))
    }
}

/// Structured body of a pack. Lists keep the order the server sent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PackContent {
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub identity: Option<IdentityContext>,
    #[serde(default)]
    pub session_memories: Vec<ScoredMemory>,
    #[serde(default)]
    pub knowledge: Vec<ScoredKnowledge>,
    #[serde(default)]
    pub long_term_memories: Vec<ScoredMemory>,
    #[serde(default)]
    pub temporal_context: Option<TemporalContext>,
}

impl PackContent {
    fn render(&self) -> String {
        let mut sections = Vec::new();
        if let Some(identity) = self.identity.as_ref().and_then(IdentityContext::render) {
            sections.push(format!("## Identity\n{identity}"));
        }
        if let Some(temporal) = &self.temporal_context {
            sections.push(format!("## Temporal Context\n{}", temporal.formatted));
        }
        if let Some(block) = render_memories("Session Memories", &self.session_memories) {
            sections.push(block);
        }
        if !self.knowledge.is_empty() {
            let lines: Vec<String> = self
                .knowledge
                .iter()
                .map(|k| format!("- [{}] {}", k.knowledge_type, k.content))
                .collect();
            sections.push(format!("## Knowledge\n{}", lines.join("\n")));
        }
        if let Some(block) = render_memories("Long-Term Memories", &self.long_term_memories) {
            sections.push(block);
        }
        sections.join("\n\n")
    }
}

fn render_memories(title: &str, memories: &[ScoredMemory]) -> Option<String> {
    let lines: Vec<String> = memories
        .iter()
        .filter_map(|m| m.summary.as_deref())
        .map(|s| format!("- {s}"))
        .collect();
    (!lines.is_empty()).then(|| format!("## {title}\n{}", lines.join("\n")))
}

fn default_max_tokens() -> u32 {
    4000
}

/// Compiled memory pack for LLM context injection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryPack {
    pub id: String,
    pub anima_id: String,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub preset_name: Option<String>,
    #[serde(default)]
    pub session_memory_count: u32,
    #[serde(default)]
    pub knowledge_count: u32,
    #[serde(default)]
    pub long_term_memory_count: u32,
    #[serde(default)]
    pub has_identity: bool,
    #[serde(default)]
    pub token_count: u32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub content: PackContent,
    pub compiled_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl MemoryPack {
    /// Prompt-ready text for this pack.
    ///
    /// Returns the server-rendered context when present, otherwise renders
    /// the identity, temporal context and memory lists in received order.
    pub fn as_prompt(&self) -> String {
        match self.content.context.as_deref() {
            Some(context) if !context.trim().is_empty() => context.to_string(),
            _ => self.content.render(),
        }
    }

    pub fn identity(&self) -> Option<&IdentityContext> {
        self.content.identity.as_ref()
    }

    pub fn session_memories(&self) -> &[ScoredMemory] {
        &self.content.session_memories
    }

    pub fn knowledge(&self) -> &[ScoredKnowledge] {
        &self.content.knowledge
    }

    pub fn long_term_memories(&self) -> &[ScoredMemory] {
        &self.content.long_term_memories
    }

    pub fn temporal_context(&self) -> Option<&TemporalContext> {
        self.content.temporal_context.as_ref()
    }

    /// Whether the server kept the pack within its token budget.
    pub fn within_budget(&self) -> bool {
        self.token_count <= self.max_tokens
    }
}
