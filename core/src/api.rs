//! Deterministic request builder and response parser for the Elephantasm API.
//!
//! # Design
//! `ApiClient` holds only the base URL and the API key. Each operation is
//! split into a `build_*` method producing an `HttpRequest` and a `parse_*`
//! method consuming an `HttpResponse`. No I/O happens here; the transport
//! runs the round-trip in between.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::types::{Anima, AnimaCreate, Event, EventCreate, MemoryPack, Preset};

/// Builds and parses Elephantasm API messages without touching the network.
#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    api_key: String,
}

impl ApiClient {
    /// `endpoint` is the service root; requests go under `{endpoint}/api`.
    pub fn new(endpoint: &str, api_key: &str) -> Self {
        Self {
            base_url: format!("{}/api", endpoint.trim_end_matches('/')),
            api_key: api_key.to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn build_create_anima(&self, input: &AnimaCreate) -> Result<HttpRequest> {
        self.json_request(HttpMethod::Post, format!("{}/animas", self.base_url), input)
    }

    pub fn build_extract(&self, input: &EventCreate) -> Result<HttpRequest> {
        self.json_request(HttpMethod::Post, format!("{}/events", self.base_url), input)
    }

    pub fn build_inject(
        &self,
        anima_id: &str,
        query: Option<&str>,
        preset: Option<Preset>,
    ) -> HttpRequest {
        let mut url = format!(
            "{}/animas/{}/memory-packs/latest",
            self.base_url,
            urlencoding::encode(anima_id)
        );

        let mut params = Vec::new();
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            params.push(format!("query={}", urlencoding::encode(query)));
        }
        if let Some(preset) = preset {
            params.push(format!("preset={}", preset.as_str()));
        }
        if !params.is_empty() {
            url.push('?');
            url.push_str(&params.join("&"));
        }

        HttpRequest {
            method: HttpMethod::Get,
            url,
            headers: self.base_headers(),
            body: None,
        }
    }

    pub fn parse_create_anima(&self, response: HttpResponse) -> Result<Anima> {
        check_status(&response)?;
        decode(&response.body)
    }

    pub fn parse_extract(&self, response: HttpResponse) -> Result<Event> {
        check_status(&response)?;
        decode(&response.body)
    }

    /// A JSON `null` body means no pack has been compiled yet.
    pub fn parse_inject(&self, response: HttpResponse) -> Result<Option<MemoryPack>> {
        check_status(&response)?;
        decode(&response.body)
    }

    fn base_headers(&self) -> Vec<(String, String)> {
        vec![
            ("authorization".to_string(), format!("Bearer {}", self.api_key)),
            ("accept".to_string(), "application/json".to_string()),
        ]
    }

    fn json_request<T: Serialize>(
        &self,
        method: HttpMethod,
        url: String,
        input: &T,
    ) -> Result<HttpRequest> {
        let body = serde_json::to_string(input)
            .map_err(|e| Error::validation(format!("could not serialize request: {e}")))?;
        let mut headers = self.base_headers();
        headers.push(("content-type".to_string(), "application/json".to_string()));
        Ok(HttpRequest {
            method,
            url,
            headers,
            body: Some(body),
        })
    }
}

/// Map non-success status codes to the matching `Error` variant.
fn check_status(response: &HttpResponse) -> Result<()> {
    if response.is_success() {
        return Ok(());
    }
    let message = error_message(response);
    tracing::warn!(status = response.status, %message, "request rejected");
    Err(Error::from_status(response.status, message))
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T> {
    serde_json::from_str(body).map_err(|e| Error::InvalidResponse(e.to_string()))
}

/// Pull a human-readable message out of an error body.
///
/// Prefers a string `detail`, renders any other `detail` as JSON, and falls
/// back to the raw body, then to a generic message for the status.
fn error_message(response: &HttpResponse) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(&response.body) {
        match value.get("detail") {
            Some(serde_json::Value::String(detail)) => return detail.clone(),
            Some(detail) if !detail.is_null() => return detail.to_string(),
            _ => {}
        }
    }
    let body = response.body.trim();
    if !body.is_empty() {
        return body.to_string();
    }
    match response.status {
        401 | 403 => "Authentication failed",
        404 => "Resource not found",
        429 => "Rate limit exceeded",
        400..=499 => "Validation failed",
        _ => "Server error",
    }
    .to_string()
}
