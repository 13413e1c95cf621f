use axum::http::{self, Request, StatusCode};
use http_body_util::BodyExt;
use mock_server::{app, fixed_status, Anima, ErrorBody, Event, MemoryPack};
use tower::ServiceExt;

const KEY: &str = "sk_test_mock";

async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

fn json_request(method: &str, uri: &str, body: &str) -> Request<String> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(http::header::CONTENT_TYPE, "application/json")
        .header(http::header::AUTHORIZATION, format!("Bearer {KEY}"))
        .body(body.to_string())
        .unwrap()
}

fn get_request(uri: &str) -> Request<String> {
    Request::builder()
        .uri(uri)
        .header(http::header::AUTHORIZATION, format!("Bearer {KEY}"))
        .body(String::new())
        .unwrap()
}

// --- auth ---

#[tokio::test]
async fn missing_token_returns_401() {
    let resp = app(KEY)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/animas")
                .header(http::header::CONTENT_TYPE, "application/json")
                .body(r#"{"name":"bot"}"#.to_string())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: ErrorBody = body_json(resp).await;
    assert_eq!(body.detail, "Missing API key");
}

#[tokio::test]
async fn wrong_token_returns_401() {
    let resp = app("sk_test_other")
        .oneshot(json_request("POST", "/api/animas", r#"{"name":"bot"}"#))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: ErrorBody = body_json(resp).await;
    assert_eq!(body.detail, "Invalid API key");
}

// --- animas ---

#[tokio::test]
async fn create_anima_returns_201() {
    let resp = app(KEY)
        .oneshot(json_request(
            "POST",
            "/api/animas",
            r#"{"name":"bot","description":"d"}"#,
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::CREATED);
    let anima: Anima = body_json(resp).await;
    assert_eq!(anima.name, "bot");
    assert_eq!(anima.description.as_deref(), Some("d"));
}

#[tokio::test]
async fn create_anima_empty_name_returns_422() {
    let resp = app(KEY)
        .oneshot(json_request("POST", "/api/animas", r#"{"name":""}"#))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

// --- events ---

#[tokio::test]
async fn event_for_unknown_anima_returns_404() {
    let resp = app(KEY)
        .oneshot(json_request(
            "POST",
            "/api/events",
            r#"{"anima_id":"00000000-0000-0000-0000-000000000000","event_type":"message.in","content":"hi"}"#,
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: ErrorBody = body_json(resp).await;
    assert_eq!(body.detail, "Anima not found");
}

#[tokio::test]
async fn event_with_bad_type_returns_422() {
    let resp = app(KEY)
        .oneshot(json_request(
            "POST",
            "/api/events",
            r#"{"anima_id":"x","event_type":"shout","content":"hi"}"#,
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn malformed_event_json_is_rejected() {
    let resp = app(KEY)
        .oneshot(json_request("POST", "/api/events", r#"{"content":1}"#))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

// --- packs ---

#[tokio::test]
async fn pack_for_unknown_anima_returns_404() {
    let resp = app(KEY)
        .oneshot(get_request(
            "/api/animas/00000000-0000-0000-0000-000000000000/memory-packs/latest",
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn fixed_status_router_answers_everything() {
    let resp = fixed_status(429, "Rate limit exceeded")
        .oneshot(get_request("/api/anything"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    let body: ErrorBody = body_json(resp).await;
    assert_eq!(body.detail, "Rate limit exceeded");
}

// --- full lifecycle ---

#[tokio::test]
async fn anima_event_pack_lifecycle() {
    use tower::Service;

    let mut app = app(KEY).into_service();

    // create anima
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(json_request("POST", "/api/animas", r#"{"name":"tutor"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let anima: Anima = body_json(resp).await;
    let id = anima.id;
    let pack_uri = format!("/api/animas/{id}/memory-packs/latest");

    // no events yet, pack is null
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(get_request(&pack_uri))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(&body_bytes(resp).await[..], b"null");

    // record two messages
    for (minute, content) in [(0, "I am learning Rust"), (5, "Explain lifetimes")] {
        let body = format!(
            r#"{{"anima_id":"{id}","event_type":"message.in","content":"{content}","role":"user","occurred_at":"2025-01-01T00:0{minute}:00Z"}}"#
        );
        let resp = ServiceExt::ready(&mut app)
            .await
            .unwrap()
            .call(json_request("POST", "/api/events", &body))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let event: Event = body_json(resp).await;
        assert_eq!(event.anima_id, id);
        assert_eq!(event.content, content);
    }

    // pack lists newest first
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(get_request(&format!("{pack_uri}?preset=conversational")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let pack: MemoryPack = body_json(resp).await;
    assert_eq!(pack.session_memory_count, 2);
    assert_eq!(pack.preset_name, "conversational");
    assert_eq!(
        pack.content.session_memories[0].summary.as_deref(),
        Some("Explain lifetimes")
    );
    assert!(pack.token_count <= pack.max_tokens);

    // query narrows the pack
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(get_request(&format!("{pack_uri}?query=rust")))
        .await
        .unwrap();
    let pack: MemoryPack = body_json(resp).await;
    assert_eq!(pack.session_memory_count, 1);
    assert_eq!(pack.query.as_deref(), Some("rust"));

    // unknown preset is rejected
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(get_request(&format!("{pack_uri}?preset=chaotic")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}
