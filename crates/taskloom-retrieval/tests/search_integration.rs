//! Wire-format tests for the search adapters and the knowledge endpoint
//! against mocked HTTP servers.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use serde_json::json;
use taskloom_core::TaskloomError;
use taskloom_retrieval::{EngineConfig, RetrievalFusion, SearchSettings, SearchSource, WebEngine};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn settings_for(server: &MockServer) -> SearchSettings {
    let engine = || {
        EngineConfig::default()
            .with_api_key("test-key")
            .with_base_url(server.uri())
    };
    SearchSettings {
        serpapi: engine(),
        serper: engine(),
        searchapi: engine(),
        knowledge_endpoint: Some(format!("{}/knowledge/similar", server.uri())),
        ..SearchSettings::default()
    }
}

fn fusion_for(server: &MockServer) -> RetrievalFusion {
    RetrievalFusion::from_settings(&settings_for(server), reqwest::Client::new())
}

// ---------------------------------------------------------------------------
// 1. Web engines
// ---------------------------------------------------------------------------

#[tokio::test]
async fn serpapi_normalizes_organic_results() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "rust async"))
        .and(query_param("api_key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "organic_results": [
                {"title": "Tokio", "link": "https://tokio.rs", "snippet": "Runtime"},
                {"title": "Async book", "link": "https://rust-lang.github.io/async-book"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let results = fusion_for(&server)
        .search("rust async", SearchSource::Web, WebEngine::SerpApi)
        .await
        .unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].url, "https://tokio.rs");
    assert_eq!(results[0].source, "serpapi");
    assert_eq!(results[1].snippet, "");
}

#[tokio::test]
async fn serper_posts_query_with_key_header() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .and(header("X-API-KEY", "test-key"))
        .and(body_json(json!({"q": "axum"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "organic": [{"title": "axum", "link": "https://docs.rs/axum", "snippet": "web"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let results = fusion_for(&server)
        .search("axum", SearchSource::Web, WebEngine::Serper)
        .await
        .unwrap();
    assert_eq!(results[0].title, "axum");
    assert_eq!(results[0].source, "serper");
}

#[tokio::test]
async fn searchapi_reads_url_field() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/search"))
        .and(query_param("q", "serde"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "organic_results": [{"title": "serde", "url": "https://serde.rs", "snippet": "ser/de"}]
        })))
        .mount(&server)
        .await;

    let results = fusion_for(&server)
        .search("serde", SearchSource::Web, WebEngine::SearchApi)
        .await
        .unwrap();
    assert_eq!(results[0].url, "https://serde.rs");
    assert_eq!(results[0].source, "searchapi");
}

#[tokio::test]
async fn missing_result_array_is_empty() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"error": "no results"})))
        .mount(&server)
        .await;

    let results = fusion_for(&server)
        .search("zzz", SearchSource::Web, WebEngine::SerpApi)
        .await
        .unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn non_success_status_is_search_backend_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(403).set_body_string("bad key"))
        .expect(1)
        .mount(&server)
        .await;

    let err = fusion_for(&server)
        .search("x", SearchSource::Web, WebEngine::Serper)
        .await
        .unwrap_err();
    match err {
        TaskloomError::SearchBackend { engine, message } => {
            assert_eq!(engine, "serper");
            assert!(message.contains("403"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn engine_without_key_fails_before_network() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut settings = settings_for(&server);
    settings.serpapi.api_key = None;
    let fusion = RetrievalFusion::from_settings(&settings, reqwest::Client::new());
    let err = fusion
        .search("x", SearchSource::Web, WebEngine::SerpApi)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "search_backend");
}

// ---------------------------------------------------------------------------
// 2. Knowledge endpoint
// ---------------------------------------------------------------------------

#[tokio::test]
async fn knowledge_endpoint_accepts_wrapped_items() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/knowledge/similar"))
        .and(body_json(json!({"query": "onboarding", "limit": 5})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                {"id": "doc-1", "name": "Handbook", "status": "ready", "summary": "How we work"},
                {"id": "doc-2", "name": "Draft", "status": "processing"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let results = fusion_for(&server)
        .search("onboarding", SearchSource::Knowledge, WebEngine::SerpApi)
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].url, "knowledge://doc-1");
    assert_eq!(results[0].source, "knowledge");
}

#[tokio::test]
async fn knowledge_endpoint_accepts_bare_array() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/knowledge/similar"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let results = fusion_for(&server)
        .search("anything", SearchSource::Knowledge, WebEngine::SerpApi)
        .await
        .unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn knowledge_failure_is_tagged_knowledge() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/knowledge/similar"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = fusion_for(&server)
        .search("x", SearchSource::Knowledge, WebEngine::SerpApi)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("[knowledge]"));
}

// ---------------------------------------------------------------------------
// 3. Fusion over real adapters
// ---------------------------------------------------------------------------

#[tokio::test]
async fn both_prefix_is_web_suffix_is_knowledge() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "organic_results": [{"title": "w", "link": "https://w", "snippet": "s"}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/knowledge/similar"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "k", "name": "K", "status": "ready", "tags": ["a", "b"]}
        ])))
        .mount(&server)
        .await;

    let fusion = fusion_for(&server);
    let web = fusion.search("q", SearchSource::Web, WebEngine::SerpApi).await.unwrap();
    let knowledge = fusion
        .search("q", SearchSource::Knowledge, WebEngine::SerpApi)
        .await
        .unwrap();
    let both = fusion.search("q", SearchSource::Both, WebEngine::SerpApi).await.unwrap();

    let mut expected = web.clone();
    expected.extend(knowledge);
    assert_eq!(both, expected);
    assert_eq!(both[1].snippet, "a, b");
}
