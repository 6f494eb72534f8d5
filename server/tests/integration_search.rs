use axum::body::{Body, Bytes};
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use reviewdex_core::builder::{BuildContext, IndexBuilder, SequentialBuilder};
use reviewdex_core::config::{BuildConfig, EngineConfig, StoreConfig};
use reviewdex_core::persist::{save_index, IndexPaths};
use reviewdex_core::{Diagnostics, Document, Tokenizer};
use serde_json::Value;
use server::{router, AppState};
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;
use tower::ServiceExt;

const TOKEN: &str = "secret";

fn build_tiny_index(dir: &Path, reviews: &[(&str, &str)]) {
    let docs: Vec<Document> = reviews.iter().map(|(k, t)| Document::new(*k, *t)).collect();
    let diagnostics = Diagnostics::new();
    let built = SequentialBuilder::new(Arc::new(Tokenizer::default()), BuildConfig::default())
        .build(docs, &BuildContext::new(&diagnostics))
        .unwrap();
    save_index(&IndexPaths::new(dir), &built.index, Some(built.report.mode), &StoreConfig::default(), &diagnostics)
        .unwrap();
}

fn reviews() -> Vec<(&'static str, &'static str)> {
    vec![("doc1", "not a good book"), ("doc2", "a good book"), ("doc3", "a great book")]
}

fn app(dir: &Path) -> (Router, AppState) {
    let state = AppState::load(dir, EngineConfig::default(), Some(TOKEN.into())).unwrap();
    (router(state.clone()), state)
}

async fn call(app: Router, req: Request<Body>) -> (StatusCode, Bytes) {
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    (status, body)
}

async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    let (status, body) = call(app, Request::get(uri).body(Body::empty()).unwrap()).await;
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn search_returns_ranked_results() {
    let dir = tempdir().unwrap();
    build_tiny_index(dir.path(), &reviews());
    let (app, _) = app(dir.path());

    let (status, json) = get(app.clone(), "/search?q=good&k=5").await;
    assert_eq!(status, StatusCode::OK);
    let keys: Vec<&str> = json["results"].as_array().unwrap().iter().map(|h| h["key"].as_str().unwrap()).collect();
    assert_eq!(keys, vec!["doc1", "doc2"]);
    assert_eq!(json["model"], "tfidf");

    let (status, json) = get(app.clone(), "/search?q=great%20book&model=bim").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total_hits"], 3);
    assert_eq!(json["results"][0]["key"], "doc3");

    let (status, _) = get(app, "/search?q=good&model=bm25").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_terms_are_an_empty_result() {
    let dir = tempdir().unwrap();
    build_tiny_index(dir.path(), &reviews());
    let (app, _) = app(dir.path());
    let (status, json) = get(app, "/search?q=xylophone").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total_hits"], 0);
    assert!(json["results"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn doc_stats_and_top_terms() {
    let dir = tempdir().unwrap();
    build_tiny_index(dir.path(), &reviews());
    let (app, _) = app(dir.path());

    let (status, json) = get(app.clone(), "/doc/doc1?n=3").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["doc_id"], 0);
    assert_eq!(json["length"], 5);
    assert_eq!(json["top_terms"].as_array().unwrap().len(), 3);

    let (status, _) = get(app.clone(), "/doc/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, json) = get(app.clone(), "/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["statistics"]["document_count"], 3);

    let (status, json) = get(app, "/terms/top?n=1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json[0]["term"], "book");
    assert_eq!(json[0]["count"], 3);
}

#[tokio::test]
async fn reload_requires_token_and_swaps_index() {
    let dir = tempdir().unwrap();
    build_tiny_index(dir.path(), &reviews());
    let (app, state) = app(dir.path());

    let unauthorized = Request::post("/index/reload").body(Body::empty()).unwrap();
    let (status, _) = call(app.clone(), unauthorized).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(state.current().num_docs(), 3);

    build_tiny_index(dir.path(), &[("solo", "a single great read")]);
    let req = Request::post("/index/reload").header("X-ADMIN-TOKEN", TOKEN).body(Body::empty()).unwrap();
    let (status, body) = call(app.clone(), req).await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["documents"], 1);
    assert_eq!(state.current().num_docs(), 1);

    let (_, json) = get(app, "/search?q=great").await;
    assert_eq!(json["results"][0]["key"], "solo");
}

#[tokio::test]
async fn failed_reload_keeps_serving_old_index() {
    let dir = tempdir().unwrap();
    build_tiny_index(dir.path(), &reviews());
    let (app, state) = app(dir.path());

    std::fs::write(dir.path().join("CURRENT"), "gen-99999999\n").unwrap();
    let req = Request::post("/index/reload").header("X-ADMIN-TOKEN", TOKEN).body(Body::empty()).unwrap();
    let (status, _) = call(app.clone(), req).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(state.current().num_docs(), 3);

    let (status, _) = get(app, "/health").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn similar_reviews_exclude_the_document_itself() {
    let dir = tempdir().unwrap();
    build_tiny_index(dir.path(), &reviews());
    let (app, _) = app(dir.path());

    let (status, json) = get(app.clone(), "/doc/doc2/similar?n=5").await;
    assert_eq!(status, StatusCode::OK);
    let keys: Vec<&str> = json["results"].as_array().unwrap().iter().map(|h| h["key"].as_str().unwrap()).collect();
    assert_eq!(keys, vec!["doc1", "doc3"]);
    assert!(json["results"][0]["score"].as_f64().unwrap() > json["results"][1]["score"].as_f64().unwrap());

    let (status, _) = get(app, "/doc/nope/similar").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
