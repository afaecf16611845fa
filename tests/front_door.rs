mod common;

use std::sync::Arc;
use std::time::Duration;

use bookshelf::{FrontDoor, Library, compose_local};
use common::RunningServer;
use pretty_assertions::assert_eq;
use reqwest::{Method, StatusCode, redirect};
use serde_json::{Value, json};

async fn local_server(graphiql: bool) -> RunningServer {
    let schema = compose_local(Arc::new(Library::embedded().unwrap())).unwrap();
    RunningServer::start_with(FrontDoor::new(schema, graphiql), Duration::from_secs(1)).await
}

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(redirect::Policy::none())
        .build()
        .unwrap()
}

#[tokio::test]
async fn graphql_accepts_post_only() {
    let server = local_server(true).await;

    let response = client().get(server.graphql_url()).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(response.headers()["allow"], "POST");
    assert_eq!(response.headers()["access-control-allow-origin"], "*");

    server.stopped().await;
}

#[tokio::test]
async fn malformed_body_is_a_bad_request() {
    let server = local_server(true).await;

    let response = client()
        .post(server.graphql_url())
        .header("Content-Type", "application/json")
        .body("{ not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert!(body["errors"][0]["message"].is_string());

    server.stopped().await;
}

#[tokio::test]
async fn queries_return_graphql_json() {
    let server = local_server(true).await;

    let response = client()
        .post(server.graphql_url())
        .json(&json!({
            "query": "query Author($id: Int) { author(id: $id) { name } }",
            "variables": { "id": 2 },
            "operationName": "Author",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({ "data": { "author": { "name": "Michael Crichton" } } }));

    server.stopped().await;
}

#[tokio::test]
async fn invalid_queries_are_reported_in_errors() {
    let server = local_server(true).await;

    let response = client()
        .post(server.graphql_url())
        .json(&json!({ "query": "{ books { isbn } }" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert!(body["errors"][0]["message"].as_str().unwrap().contains("isbn"));

    server.stopped().await;
}

#[tokio::test]
async fn console_and_redirect() {
    let server = local_server(true).await;

    let response = client().get(server.url("/")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers()["location"], "/graphiql");

    let response = client().get(server.url("/graphiql")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.text().await.unwrap().contains("/graphql"));

    server.stopped().await;
}

#[tokio::test]
async fn console_can_be_disabled() {
    let server = local_server(false).await;

    let response = client().get(server.url("/graphiql")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let response = client().get(server.url("/")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    server.stopped().await;
}

#[tokio::test]
async fn preflight_and_unknown_paths() {
    let server = local_server(true).await;

    let response = client()
        .request(Method::OPTIONS, server.graphql_url())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    assert!(
        response.headers()["access-control-allow-methods"]
            .to_str()
            .unwrap()
            .contains("POST")
    );

    let response = client().get(server.url("/books")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    server.stopped().await;
}
