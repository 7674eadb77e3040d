//! Startup template seeding.

mod common;

use axum::http::StatusCode;
use common::{TestServer, places_template};
use layergroup_metadata::TemplateRepo;
use layergroup_server::bootstrap::seed_templates;
use serde_json::json;

#[tokio::test]
async fn test_seeded_templates_are_instantiable() {
    let server = TestServer::new().await;
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("b.json"),
        places_template("second").to_string(),
    )
    .unwrap();
    std::fs::write(
        dir.path().join("a.json"),
        places_template("first").to_string(),
    )
    .unwrap();
    std::fs::write(dir.path().join("README.txt"), "not a template").unwrap();

    let metadata = server.metadata();
    let seeded = seed_templates(metadata.as_ref(), "localhost", dir.path())
        .await
        .unwrap();
    assert_eq!(seeded, 2);
    assert_eq!(
        metadata.list_templates("localhost").await.unwrap().len(),
        2
    );

    let response = server.post("/api/v1/map/named/first", &json!({})).await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.text());
}

#[tokio::test]
async fn test_reseeding_overwrites_existing_templates() {
    let server = TestServer::new().await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("places.json");
    let metadata = server.metadata();

    std::fs::write(&path, places_template("places").to_string()).unwrap();
    seed_templates(metadata.as_ref(), "localhost", dir.path())
        .await
        .unwrap();

    let mut updated = places_template("places");
    updated["placeholders"]["min_n"]["default"] = json!(9);
    std::fs::write(&path, updated.to_string()).unwrap();
    seed_templates(metadata.as_ref(), "localhost", dir.path())
        .await
        .unwrap();

    let row = metadata
        .get_template("localhost", "places")
        .await
        .unwrap()
        .unwrap();
    let stored: serde_json::Value = serde_json::from_str(&row.template_json).unwrap();
    assert_eq!(stored["placeholders"]["min_n"]["default"], 9);
}

#[tokio::test]
async fn test_invalid_template_file_aborts_seeding() {
    let server = TestServer::new().await;
    let dir = tempfile::tempdir().unwrap();
    let mut invalid = places_template("broken");
    invalid["name"] = json!("not a valid name");
    std::fs::write(dir.path().join("broken.json"), invalid.to_string()).unwrap();

    let err = seed_templates(server.metadata().as_ref(), "localhost", dir.path())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("broken.json"), "{err}");

    std::fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
    assert!(
        seed_templates(server.metadata().as_ref(), "localhost", dir.path())
            .await
            .is_err()
    );
}

#[tokio::test]
async fn test_missing_directory_is_an_error() {
    let server = TestServer::new().await;
    let dir = tempfile::tempdir().unwrap();
    let result = seed_templates(
        server.metadata().as_ref(),
        "localhost",
        &dir.path().join("absent"),
    )
    .await;
    assert!(result.is_err());
}
