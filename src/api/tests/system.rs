use super::*;

#[tokio::test]
async fn test_health_endpoint() {
    let app = TestApp::new(MemoryObjectStore::new("us-east-1")).await;

    let response = app.get("/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_openapi_endpoint() {
    let app = TestApp::new(MemoryObjectStore::new("us-east-1")).await;

    let response = app.get("/openapi.json").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert!(body["openapi"].as_str().unwrap().starts_with("3."));
    assert!(body["paths"]["/checkpoints/{checkpoint_uuid}/tgz"].is_object());
    assert!(body["paths"]["/checkpoints/{checkpoint_uuid}/zip"].is_object());
}

#[tokio::test]
async fn test_swagger_ui_disabled() {
    let mut config = test_config();
    config.api.swagger_ui = false;
    let app = TestApp::with_config(MemoryObjectStore::new("us-east-1"), config).await;

    let response = app.get("/swagger-ui/").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
