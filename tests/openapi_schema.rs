use warden::docs::build_openapi;

#[test]
fn openapi_lists_gated_routes() {
    let doc = serde_json::to_value(build_openapi()).expect("serialize openapi");

    let paths = doc["paths"].as_object().expect("paths");
    for path in ["/api/health", "/abilities/me", "/abilities/check", "/users", "/users/{user_id}"] {
        assert!(paths.contains_key(path), "missing {path}");
    }

    assert_eq!(doc["components"]["securitySchemes"]["bearerAuth"]["scheme"], "bearer");
    assert!(doc["components"]["schemas"]["CheckResponse"].is_object());
}
