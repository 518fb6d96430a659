use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use civitas::config::Config;
use http_body_util::BodyExt;
use std::path::PathBuf;
use tower::ServiceExt;

/// Bootstrap password seeded by the admin migration (must match
/// m20240102_seed_admin.rs)
const ADMIN_PASSWORD: &str = "schimba-ma";

const BOUNDARY: &str = "X-CIVITAS-TEST-BOUNDARY";

async fn spawn_app() -> (Router, PathBuf) {
    let mut config = Config::default();
    config.general.database_path = "sqlite::memory:".to_string();
    config.server.secure_cookies = false;

    let upload_root =
        std::env::temp_dir().join(format!("civitas-test-{}", uuid::Uuid::new_v4()));
    config.uploads.root = upload_root.to_string_lossy().into_owned();

    let state = civitas::api::create_app_state_from_config(config, None)
        .await
        .expect("Failed to create app state");
    (civitas::api::router(state).await, upload_root)
}

/// Fire one request, returning (status, parsed JSON body, session cookie
/// from Set-Cookie if any).
async fn send(
    app: &Router,
    request: Request<Body>,
) -> (StatusCode, serde_json::Value, Option<String>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(';').next())
        .map(str::to_string);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json, cookie)
}

/// GET /api/auth/csrf, keeping the session cookie stable across calls.
async fn csrf_token(app: &Router, cookie: Option<&str>) -> (String, String) {
    let mut builder = Request::builder().uri("/api/auth/csrf");
    if let Some(c) = cookie {
        builder = builder.header(header::COOKIE, c);
    }
    let (status, json, set_cookie) = send(app, builder.body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);

    let token = json["data"]["csrf_token"].as_str().unwrap().to_string();
    let cookie = set_cookie
        .or_else(|| cookie.map(str::to_string))
        .expect("csrf endpoint must establish a session");
    (token, cookie)
}

async fn try_login(
    app: &Router,
    username: &str,
    password: &str,
    cookie: &str,
    token: &str,
) -> (StatusCode, serde_json::Value, Option<String>) {
    let body = serde_json::json!({
        "username": username,
        "password": password,
        "csrf_token": token,
    });
    let request = Request::builder()
        .method("POST")
        .uri("/api/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::COOKIE, cookie)
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

/// Full login; returns the post-login session cookie (the identifier is
/// rotated on login, so the pre-login cookie is stale afterwards).
async fn login(app: &Router) -> String {
    let (token, cookie) = csrf_token(app, None).await;
    let (status, json, set_cookie) = try_login(app, "admin", ADMIN_PASSWORD, &cookie, &token).await;
    assert_eq!(status, StatusCode::OK, "login failed: {json}");
    set_cookie.unwrap_or(cookie)
}

fn text_part(body: &mut Vec<u8>, name: &str, value: &str) {
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
        )
        .as_bytes(),
    );
}

fn file_part(body: &mut Vec<u8>, name: &str, filename: &str, content_type: &str, data: &[u8]) {
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(b"\r\n");
}

fn close_form(body: &mut Vec<u8>) {
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
}

fn multipart_request(uri: &str, method: &str, cookie: &str, token: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .header(header::COOKIE, cookie)
        .header("x-csrf-token", token)
        .body(Body::from(body))
        .unwrap()
}

async fn create_announcement(
    app: &Router,
    cookie: &str,
    title: &str,
    publish_date: &str,
    visible: bool,
) -> i64 {
    let (token, _) = csrf_token(app, Some(cookie)).await;

    let mut body = Vec::new();
    text_part(&mut body, "title", title);
    text_part(&mut body, "category", "general");
    text_part(&mut body, "publish_date", publish_date);
    text_part(&mut body, "body", "Continut anunt.");
    text_part(&mut body, "visible", if visible { "true" } else { "false" });
    close_form(&mut body);

    let request = multipart_request(
        "/api/admin/content/announcements",
        "POST",
        cookie,
        &token,
        body,
    );
    let (status, json, _) = send(app, request).await;
    assert_eq!(status, StatusCode::OK, "create failed: {json}");
    json["data"]["id"].as_i64().unwrap()
}

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::DynamicImage::ImageRgb8(image::RgbImage::new(width, height));
    let mut out = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png)
        .unwrap();
    out
}

// ============================================================================
// Auth & sessions
// ============================================================================

#[tokio::test]
async fn test_public_read_api_needs_no_auth() {
    let (app, _) = spawn_app().await;

    let (status, json, _) = send(
        &app,
        Request::builder()
            .uri("/api/public/announcements")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(json["data"].as_array().unwrap().is_empty());

    let (status, _, _) = send(
        &app,
        Request::builder()
            .uri("/api/public/albums")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_admin_api_rejects_anonymous_requests() {
    let (app, _) = spawn_app().await;

    let (status, _, _) = send(
        &app,
        Request::builder()
            .uri("/api/admin/albums")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_requires_a_csrf_token() {
    let (app, _) = spawn_app().await;
    let (_, cookie) = csrf_token(&app, None).await;

    // No token at all.
    let body = serde_json::json!({"username": "admin", "password": ADMIN_PASSWORD});
    let request = Request::builder()
        .method("POST")
        .uri("/api/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::COOKIE, &cookie)
        .body(Body::from(body.to_string()))
        .unwrap();
    let (status, _, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // A forged token.
    let (status, _, _) =
        try_login(&app, "admin", ADMIN_PASSWORD, &cookie, "forged-token").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_login_logout_and_status() {
    let (app, _) = spawn_app().await;

    // Anonymous status.
    let (status, json, _) = send(
        &app,
        Request::builder()
            .uri("/api/auth/status")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["authenticated"], serde_json::json!(false));

    let cookie = login(&app).await;

    let (status, json, _) = send(
        &app,
        Request::builder()
            .uri("/api/auth/status")
            .header(header::COOKIE, &cookie)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["user"]["username"], serde_json::json!("admin"));

    let (status, _, _) = send(
        &app,
        Request::builder()
            .method("POST")
            .uri("/api/auth/logout")
            .header(header::COOKIE, &cookie)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, json, _) = send(
        &app,
        Request::builder()
            .uri("/api/auth/status")
            .header(header::COOKIE, &cookie)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["authenticated"], serde_json::json!(false));
}

#[tokio::test]
async fn test_unknown_user_and_wrong_password_are_indistinguishable() {
    let (app, _) = spawn_app().await;

    let (token, cookie) = csrf_token(&app, None).await;
    let (status_a, json_a, _) = try_login(&app, "nobody", "whatever", &cookie, &token).await;

    let (token, cookie) = csrf_token(&app, Some(&cookie)).await;
    let (status_b, json_b, _) = try_login(&app, "admin", "wrong-password", &cookie, &token).await;

    assert_eq!(status_a, StatusCode::UNAUTHORIZED);
    assert_eq!(status_b, StatusCode::UNAUTHORIZED);
    assert_eq!(json_a["error"], json_b["error"]);
}

#[tokio::test]
async fn test_account_locks_after_five_failures() {
    let (app, _) = spawn_app().await;

    let mut cookie: Option<String> = None;
    for _ in 0..5 {
        let (token, c) = csrf_token(&app, cookie.as_deref()).await;
        let (status, _, _) = try_login(&app, "admin", "wrong-password", &c, &token).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        cookie = Some(c);
    }

    // Correct credentials are irrelevant while the lockout window is open.
    let (token, c) = csrf_token(&app, cookie.as_deref()).await;
    let (status, json, _) = try_login(&app, "admin", ADMIN_PASSWORD, &c, &token).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(
        json["error"].as_str().unwrap().contains("locked"),
        "unexpected error: {json}"
    );
}

#[tokio::test]
async fn test_successful_login_resets_the_failure_counter() {
    let (app, _) = spawn_app().await;

    let mut cookie: Option<String> = None;
    for _ in 0..4 {
        let (token, c) = csrf_token(&app, cookie.as_deref()).await;
        let (status, _, _) = try_login(&app, "admin", "wrong-password", &c, &token).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        cookie = Some(c);
    }

    // One short of the threshold; a successful login zeroes the counter.
    let (token, c) = csrf_token(&app, cookie.as_deref()).await;
    let (status, _, _) = try_login(&app, "admin", ADMIN_PASSWORD, &c, &token).await;
    assert_eq!(status, StatusCode::OK);

    // If the counter had survived, this failure would be the fifth and the
    // next correct login would hit the lockout.
    let (token, c) = csrf_token(&app, None).await;
    let (status, _, _) = try_login(&app, "admin", "wrong-password", &c, &token).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (token, c) = csrf_token(&app, Some(&c)).await;
    let (status, _, _) = try_login(&app, "admin", ADMIN_PASSWORD, &c, &token).await;
    assert_eq!(status, StatusCode::OK);
}

// ============================================================================
// CSRF
// ============================================================================

#[tokio::test]
async fn test_csrf_token_is_single_use() {
    let (app, _) = spawn_app().await;
    let cookie = login(&app).await;

    // Mutation without a token fails outright.
    let album = serde_json::json!({"title": "Parc", "description": "", "category": "oras"});
    let request = Request::builder()
        .method("POST")
        .uri("/api/admin/albums")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::COOKIE, &cookie)
        .body(Body::from(album.to_string()))
        .unwrap();
    let (status, _, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (token, _) = csrf_token(&app, Some(&cookie)).await;

    let make_request = |token: &str| {
        Request::builder()
            .method("POST")
            .uri("/api/admin/albums")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::COOKIE, &cookie)
            .header("x-csrf-token", token)
            .body(Body::from(album.to_string()))
            .unwrap()
    };

    let (status, _, _) = send(&app, make_request(&token)).await;
    assert_eq!(status, StatusCode::OK);

    // Same token a second time: consumed.
    let (status, _, _) = send(&app, make_request(&token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_csrf_token_is_bound_to_its_session() {
    let (app, _) = spawn_app().await;

    let (token_a, _cookie_a) = csrf_token(&app, None).await;
    let (_token_b, cookie_b) = csrf_token(&app, None).await;

    // Session B presenting session A's token.
    let (status, _, _) = try_login(&app, "admin", ADMIN_PASSWORD, &cookie_b, &token_a).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

// ============================================================================
// Content
// ============================================================================

#[tokio::test]
async fn test_public_listing_orders_by_date_then_id() {
    let (app, _) = spawn_app().await;
    let cookie = login(&app).await;

    let first = create_announcement(&app, &cookie, "Anunt vechi", "2024-01-01", true).await;
    let second = create_announcement(&app, &cookie, "Anunt martie A", "2024-03-01", true).await;
    let third = create_announcement(&app, &cookie, "Anunt martie B", "2024-03-01", true).await;

    let (status, json, _) = send(
        &app,
        Request::builder()
            .uri("/api/public/announcements")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let ids: Vec<i64> = json["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["id"].as_i64().unwrap())
        .collect();

    // Same-date ties break by descending id; the oldest date comes last.
    assert_eq!(ids, vec![third, second, first]);
}

#[tokio::test]
async fn test_hidden_content_is_not_public() {
    let (app, _) = spawn_app().await;
    let cookie = login(&app).await;

    let hidden = create_announcement(&app, &cookie, "Ciorna", "2024-05-01", false).await;

    let (status, json, _) = send(
        &app,
        Request::builder()
            .uri("/api/public/announcements")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["data"].as_array().unwrap().is_empty());

    let (status, _, _) = send(
        &app,
        Request::builder()
            .uri(format!("/api/public/announcements/{hidden}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // The admin surface still sees it.
    let (status, json, _) = send(
        &app,
        Request::builder()
            .uri("/api/admin/content/announcements")
            .header(header::COOKIE, &cookie)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["total"], serde_json::json!(1));
}

#[tokio::test]
async fn test_public_reads_bump_the_view_counter() {
    let (app, _) = spawn_app().await;
    let cookie = login(&app).await;

    let id = create_announcement(&app, &cookie, "Vizualizari", "2024-06-01", true).await;
    let uri = format!("/api/public/announcements/{id}");

    let (_, json, _) = send(
        &app,
        Request::builder().uri(&uri).body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(json["data"]["views"], serde_json::json!(1));

    let (_, json, _) = send(
        &app,
        Request::builder().uri(&uri).body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(json["data"]["views"], serde_json::json!(2));
}

#[tokio::test]
async fn test_disguised_executable_upload_is_rejected() {
    let (app, _) = spawn_app().await;
    let cookie = login(&app).await;
    let (token, _) = csrf_token(&app, Some(&cookie)).await;

    let mut body = Vec::new();
    text_part(&mut body, "title", "Atasament");
    text_part(&mut body, "category", "general");
    text_part(&mut body, "publish_date", "2024-06-01");
    text_part(&mut body, "body", "text");
    file_part(
        &mut body,
        "document",
        "malware.pdf",
        "application/pdf",
        b"MZ\x90\x00\x03 this is not a pdf",
    );
    close_form(&mut body);

    let request = multipart_request(
        "/api/admin/content/announcements",
        "POST",
        &cookie,
        &token,
        body,
    );
    let (status, json, _) = send(&app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(
        json["error"].as_str().unwrap().contains("does not match"),
        "unexpected error: {json}"
    );
}

// ============================================================================
// Albums & photos
// ============================================================================

#[tokio::test]
async fn test_album_delete_cascades_rows_and_files() {
    let (app, upload_root) = spawn_app().await;
    let cookie = login(&app).await;

    // Create an album.
    let (token, _) = csrf_token(&app, Some(&cookie)).await;
    let album = serde_json::json!({"title": "Zilele orasului", "description": "", "category": "evenimente"});
    let request = Request::builder()
        .method("POST")
        .uri("/api/admin/albums")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::COOKIE, &cookie)
        .header("x-csrf-token", token)
        .body(Body::from(album.to_string()))
        .unwrap();
    let (status, json, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    let album_id = json["data"]["id"].as_i64().unwrap();

    // Upload two photos.
    let (token, _) = csrf_token(&app, Some(&cookie)).await;
    let mut body = Vec::new();
    file_part(&mut body, "photo", "unu.png", "image/png", &png_bytes(8, 8));
    file_part(&mut body, "photo", "doi.png", "image/png", &png_bytes(8, 8));
    close_form(&mut body);
    let request = multipart_request(
        &format!("/api/admin/albums/{album_id}/photos"),
        "POST",
        &cookie,
        &token,
        body,
    );
    let (status, json, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK, "photo upload failed: {json}");
    assert_eq!(json["data"].as_array().unwrap().len(), 2);

    let gallery = upload_root.join("gallery");
    assert_eq!(std::fs::read_dir(&gallery).unwrap().count(), 2);

    // First photo became the cover.
    let (status, json, _) = send(
        &app,
        Request::builder()
            .uri(format!("/api/public/albums/{album_id}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["data"]["cover_url"].is_string());

    // Delete the album.
    let (token, _) = csrf_token(&app, Some(&cookie)).await;
    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/api/admin/albums/{album_id}"))
        .header(header::COOKIE, &cookie)
        .header("x-csrf-token", token)
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);

    // Rows and backing files are gone.
    let (status, _, _) = send(
        &app,
        Request::builder()
            .uri(format!("/api/public/albums/{album_id}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(std::fs::read_dir(&gallery).unwrap().count(), 0);
}

// ============================================================================
// Audit & ambient
// ============================================================================

#[tokio::test]
async fn test_audit_trail_records_logins_and_mutations() {
    let (app, _) = spawn_app().await;
    let cookie = login(&app).await;
    create_announcement(&app, &cookie, "Anunt auditat", "2024-06-01", true).await;

    let (status, json, _) = send(
        &app,
        Request::builder()
            .uri("/api/admin/audit?limit=10")
            .header(header::COOKIE, &cookie)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let actions: Vec<&str> = json["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["action"].as_str().unwrap())
        .collect();

    assert!(actions.contains(&"login"));
    assert!(actions.contains(&"create_announcement"));
}

#[tokio::test]
async fn test_failed_logins_are_audited() {
    let (app, _) = spawn_app().await;

    let (token, cookie) = csrf_token(&app, None).await;
    let _ = try_login(&app, "admin", "wrong-password", &cookie, &token).await;

    let admin_cookie = login(&app).await;
    let (status, json, _) = send(
        &app,
        Request::builder()
            .uri("/api/admin/audit?limit=20")
            .header(header::COOKIE, &admin_cookie)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let failed = json["data"]
        .as_array()
        .unwrap()
        .iter()
        .find(|entry| entry["action"] == "login_failed")
        .expect("failed login must be audited");
    assert!(failed["actor"].is_null());
}

#[tokio::test]
async fn test_security_headers_are_set() {
    let (app, _) = spawn_app().await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/public/announcements")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(
        response.headers().get("x-content-type-options").unwrap(),
        "nosniff"
    );
    assert_eq!(response.headers().get("x-frame-options").unwrap(), "DENY");
}

#[tokio::test]
async fn test_system_status_reports_database_health() {
    let (app, _) = spawn_app().await;
    let cookie = login(&app).await;

    let (status, json, _) = send(
        &app,
        Request::builder()
            .uri("/api/admin/system/status")
            .header(header::COOKIE, &cookie)
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["database"], serde_json::json!("ok"));
}
