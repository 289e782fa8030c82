use std::net::SocketAddr;

use axum::{routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{auth, listings, state::AppState};

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .nest(
            "/api/v1",
            Router::new()
                .merge(auth::router())
                .merge(listings::router())
                .route("/health", get(|| async { "ok" })),
        )
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!(
                        "http_request",
                        %method,
                        uri = %uri,
                        status = tracing::field::Empty
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     _latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, "response");
                        } else {
                            tracing::info!(%status, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router, host: &str, port: u16) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn call(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn signed_in(app: &Router) -> String {
        let (status, _) = call(
            app,
            post_json(
                "/api/v1/users/register",
                json!({"username": "alice", "email": "alice@x.com", "password": "Secret123"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = call(
            app,
            post_json(
                "/api/v1/users/login",
                json!({"email": "alice@x.com", "password": "Secret123"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        body["data"]["access_token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn health_answers() {
        let app = build_app(AppState::fake().state);
        let res = app
            .oneshot(Request::get("/api/v1/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn register_login_me() {
        let app = build_app(AppState::fake().state);
        let token = signed_in(&app).await;

        let (status, body) = call(
            &app,
            Request::get("/api/v1/users/me")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["username"], "alice");
        assert!(body["data"].get("password_hash").is_none());
    }

    #[tokio::test]
    async fn login_sets_session_cookies() {
        let app = build_app(AppState::fake().state);
        signed_in(&app).await;
        let res = app
            .clone()
            .oneshot(post_json(
                "/api/v1/users/login",
                json!({"username": "alice", "password": "Secret123"}),
            ))
            .await
            .unwrap();
        let cookies = set_cookies(&res);
        assert_eq!(cookies.len(), 2);
        assert!(cookies.iter().any(|c| c.starts_with("accessToken=")));
        assert!(cookies.iter().all(|c| c.contains("HttpOnly")));
    }

    #[tokio::test]
    async fn bad_login_is_401_envelope() {
        let app = build_app(AppState::fake().state);
        signed_in(&app).await;
        let (status, body) = call(
            &app,
            post_json(
                "/api/v1/users/login",
                json!({"email": "alice@x.com", "password": "nope-nope"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["message"], "Invalid credentials");
    }

    fn set_cookies(res: &axum::response::Response) -> Vec<String> {
        res.headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn malformed_body_gets_json_error() {
        let app = build_app(AppState::fake().state);
        let (status, body) = call(
            &app,
            post_json(
                "/api/v1/users/register",
                json!({"username": "alice", "email": "alice@x.com"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["kind"], "validation_error");
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("password"));
    }

    #[tokio::test]
    async fn malformed_path_gets_json_error() {
        let app = build_app(AppState::fake().state);
        let (status, body) = call(
            &app,
            Request::get("/api/v1/properties/not-a-uuid")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["kind"], "validation_error");
    }

    #[tokio::test]
    async fn forgot_then_reset_password() {
        let fake = AppState::fake();
        let notifier = fake.notifier.clone();
        let app = build_app(fake.state);
        signed_in(&app).await;

        let (status, unknown) = call(
            &app,
            post_json("/api/v1/users/forgot-password", json!({"email": "nobody@x.com"})),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let (status, known) = call(
            &app,
            post_json("/api/v1/users/forgot-password", json!({"email": "alice@x.com"})),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(unknown, known);

        let raw = notifier.last_token_for("alice@x.com").await.expect("link sent");
        let reset = json!({"email": "alice@x.com", "token": raw, "password": "BrandNew123"});
        let (status, _) = call(&app, post_json("/api/v1/users/reset-password", reset.clone())).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = call(
            &app,
            post_json(
                "/api/v1/users/login",
                json!({"email": "alice@x.com", "password": "BrandNew123"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = call(&app, post_json("/api/v1/users/reset-password", reset)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["kind"], "invalid_token");
    }

    #[tokio::test]
    async fn refresh_from_cookie_then_logout() {
        let app = build_app(AppState::fake().state);
        signed_in(&app).await;
        let res = app
            .clone()
            .oneshot(post_json(
                "/api/v1/users/login",
                json!({"username": "alice", "password": "Secret123"}),
            ))
            .await
            .unwrap();
        let refresh_cookie = set_cookies(&res)
            .into_iter()
            .find(|c| c.starts_with("refreshToken="))
            .and_then(|c| c.split(';').next().map(str::to_string))
            .expect("refresh cookie");

        let res = app
            .clone()
            .oneshot(
                Request::post("/api/v1/users/refresh-token")
                    .header(header::COOKIE, &refresh_cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(set_cookies(&res).len(), 2);
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert!(body["data"]["access_token"].as_str().is_some());

        let (status, _) = call(
            &app,
            Request::post("/api/v1/users/refresh-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let res = app
            .clone()
            .oneshot(
                Request::post("/api/v1/users/logout")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let cleared = set_cookies(&res);
        assert_eq!(cleared.len(), 2);
        assert!(cleared.iter().all(|c| c.contains("Max-Age=0")));
        assert!(cleared.iter().any(|c| c.starts_with("accessToken=;")));
    }

    #[tokio::test]
    async fn me_without_token_is_unauthorized() {
        let app = build_app(AppState::fake().state);
        let (status, _) = call(
            &app,
            Request::get("/api/v1/users/me").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn create_listing_via_multipart() {
        let fake = AppState::fake();
        let storage = fake.storage.clone();
        let app = build_app(fake.state);
        let token = signed_in(&app).await;

        let boundary = "XBOUNDARYX";
        let mut body = String::new();
        for (name, value) in [
            ("title", "Sunny flat near the park"),
            ("description", "Two rooms"),
            ("address", "1 Main St"),
            ("regularPrice", "1200"),
            ("beds", "2"),
            ("baths", "1"),
            ("rent", "true"),
        ] {
            body.push_str(&format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            ));
        }
        body.push_str(&format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"property\"; filename=\"a.png\"\r\nContent-Type: image/png\r\n\r\nPNGDATA\r\n--{boundary}--\r\n"
        ));

        let (status, created) = call(
            &app,
            Request::post("/api/v1/properties")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={boundary}"),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["data"]["regularPrice"], 1200);
        assert_eq!(created["data"]["images"].as_array().unwrap().len(), 1);
        assert_eq!(storage.keys().await.len(), 1);

        let (status, list) = call(
            &app,
            Request::get("/api/v1/properties?limit=5").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list["data"].as_array().unwrap().len(), 1);
    }
}
