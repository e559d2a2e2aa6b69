#![allow(clippy::needless_for_each)]

use anyhow::Result;
use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Method, Request},
    routing::{get, post},
    Extension, Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{debug_span, info, Span};
use ulid::Ulid;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod handlers;
pub mod state;

use handlers::{health, signup, types};
pub use state::{spawn_janitor, Registration, SignupState};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        signup::signup_start,
        signup::signup_verify,
        signup::signup_resend,
        signup::signup_cancel,
        signup::signup_status,
    ),
    components(
        schemas(
            health::Health,
            types::SignupStartRequest,
            types::SignupStartResponse,
            types::VerifyCodeRequest,
            types::EmailRequest,
            types::UserResponse,
            types::SignupError,
            types::StatusResponse,
            crate::users::Role,
        )
    ),
    tags(
        (name = "signup", description = "Email verified account signup"),
        (name = "health", description = "Service health"),
    )
)]
struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

/// Build the application router.
///
/// `pool` is only used by `/health`; stores already hold their own handles.
pub fn router(state: Arc<SignupState>, pool: Option<PgPool>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(Any);

    Router::new()
        .route("/v1/signup/start", post(signup::signup_start))
        .route("/v1/signup/verify", post(signup::signup_verify))
        .route("/v1/signup/resend", post(signup::signup_resend))
        .route("/v1/signup/cancel", post(signup::signup_cancel))
        .route("/v1/signup/status", get(signup::signup_status))
        .route("/health", get(health::health).options(health::health))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(state))
                .layer(Extension(pool)),
        )
}

/// Serve the signup API until ctrl-c.
/// # Errors
/// Returns an error if the listener cannot be bound or the server fails
pub async fn new(port: u16, state: Arc<SignupState>, pool: Option<PgPool>) -> Result<()> {
    let app = router(state, pool);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {err}");
            }
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

// span
fn make_span(request: &Request<Body>) -> Span {
    let headers = request.headers();
    let path = request.uri().path();
    let request_id = headers
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");

    debug_span!("http.request", path, request_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::LogNotifier;
    use crate::otp::{MemoryCodeStore, OtpService};
    use crate::users::MemoryUserStore;
    use anyhow::Result;
    use axum::{body::to_bytes, http::StatusCode};
    use tower::ServiceExt;

    fn app() -> Router {
        let otp = Arc::new(OtpService::new(Arc::new(MemoryCodeStore::new())));
        let state = Arc::new(SignupState::new(
            otp,
            Arc::new(LogNotifier::new(10)),
            Arc::new(MemoryUserStore::new()),
        ));
        router(state, None)
    }

    #[tokio::test]
    async fn health_carries_request_id() -> Result<()> {
        let response = app()
            .oneshot(Request::builder().uri("/health").body(Body::empty())?)
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        Ok(())
    }

    #[tokio::test]
    async fn start_route_accepts_json() -> Result<()> {
        let body = serde_json::json!({
            "id": "emp9",
            "email": "riley@example.com",
            "name": "Riley",
            "role": "employee",
            "password": "0f".repeat(32),
        });
        let response = app()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/v1/signup/start")
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::to_vec(&body)?))?,
            )
            .await?;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        Ok(())
    }

    #[tokio::test]
    async fn status_route_reads_query() -> Result<()> {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/v1/signup/status?email=riley@example.com")
                    .body(Body::empty())?,
            )
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await?;
        let value: serde_json::Value = serde_json::from_slice(&body)?;
        assert_eq!(value["verified"], false);
        Ok(())
    }

    #[test]
    fn openapi_lists_signup_paths() {
        let doc = openapi();
        for path in [
            "/health",
            "/v1/signup/start",
            "/v1/signup/verify",
            "/v1/signup/resend",
            "/v1/signup/cancel",
            "/v1/signup/status",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
