pub mod api;
pub mod config;
pub mod entities;
pub mod infrastructure;
pub mod services;
pub mod utils;

use crate::config::GatewayConfig;
use crate::services::object_store::ObjectStore;
use crate::services::upload::UploadService;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderName, Method, header},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, patch, post},
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::upload::upload_file,
        api::handlers::users::login,
        api::handlers::users::register,
        api::handlers::users::list_users,
        api::handlers::users::update_user,
        api::handlers::users::delete_user,
        api::handlers::health::health_check,
    ),
    components(
        schemas(
            api::handlers::upload::UploadForm,
            api::handlers::upload::UploadResponse,
            services::upload::UploadResult,
            api::handlers::users::LoginRequest,
            api::handlers::users::TokenResponse,
            api::handlers::users::RegisterRequest,
            api::handlers::users::RegisterResponse,
            api::handlers::users::UpdateUserRequest,
            api::handlers::users::UserResponse,
            api::handlers::users::UserSummary,
            api::handlers::users::UserListResponse,
            api::handlers::users::MessageResponse,
            api::handlers::health::HealthResponse,
            entities::users::Role,
        )
    ),
    tags(
        (name = "upload", description = "File upload"),
        (name = "users", description = "User management"),
        (name = "system", description = "Health and diagnostics")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub object_store: Arc<dyn ObjectStore>,
    pub upload_service: Arc<UploadService>,
    pub config: GatewayConfig,
}

impl AppState {
    pub fn new(db: DatabaseConnection, object_store: Arc<dyn ObjectStore>, config: GatewayConfig) -> Self {
        let upload_service = Arc::new(UploadService::new(object_store.clone(), &config));
        Self {
            db,
            object_store,
            upload_service,
            config,
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    let auth = from_fn_with_state(state.clone(), api::middleware::auth::auth_middleware);

    // Layers run bottom-up: auth first, then the admin check
    let user_admin = Router::new()
        .route("/v1/user", get(api::handlers::users::list_users))
        .route("/v1/user/register", post(api::handlers::users::register))
        .route(
            "/v1/user/:username",
            patch(api::handlers::users::update_user).delete(api::handlers::users::delete_user),
        )
        .route_layer(from_fn(api::middleware::auth::require_admin))
        .route_layer(auth.clone());

    let log_every_request = state.config.log_every_request;
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &axum::http::Request<_>| {
            let request_id = request
                .headers()
                .get("x-request-id")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown");
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id,
            )
        })
        .on_request(move |request: &axum::http::Request<_>, _span: &tracing::Span| {
            if log_every_request {
                let headers: Vec<String> = request
                    .headers()
                    .iter()
                    .filter(|(name, _)| *name != header::AUTHORIZATION)
                    .map(|(name, value)| {
                        format!("{}: {}", name, value.to_str().unwrap_or("<binary>"))
                    })
                    .collect();
                info!("📥 {} {} {:?}", request.method(), request.uri(), headers);
            } else {
                debug!("📥 {} {}", request.method(), request.uri());
            }
        })
        .on_response(
            |response: &axum::http::Response<_>, latency: Duration, _span: &tracing::Span| {
                info!(
                    "📤 Finished in {:?} with status {}",
                    latency,
                    response.status()
                );
            },
        );

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .route("/v1/user/login", post(api::handlers::users::login))
        .route(
            "/v1/upload",
            post(api::handlers::upload::upload_file)
                .layer(DefaultBodyLimit::max(state.config.body_limit))
                .layer(auth),
        )
        .merge(user_admin)
        .layer(cors_layer())
        .layer(from_fn(api::middleware::security::security_headers))
        .layer(trace_layer)
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .with_state(state)
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .expose_headers([HeaderName::from_static("x-request-id")])
        .max_age(Duration::from_secs(86400))
}
