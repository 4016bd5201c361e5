mod app;
mod config;
mod db;
mod error;
mod handlers;
mod middleware;
mod models;
mod utils;

use actix_cors::Cors;
use actix_web::{App, HttpServer};
use app::AppState;
use config::AppConfig;
use db::Database;
use dotenv::dotenv;
use std::path::Path;
use tracing::{info, warn};
use tracing_actix_web::TracingLogger;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::api::health,
        handlers::auth::register,
        handlers::auth::login,
        handlers::auth::me,
        handlers::posts::list_posts,
        handlers::posts::my_posts,
        handlers::posts::get_post,
        handlers::posts::create_post,
        handlers::posts::update_post,
        handlers::posts::delete_post,
        handlers::upload::upload_image,
        handlers::upload::serve_upload,
    ),
    components(
        schemas(
            handlers::api::HealthResponse,
            handlers::api::HealthChecks,
            handlers::auth::RegisterRequest,
            handlers::auth::LoginRequest,
            handlers::auth::RegisterData,
            handlers::auth::LoginData,
            handlers::posts::CreatePostRequest,
            handlers::posts::UpdatePostRequest,
            handlers::upload::UploadResponse,
            models::user::UserResponse,
            models::post::Post,
        )
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Authentication", description = "User registration, login and identity"),
        (name = "Posts", description = "Public reads, owner-only writes"),
        (name = "Uploads", description = "Image upload and retrieval")
    ),
    modifiers(&SecurityAddon)
)]
struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};

            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some("Enter your JWT token"))
                        .build(),
                ),
            );
        }
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();

    // Structured JSON logs, filtered by RUST_LOG
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .json()
        .init();

    let config = AppConfig::from_env();
    if config.uses_default_secret() {
        warn!("JWT_SECRET is not set, using the built-in default - NOT SECURE FOR PRODUCTION");
    }

    if let Some(parent) = Path::new(&config.db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::create_dir_all(&config.upload_dir)?;

    let database = Database::new(&config.db_path).expect("Failed to initialize database");
    info!(db_path = %config.db_path, "Database initialized");

    let bind_address = config.bind_address();
    let state = AppState::new(database, config);

    info!(bind_address = %bind_address, "Starting blog API server");
    info!("Available endpoints:");
    info!("   GET    /api/health          - Health check (public)");
    info!("   POST   /api/auth/register   - Register new user (public)");
    info!("   POST   /api/auth/login      - Login user (public)");
    info!("   GET    /api/auth/me         - Current user (protected)");
    info!("   GET    /api/posts           - List posts (public)");
    info!("   GET    /api/posts/mine      - List own posts (protected)");
    info!("   GET    /api/posts/{{id}}      - Get post (public)");
    info!("   POST   /api/posts           - Create post (protected)");
    info!("   PUT    /api/posts/{{id}}      - Update own post (protected)");
    info!("   DELETE /api/posts/{{id}}      - Delete own post (protected)");
    info!("   POST   /api/upload          - Upload image (protected)");
    info!("   GET    /uploads/{{filename}} - Fetch uploaded image (public)");
    info!(
        swagger_url = format!("http://{}/swagger-ui/", bind_address),
        "Swagger UI available"
    );

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE"])
            .allowed_headers(vec![
                actix_web::http::header::AUTHORIZATION,
                actix_web::http::header::ACCEPT,
                actix_web::http::header::CONTENT_TYPE,
            ])
            .max_age(3600);

        let state = state.clone();

        App::new()
            .wrap(TracingLogger::default())
            .wrap(cors)
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()),
            )
            .configure(move |cfg| app::configure(cfg, &state))
    })
    .bind(&bind_address)?
    .run()
    .await
}
