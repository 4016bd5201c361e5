use crate::config::AppConfig;
use crate::db::post_repository::PostRepository;
use crate::db::user_repository::UserRepository;
use crate::db::Database;
use crate::error::ApiError;
use crate::handlers;
use crate::middleware::auth::AuthMiddleware;
use crate::middleware::rate_limit::RateLimitMiddleware;
use crate::utils::jwt::TokenService;
use actix_web::{guard, web};
use std::sync::Arc;

/// Everything a worker needs to build its `App`. Cloned into each worker.
#[derive(Clone)]
pub struct AppState {
    pub database: Database,
    pub config: Arc<AppConfig>,
    pub tokens: Arc<TokenService>,
    pub auth_limiter: RateLimitMiddleware,
}

impl AppState {
    pub fn new(database: Database, config: AppConfig) -> Self {
        let tokens = Arc::new(TokenService::from_config(&config));
        let auth_limiter = RateLimitMiddleware::new(config.auth_rate_limit_per_minute);
        AppState {
            database,
            config: Arc::new(config),
            tokens,
            auth_limiter,
        }
    }
}

/// Registers shared data and every route.
pub fn configure(cfg: &mut web::ServiceConfig, state: &AppState) {
    let auth = AuthMiddleware::new(state.tokens.clone());

    cfg.app_data(web::Data::new(UserRepository::new(state.database.clone())))
        .app_data(web::Data::new(PostRepository::new(state.database.clone())))
        .app_data(web::Data::from(state.tokens.clone()))
        .app_data(web::Data::from(state.config.clone()))
        .app_data(web::Data::new(state.database.clone()))
        .app_data(
            web::JsonConfig::default()
                .error_handler(|err, _req| ApiError::InvalidInput(err.to_string()).into()),
        )
        .app_data(
            web::QueryConfig::default()
                .error_handler(|err, _req| ApiError::InvalidInput(err.to_string()).into()),
        )
        // Public routes
        .route("/api/health", web::get().to(handlers::api::health))
        .route("/uploads/{filename}", web::get().to(handlers::upload::serve_upload))
        // Credential routes share a per-IP budget
        .service(
            web::scope("/api/auth")
                .wrap(state.auth_limiter.clone())
                .route("/register", web::post().to(handlers::auth::register))
                .route("/login", web::post().to(handlers::auth::login))
                .service(
                    web::resource("/me")
                        .wrap(auth.clone())
                        .route(web::get().to(handlers::auth::me)),
                ),
        )
        .service(
            web::scope("/api/posts")
                .service(
                    web::resource("/mine")
                        .wrap(auth.clone())
                        .route(web::get().to(handlers::posts::my_posts)),
                )
                .route("", web::get().to(handlers::posts::list_posts))
                .route("/{id}", web::get().to(handlers::posts::get_post))
                // Mutations: a resource whose guard fails is skipped, so reads above stay public
                .service(
                    web::resource("")
                        .guard(guard::Post())
                        .wrap(auth.clone())
                        .route(web::post().to(handlers::posts::create_post)),
                )
                .service(
                    web::resource("/{id}")
                        .guard(guard::Any(guard::Put()).or(guard::Delete()))
                        .wrap(auth.clone())
                        .route(web::put().to(handlers::posts::update_post))
                        .route(web::delete().to(handlers::posts::delete_post)),
                ),
        )
        .service(
            web::resource("/api/upload")
                .wrap(auth)
                .route(web::post().to(handlers::upload::upload_image)),
        );
}
