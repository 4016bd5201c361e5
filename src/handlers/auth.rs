use crate::db::user_repository::UserRepository;
use crate::db::DbError;
use crate::error::ApiError;
use crate::handlers::ApiResponse;
use crate::models::user::{AuthenticatedUser, User, UserResponse};
use crate::utils::jwt::TokenService;
use crate::utils::password::{hash_password, verify_password, PASSWORD_MIN_CHARS};
use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;

const USERNAME_MIN_CHARS: usize = 3;
const USERNAME_MAX_CHARS: usize = 20;
const BAD_CREDENTIALS: &str = "Incorrect username or password";
const MISSING_CREDENTIALS: &str = "Username and password cannot be empty";

#[derive(Deserialize, ToSchema)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Serialize, ToSchema)]
pub struct RegisterData {
    pub username: String,
    pub token: String,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginData {
    pub username: String,
    pub user_id: String,
    pub token: String,
}

fn validate_registration(username: &str, password: &str) -> Result<(), ApiError> {
    if username.is_empty() || password.is_empty() {
        return Err(ApiError::InvalidInput(MISSING_CREDENTIALS.to_string()));
    }

    let length = username.chars().count();
    if !(USERNAME_MIN_CHARS..=USERNAME_MAX_CHARS).contains(&length) {
        return Err(ApiError::InvalidInput(format!(
            "Username must be between {} and {} characters",
            USERNAME_MIN_CHARS, USERNAME_MAX_CHARS
        )));
    }

    if password.chars().count() < PASSWORD_MIN_CHARS {
        return Err(ApiError::InvalidInput(format!(
            "Password must be at least {} characters",
            PASSWORD_MIN_CHARS
        )));
    }

    Ok(())
}

/// Register a new user
#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered, token issued", body = RegisterData),
        (status = 400, description = "Missing fields, invalid shape, or username taken"),
        (status = 429, description = "Too many requests")
    ),
    tag = "Authentication"
)]
pub async fn register(
    user_repo: web::Data<UserRepository>,
    tokens: web::Data<TokenService>,
    payload: web::Json<RegisterRequest>,
) -> Result<HttpResponse, ApiError> {
    let payload = payload.into_inner();
    let username = payload.username.trim().to_string();
    info!(username = %username, "Registration attempt");

    if let Err(e) = validate_registration(&username, &payload.password) {
        warn!(username = %username, reason = %e, "Registration failed: invalid input");
        return Err(e);
    }

    // Cheap check before paying for a hash; `create` still enforces uniqueness
    if user_repo.get_by_username(&username).await?.is_some() {
        warn!(username = %username, "Registration failed: username already exists");
        return Err(DbError::UsernameTaken.into());
    }

    let password = payload.password;
    let password_hash = web::block(move || hash_password(&password))
        .await?
        .map_err(|e| ApiError::Internal(format!("Failed to hash password: {}", e)))?;

    let user = User {
        id: uuid::Uuid::new_v4().to_string(),
        username,
        password_hash,
        created_at: chrono::Utc::now(),
    };

    let user = user_repo.create(user).await.map_err(|e| {
        if matches!(e, DbError::UsernameTaken) {
            warn!("Registration failed: username claimed concurrently");
        }
        ApiError::from(e)
    })?;

    let token = tokens.issue(&user.id)?;

    info!(user_id = %user.id, username = %user.username, "User registered successfully");

    Ok(HttpResponse::Created().json(
        ApiResponse::ok(RegisterData {
            username: user.username,
            token,
        })
        .with_message("Registration successful"),
    ))
}

/// Login an existing user
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginData),
        (status = 400, description = "Missing fields"),
        (status = 401, description = "Invalid credentials"),
        (status = 429, description = "Too many requests")
    ),
    tag = "Authentication"
)]
pub async fn login(
    user_repo: web::Data<UserRepository>,
    tokens: web::Data<TokenService>,
    payload: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    let payload = payload.into_inner();
    let username = payload.username.trim();
    info!(username = %username, "Login attempt");

    if username.is_empty() || payload.password.is_empty() {
        return Err(ApiError::InvalidInput(MISSING_CREDENTIALS.to_string()));
    }

    let user = match user_repo.get_by_username(username).await? {
        Some(u) => u,
        None => {
            warn!(username = %username, "Login failed: user not found");
            return Err(ApiError::Unauthorized(BAD_CREDENTIALS.to_string()));
        }
    };

    let password = payload.password;
    let stored_hash = user.password_hash.clone();
    let password_ok = web::block(move || verify_password(&password, &stored_hash)).await?;
    if !password_ok {
        warn!(username = %username, "Login failed: invalid credentials");
        return Err(ApiError::Unauthorized(BAD_CREDENTIALS.to_string()));
    }

    let token = tokens.issue(&user.id)?;

    info!(username = %user.username, user_id = %user.id, "User logged in successfully");

    Ok(HttpResponse::Ok().json(
        ApiResponse::ok(LoginData {
            username: user.username,
            user_id: user.id,
            token,
        })
        .with_message("Login successful"),
    ))
}

/// Current user, resolved from the bearer token
#[utoipa::path(
    get,
    path = "/api/auth/me",
    responses(
        (status = 200, description = "Authenticated user", body = UserResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "User no longer exists")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Authentication"
)]
pub async fn me(
    user: web::ReqData<AuthenticatedUser>,
    user_repo: web::Data<UserRepository>,
) -> Result<HttpResponse, ApiError> {
    let account = user_repo
        .get_by_id(&user.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    Ok(HttpResponse::Ok().json(ApiResponse::ok(UserResponse::from(account))))
}

#[cfg(test)]
mod tests {
    use crate::app::testing::*;
    use crate::utils::jwt::TokenService;
    use actix_web::{http::StatusCode, test};
    use serde_json::json;

    fn login_request(username: &str, password: &str) -> test::TestRequest {
        test::TestRequest::post()
            .uri("/api/auth/login")
            .set_json(json!({ "username": username, "password": password }))
    }

    #[actix_web::test]
    async fn test_register_returns_created_with_token() {
        let state = test_state();
        let app = init_test_app!(state);

        let req = test::TestRequest::post()
            .uri("/api/auth/register")
            .set_json(json!({ "username": "alice", "password": "secret1" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["username"], "alice");
        assert!(body["data"]["token"].as_str().is_some());
        assert!(body["data"].get("password").is_none());
        assert!(body["data"].get("passwordHash").is_none());
    }

    #[actix_web::test]
    async fn test_register_trims_username() {
        let state = test_state();
        let app = init_test_app!(state);

        let body = register_user!(app, "  bob  ", "secret1");
        assert_eq!(body["data"]["username"], "bob");

        let resp = test::call_service(&app, login_request("bob", "secret1").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn test_register_rejects_bad_shapes() {
        let state = test_state();
        let app = init_test_app!(state);

        let cases = [
            json!({ "username": "alice" }),
            json!({ "password": "secret1" }),
            json!({ "username": "", "password": "secret1" }),
            json!({ "username": "ab", "password": "secret1" }),
            json!({ "username": "a".repeat(21), "password": "secret1" }),
            json!({ "username": "alice", "password": "short" }),
        ];

        for case in cases {
            let req = test::TestRequest::post()
                .uri("/api/auth/register")
                .set_json(&case)
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "case {}", case);
            let body: serde_json::Value = test::read_body_json(resp).await;
            assert_eq!(body["success"], false);
        }
    }

    #[actix_web::test]
    async fn test_malformed_json_is_uniform_400() {
        let state = test_state();
        let app = init_test_app!(state);

        let req = test::TestRequest::post()
            .uri("/api/auth/register")
            .insert_header(("Content-Type", "application/json"))
            .set_payload("{not json")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], false);
    }

    #[actix_web::test]
    async fn test_duplicate_username_is_conflict() {
        let state = test_state();
        let app = init_test_app!(state);

        let req = test::TestRequest::post()
            .uri("/api/auth/register")
            .set_json(json!({ "username": "carol", "password": "secret1" }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CREATED);

        let req = test::TestRequest::post()
            .uri("/api/auth/register")
            .set_json(json!({ "username": "carol", "password": "different" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["message"], "Username is already registered");
    }

    #[actix_web::test]
    async fn test_register_then_login_resolve_to_same_user() {
        let state = test_state();
        let app = init_test_app!(state);

        let registered = register_user!(app, "dave", "secret1");
        let register_token = registered["data"]["token"].as_str().unwrap().to_string();

        let resp = test::call_service(&app, login_request("dave", "secret1").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["username"], "dave");
        assert!(body["data"].get("password").is_none());
        let login_token = body["data"]["token"].as_str().unwrap().to_string();
        let user_id = body["data"]["userId"].as_str().unwrap().to_string();

        assert_ne!(register_token, login_token);

        let tokens = TokenService::from_config(&state.config);
        assert_eq!(tokens.verify(&register_token).unwrap().sub, user_id);
        assert_eq!(tokens.verify(&login_token).unwrap().sub, user_id);
    }

    #[actix_web::test]
    async fn test_bad_password_and_unknown_user_look_identical() {
        let state = test_state();
        let app = init_test_app!(state);
        let _ = register_user!(app, "erin", "secret1");

        let wrong_password = test::call_service(&app, login_request("erin", "nope-nope").to_request()).await;
        assert_eq!(wrong_password.status(), StatusCode::UNAUTHORIZED);
        let wrong_password: serde_json::Value = test::read_body_json(wrong_password).await;

        let unknown_user = test::call_service(&app, login_request("nobody", "secret1").to_request()).await;
        assert_eq!(unknown_user.status(), StatusCode::UNAUTHORIZED);
        let unknown_user: serde_json::Value = test::read_body_json(unknown_user).await;

        assert_eq!(wrong_password, unknown_user);
    }

    #[actix_web::test]
    async fn test_login_requires_both_fields() {
        let state = test_state();
        let app = init_test_app!(state);

        let resp = test::call_service(&app, login_request("erin", "").to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_me_returns_profile_without_secrets() {
        let state = test_state();
        let app = init_test_app!(state);
        let (user_id, token) = signed_in_user!(app, "frank");

        let req = test::TestRequest::get()
            .uri("/api/auth/me")
            .insert_header(bearer(&token))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["data"]["id"], user_id.as_str());
        assert_eq!(body["data"]["username"], "frank");
        let raw = body.to_string();
        assert!(!raw.contains("password"));
        assert!(!raw.contains("argon2"));
        assert!(!raw.to_lowercase().contains("created"));
    }

    #[actix_web::test]
    async fn test_me_requires_token() {
        let state = test_state();
        let app = init_test_app!(state);

        let resp =
            test::call_service(&app, test::TestRequest::get().uri("/api/auth/me").to_request())
                .await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn test_me_for_vanished_user_is_not_found() {
        let state = test_state();
        let app = init_test_app!(state);
        let token = state.tokens.issue("00000000-0000-4000-8000-000000000000").unwrap();

        let req = test::TestRequest::get()
            .uri("/api/auth/me")
            .insert_header(bearer(&token))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
