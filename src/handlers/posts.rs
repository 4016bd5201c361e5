use crate::db::post_repository::{Page, PostRepository};
use crate::db::user_repository::UserRepository;
use crate::error::ApiError;
use crate::handlers::{ApiResponse, ListResponse};
use crate::models::post::{validate_content, validate_title, Post};
use crate::models::user::AuthenticatedUser;
use crate::utils::ownership::{parse_post_id, require_owner};
use actix_web::{web, HttpResponse};
use chrono::SubsecRound;
use serde::Deserialize;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

const DEFAULT_PAGE_SIZE: usize = 10;
const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListQuery {
    /// 1-based page number
    pub page: Option<usize>,
    /// Page size, 1 to 100. Without `page` or `limit` every post is returned.
    pub limit: Option<usize>,
}

impl ListQuery {
    fn to_page(&self) -> Result<Page, ApiError> {
        if self.page.is_none() && self.limit.is_none() {
            return Ok(Page::default());
        }

        let page = self.page.unwrap_or(1);
        if page == 0 {
            return Err(ApiError::InvalidInput("page must be at least 1".to_string()));
        }

        let limit = self.limit.unwrap_or(DEFAULT_PAGE_SIZE);
        if !(1..=MAX_PAGE_SIZE).contains(&limit) {
            return Err(ApiError::InvalidInput(format!(
                "limit must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }

        Ok(Page {
            skip: (page - 1).saturating_mul(limit),
            limit: Some(limit),
        })
    }
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    /// Display name; defaults to the author's username
    #[serde(default, alias = "author")]
    pub author_name: Option<String>,
}

/// Partial update. `authorId` is not accepted and never changes.
#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePostRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    #[serde(alias = "author")]
    pub author_name: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// List all posts, newest first
#[utoipa::path(
    get,
    path = "/api/posts",
    params(ListQuery),
    responses(
        (status = 200, description = "Posts, newest first", body = [Post]),
        (status = 400, description = "Invalid pagination")
    ),
    tag = "Posts"
)]
pub async fn list_posts(
    post_repo: web::Data<PostRepository>,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse, ApiError> {
    let listing = post_repo.list(query.to_page()?).await?;
    Ok(HttpResponse::Ok().json(ListResponse::new(listing.posts, listing.total)))
}

/// List the caller's own posts
#[utoipa::path(
    get,
    path = "/api/posts/mine",
    params(ListQuery),
    responses(
        (status = 200, description = "The caller's posts, newest first", body = [Post]),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Posts"
)]
pub async fn my_posts(
    user: web::ReqData<AuthenticatedUser>,
    post_repo: web::Data<PostRepository>,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse, ApiError> {
    let listing = post_repo
        .list_by_author(&user.user_id, query.to_page()?)
        .await?;
    Ok(HttpResponse::Ok().json(ListResponse::new(listing.posts, listing.total)))
}

/// Fetch one post
#[utoipa::path(
    get,
    path = "/api/posts/{id}",
    params(("id" = String, Path, description = "Post id (UUID)")),
    responses(
        (status = 200, description = "The post", body = Post),
        (status = 400, description = "Malformed id"),
        (status = 404, description = "No such post")
    ),
    tag = "Posts"
)]
pub async fn get_post(
    post_repo: web::Data<PostRepository>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let id = parse_post_id(&path)?;
    let post = post_repo
        .get_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Post not found".to_string()))?;

    Ok(HttpResponse::Ok().json(ApiResponse::ok(post)))
}

/// Create a post owned by the caller
#[utoipa::path(
    post,
    path = "/api/posts",
    request_body = CreatePostRequest,
    responses(
        (status = 201, description = "Post created", body = Post),
        (status = 400, description = "Invalid input"),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Posts"
)]
pub async fn create_post(
    user: web::ReqData<AuthenticatedUser>,
    post_repo: web::Data<PostRepository>,
    user_repo: web::Data<UserRepository>,
    payload: web::Json<CreatePostRequest>,
) -> Result<HttpResponse, ApiError> {
    let payload = payload.into_inner();
    let title = validate_title(&payload.title).map_err(|m| ApiError::InvalidInput(m.to_string()))?;
    let content =
        validate_content(&payload.content).map_err(|m| ApiError::InvalidInput(m.to_string()))?;

    let author_name = match non_blank(payload.author_name) {
        Some(name) => name,
        None => {
            user_repo
                .get_by_id(&user.user_id)
                .await?
                .ok_or_else(|| ApiError::Unauthorized("User no longer exists".to_string()))?
                .username
        }
    };

    let post = Post {
        id: uuid::Uuid::new_v4().to_string(),
        title,
        content,
        author_name,
        author_id: user.user_id.clone(),
        // stored at microsecond precision
        published_at: chrono::Utc::now().trunc_subsecs(6),
    };

    let post = post_repo.create(post).await?;

    info!(user_id = %user.user_id, post_id = %post.id, "User created post");

    Ok(HttpResponse::Created().json(ApiResponse::ok(post).with_message("Post created")))
}

/// Edit a post the caller owns
#[utoipa::path(
    put,
    path = "/api/posts/{id}",
    params(("id" = String, Path, description = "Post id (UUID)")),
    request_body = UpdatePostRequest,
    responses(
        (status = 200, description = "Post updated", body = Post),
        (status = 400, description = "Malformed id or invalid input"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Post belongs to another user"),
        (status = 404, description = "No such post")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Posts"
)]
pub async fn update_post(
    user: web::ReqData<AuthenticatedUser>,
    post_repo: web::Data<PostRepository>,
    path: web::Path<String>,
    payload: web::Json<UpdatePostRequest>,
) -> Result<HttpResponse, ApiError> {
    let id = parse_post_id(&path)?;
    let mut post = require_owner(post_repo.get_by_id(&id).await?, &user)?;

    let payload = payload.into_inner();
    if payload.title.is_none() && payload.content.is_none() && payload.author_name.is_none() {
        return Err(ApiError::InvalidInput(
            "At least one of title, content or authorName must be provided".to_string(),
        ));
    }

    if let Some(title) = payload.title {
        post.title = validate_title(&title).map_err(|m| ApiError::InvalidInput(m.to_string()))?;
    }
    if let Some(content) = payload.content {
        post.content =
            validate_content(&content).map_err(|m| ApiError::InvalidInput(m.to_string()))?;
    }
    if let Some(name) = non_blank(payload.author_name) {
        post.author_name = name;
    }

    let post = post_repo
        .update(post)
        .await?
        .ok_or_else(|| ApiError::NotFound("Post not found".to_string()))?;

    info!(user_id = %user.user_id, post_id = %post.id, "User updated post");

    Ok(HttpResponse::Ok().json(ApiResponse::ok(post).with_message("Post updated")))
}

/// Delete a post the caller owns
#[utoipa::path(
    delete,
    path = "/api/posts/{id}",
    params(("id" = String, Path, description = "Post id (UUID)")),
    responses(
        (status = 200, description = "Post deleted"),
        (status = 400, description = "Malformed id"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Post belongs to another user"),
        (status = 404, description = "No such post")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Posts"
)]
pub async fn delete_post(
    user: web::ReqData<AuthenticatedUser>,
    post_repo: web::Data<PostRepository>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let id = parse_post_id(&path)?;
    let post = require_owner(post_repo.get_by_id(&id).await?, &user)?;

    post_repo.delete(&post.id).await?;

    info!(user_id = %user.user_id, post_id = %post.id, "User deleted post");

    Ok(HttpResponse::Ok().json(ApiResponse::message("Post deleted")))
}
