use crate::error::ApiError;
use crate::models::post::Post;
use crate::models::user::AuthenticatedUser;
use tracing::warn;

/// Existence first (404), then ownership (403). Returns the post when the caller owns it.
pub fn require_owner(post: Option<Post>, user: &AuthenticatedUser) -> Result<Post, ApiError> {
    let post = post.ok_or_else(|| ApiError::NotFound("Post not found".to_string()))?;

    if post.author_id != user.user_id {
        warn!(
            post_id = %post.id,
            user_id = %user.user_id,
            "Rejected mutation of a post owned by another user"
        );
        return Err(ApiError::Forbidden(
            "You can only modify your own posts".to_string(),
        ));
    }

    Ok(post)
}

/// Parse a path id as a store key.
pub fn parse_post_id(raw: &str) -> Result<String, ApiError> {
    uuid::Uuid::parse_str(raw)
        .map(|id| id.to_string())
        .map_err(|_| ApiError::MalformedIdentifier)
}
