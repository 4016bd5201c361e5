use crate::db::{Database, DbError};
use crate::models::post::Post;
use bincode::{Decode, Encode};
use chrono::{DateTime, Utc};
use tracing::info;

const POSTS_TREE: &str = "posts";

#[derive(Debug, Encode, Decode)]
pub struct StoredPost {
    pub id: String,
    pub title: String,
    pub content: String,
    pub author_name: String,
    pub author_id: String,
    pub published_at: i64, // micros, keeps quick successive posts ordered
}

impl From<&Post> for StoredPost {
    fn from(post: &Post) -> Self {
        StoredPost {
            id: post.id.clone(),
            title: post.title.clone(),
            content: post.content.clone(),
            author_name: post.author_name.clone(),
            author_id: post.author_id.clone(),
            published_at: post.published_at.timestamp_micros(),
        }
    }
}

impl From<StoredPost> for Post {
    fn from(stored: StoredPost) -> Self {
        Post {
            id: stored.id,
            title: stored.title,
            content: stored.content,
            author_name: stored.author_name,
            author_id: stored.author_id,
            published_at: DateTime::from_timestamp_micros(stored.published_at)
                .unwrap_or_else(Utc::now),
        }
    }
}

/// Skip/limit window over a sorted listing. `limit: None` returns everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct Page {
    pub skip: usize,
    pub limit: Option<usize>,
}

#[derive(Debug)]
pub struct PostListing {
    pub posts: Vec<Post>,
    pub total: usize,
}

pub struct PostRepository {
    db: Database,
}

impl PostRepository {
    pub fn new(db: Database) -> Self {
        PostRepository { db }
    }

    pub async fn create(&self, post: Post) -> Result<Post, DbError> {
        self.save(&post)?;
        info!(post_id = %post.id, author_id = %post.author_id, "Post created in database");
        Ok(post)
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Option<Post>, DbError> {
        let posts_tree = self.db.tree(POSTS_TREE)?;

        match posts_tree.get(id.as_bytes())? {
            Some(data) => Ok(Some(decode_post(&data)?)),
            None => Ok(None),
        }
    }

    /// Overwrites an existing post. Ownership is the caller's concern.
    ///
    /// Returns `None` without writing if the post is gone, so an update racing
    /// a delete cannot bring the post back.
    pub async fn update(&self, post: Post) -> Result<Option<Post>, DbError> {
        let posts_tree = self.db.tree(POSTS_TREE)?;
        let encoded = bincode::encode_to_vec(StoredPost::from(&post), bincode::config::standard())?;

        let written = posts_tree.update_and_fetch(post.id.as_bytes(), |current| {
            current.map(|_| encoded.clone())
        })?;
        if written.is_none() {
            return Ok(None);
        }

        info!(post_id = %post.id, "Post updated in database");
        Ok(Some(post))
    }

    pub async fn delete(&self, id: &str) -> Result<bool, DbError> {
        let posts_tree = self.db.tree(POSTS_TREE)?;
        let removed = posts_tree.remove(id.as_bytes())?.is_some();
        if removed {
            info!(post_id = %id, "Post deleted from database");
        }
        Ok(removed)
    }

    /// All posts, newest first.
    pub async fn list(&self, page: Page) -> Result<PostListing, DbError> {
        self.list_matching(page, |_| true)
    }

    /// Posts owned by `author_id`, newest first.
    pub async fn list_by_author(&self, author_id: &str, page: Page) -> Result<PostListing, DbError> {
        self.list_matching(page, |post| post.author_id == author_id)
    }

    fn list_matching<F>(&self, page: Page, keep: F) -> Result<PostListing, DbError>
    where
        F: Fn(&Post) -> bool,
    {
        let posts_tree = self.db.tree(POSTS_TREE)?;

        let mut posts = Vec::new();
        for entry in posts_tree.iter() {
            let (_, data) = entry?;
            let post = decode_post(&data)?;
            if keep(&post) {
                posts.push(post);
            }
        }

        posts.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        let total = posts.len();

        let posts = posts
            .into_iter()
            .skip(page.skip)
            .take(page.limit.unwrap_or(usize::MAX))
            .collect();

        Ok(PostListing { posts, total })
    }

    fn save(&self, post: &Post) -> Result<(), DbError> {
        let posts_tree = self.db.tree(POSTS_TREE)?;
        let encoded = bincode::encode_to_vec(StoredPost::from(post), bincode::config::standard())?;
        posts_tree.insert(post.id.as_bytes(), encoded)?;
        Ok(())
    }
}

fn decode_post(data: &[u8]) -> Result<Post, DbError> {
    let (stored, _): (StoredPost, usize) =
        bincode::decode_from_slice(data, bincode::config::standard())?;
    Ok(Post::from(stored))
}
