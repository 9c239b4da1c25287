//! Scripted in-memory backend shared by the controller tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use plaza_types::*;
use tokio::sync::Semaphore;

use crate::api::{ApiError, ApiResult, SocialApi};
use crate::session::test_user;

pub(crate) fn sample_post(id: u64, comments_count: i64) -> Post {
    let now = Utc::now();
    Post {
        id: PostId(id),
        content: format!("post {}", id),
        image_url: None,
        is_private: false,
        created_at: now,
        updated_at: now,
        user: test_user(1),
        likes_count: 0,
        comments_count,
        is_liked: false,
    }
}

pub(crate) fn sample_comment(id: u64, post_id: u64, parent: Option<u64>) -> Comment {
    let now = Utc::now();
    Comment {
        id: CommentId(id),
        post_id: PostId(post_id),
        parent_comment_id: parent.map(CommentId),
        content: format!("comment {}", id),
        created_at: now,
        updated_at: now,
        user: test_user(2),
        likes_count: 0,
        replies_count: 0,
        is_liked: false,
    }
}

#[derive(Default)]
struct Backend {
    posts: Vec<Post>,
    comments: Vec<Comment>,
    liked_posts: HashSet<PostId>,
    liked_comments: HashSet<CommentId>,
    failing: HashSet<&'static str>,
    calls: Vec<&'static str>,
    sent_content: Vec<String>,
    next_id: u64,
}

/// Fake [`SocialApi`] with server-side like state, injectable failures and a
/// gate that parks list requests until released.
pub(crate) struct FakeApi {
    backend: Mutex<Backend>,
    hold_loads: AtomicBool,
    gate: Semaphore,
}

impl FakeApi {
    pub fn new() -> Self {
        Self {
            backend: Mutex::new(Backend {
                next_id: 1000,
                ..Backend::default()
            }),
            hold_loads: AtomicBool::new(false),
            gate: Semaphore::new(0),
        }
    }

    pub fn with_posts(self, posts: Vec<Post>) -> Self {
        self.backend.lock().unwrap().posts = posts;
        self
    }

    pub fn with_comments(self, comments: Vec<Comment>) -> Self {
        self.backend.lock().unwrap().comments = comments;
        self
    }

    /// Make every future call of `op` fail with a server error
    pub fn fail(&self, op: &'static str) {
        self.backend.lock().unwrap().failing.insert(op);
    }

    pub fn recover(&self, op: &'static str) {
        self.backend.lock().unwrap().failing.remove(op);
    }

    /// Park list requests until [`FakeApi::release`] is called
    pub fn hold_loads(&self) {
        self.hold_loads.store(true, Ordering::SeqCst);
    }

    pub fn release(&self, count: usize) {
        self.hold_loads.store(false, Ordering::SeqCst);
        self.gate.add_permits(count);
    }

    pub fn calls(&self, op: &str) -> usize {
        self.backend
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| **c == op)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.backend.lock().unwrap().calls.len()
    }

    pub fn sent_content(&self) -> Vec<String> {
        self.backend.lock().unwrap().sent_content.clone()
    }

    /// Wait until `op` has been requested at least `count` times
    pub async fn wait_for_calls(&self, op: &str, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.calls(op) < count {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("request was never issued");
    }

    fn begin(&self, op: &'static str) -> ApiResult<()> {
        let mut backend = self.backend.lock().unwrap();
        backend.calls.push(op);
        if backend.failing.contains(op) {
            return Err(ApiError::Api {
                status: 500,
                message: format!("{} failed", op),
            });
        }
        Ok(())
    }

    async fn gated(&self) {
        if self.hold_loads.load(Ordering::SeqCst) {
            self.gate.acquire().await.unwrap().forget();
        }
    }
}

#[async_trait]
impl SocialApi for FakeApi {
    async fn list_posts(&self, page: u32, limit: u32) -> ApiResult<Page<Post>> {
        self.begin("list_posts")?;
        let backend = self.backend.lock().unwrap();
        let start = ((page.max(1) - 1) * limit) as usize;
        let data: Vec<Post> = backend
            .posts
            .iter()
            .skip(start)
            .take(limit as usize)
            .cloned()
            .collect();
        let total = backend.posts.len() as u64;
        Ok(Page {
            success: true,
            has_more: (start + data.len()) < backend.posts.len(),
            data,
            page,
            limit,
            total,
        })
    }

    async fn create_post(&self, request: &CreatePostRequest) -> ApiResult<Post> {
        self.begin("create_post")?;
        let mut backend = self.backend.lock().unwrap();
        backend.next_id += 1;
        let mut post = sample_post(backend.next_id, 0);
        post.content = request.content.clone();
        post.image_url = request.image_url.clone();
        post.is_private = request.is_private.unwrap_or(false);
        backend.posts.insert(0, post.clone());
        Ok(post)
    }

    async fn update_post(&self, post_id: PostId, request: &UpdatePostRequest) -> ApiResult<Post> {
        self.begin("update_post")?;
        let mut backend = self.backend.lock().unwrap();
        let post = backend
            .posts
            .iter_mut()
            .find(|p| p.id == post_id)
            .ok_or_else(|| ApiError::NotFound("Post not found".to_string()))?;
        if let Some(content) = &request.content {
            post.content = content.clone();
        }
        if let Some(is_private) = request.is_private {
            post.is_private = is_private;
        }
        Ok(post.clone())
    }

    async fn delete_post(&self, post_id: PostId) -> ApiResult<()> {
        self.begin("delete_post")?;
        self.backend
            .lock()
            .unwrap()
            .posts
            .retain(|p| p.id != post_id);
        Ok(())
    }

    async fn toggle_post_like(&self, post_id: PostId) -> ApiResult<LikeStatus> {
        self.begin("toggle_post_like")?;
        let mut backend = self.backend.lock().unwrap();
        let liked = !backend.liked_posts.remove(&post_id);
        if liked {
            backend.liked_posts.insert(post_id);
        }
        Ok(LikeStatus { liked })
    }

    async fn list_comments(&self, post_id: PostId) -> ApiResult<Vec<Comment>> {
        self.begin("list_comments")?;
        self.gated().await;
        Ok(self
            .backend
            .lock()
            .unwrap()
            .comments
            .iter()
            .filter(|c| c.post_id == post_id && c.parent_comment_id.is_none())
            .cloned()
            .collect())
    }

    async fn create_comment(
        &self,
        post_id: PostId,
        content: String,
        parent: Option<CommentId>,
    ) -> ApiResult<Comment> {
        self.begin("create_comment")?;
        let mut backend = self.backend.lock().unwrap();
        backend.next_id += 1;
        let mut comment = sample_comment(backend.next_id, post_id.0, parent.map(|p| p.0));
        comment.content = content.clone();
        backend.sent_content.push(content);
        backend.comments.push(comment.clone());
        Ok(comment)
    }

    async fn list_replies(&self, comment_id: CommentId) -> ApiResult<Vec<Comment>> {
        self.begin("list_replies")?;
        self.gated().await;
        Ok(self
            .backend
            .lock()
            .unwrap()
            .comments
            .iter()
            .filter(|c| c.parent_comment_id == Some(comment_id))
            .cloned()
            .collect())
    }

    async fn delete_comment(&self, comment_id: CommentId) -> ApiResult<()> {
        self.begin("delete_comment")?;
        self.backend
            .lock()
            .unwrap()
            .comments
            .retain(|c| c.id != comment_id);
        Ok(())
    }

    async fn toggle_comment_like(&self, comment_id: CommentId) -> ApiResult<LikeStatus> {
        self.begin("toggle_comment_like")?;
        let mut backend = self.backend.lock().unwrap();
        let liked = !backend.liked_comments.remove(&comment_id);
        if liked {
            backend.liked_comments.insert(comment_id);
        }
        Ok(LikeStatus { liked })
    }

    async fn upload_image(&self, file_name: String, _bytes: Vec<u8>) -> ApiResult<UploadResponse> {
        self.begin("upload_image")?;
        Ok(UploadResponse {
            url: format!("/uploads/{}", file_name),
            filename: file_name,
        })
    }
}
