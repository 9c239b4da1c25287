use async_trait::async_trait;
use plaza_types::*;

use super::{ApiClient, ApiResult};

/// The post and comment operations the controllers depend on.
///
/// [`ApiClient`] is the real implementation; tests substitute a scripted
/// backend.
#[async_trait]
pub trait SocialApi: Send + Sync {
    async fn list_posts(&self, page: u32, limit: u32) -> ApiResult<Page<Post>>;
    async fn create_post(&self, request: &CreatePostRequest) -> ApiResult<Post>;
    async fn update_post(&self, post_id: PostId, request: &UpdatePostRequest) -> ApiResult<Post>;
    async fn delete_post(&self, post_id: PostId) -> ApiResult<()>;
    async fn toggle_post_like(&self, post_id: PostId) -> ApiResult<LikeStatus>;

    async fn list_comments(&self, post_id: PostId) -> ApiResult<Vec<Comment>>;
    async fn create_comment(
        &self,
        post_id: PostId,
        content: String,
        parent: Option<CommentId>,
    ) -> ApiResult<Comment>;
    async fn list_replies(&self, comment_id: CommentId) -> ApiResult<Vec<Comment>>;
    async fn delete_comment(&self, comment_id: CommentId) -> ApiResult<()>;
    async fn toggle_comment_like(&self, comment_id: CommentId) -> ApiResult<LikeStatus>;

    async fn upload_image(&self, file_name: String, bytes: Vec<u8>) -> ApiResult<UploadResponse>;
}

#[async_trait]
impl SocialApi for ApiClient {
    async fn list_posts(&self, page: u32, limit: u32) -> ApiResult<Page<Post>> {
        ApiClient::list_posts(self, page, limit).await
    }

    async fn create_post(&self, request: &CreatePostRequest) -> ApiResult<Post> {
        ApiClient::create_post(self, request).await
    }

    async fn update_post(&self, post_id: PostId, request: &UpdatePostRequest) -> ApiResult<Post> {
        ApiClient::update_post(self, post_id, request).await
    }

    async fn delete_post(&self, post_id: PostId) -> ApiResult<()> {
        ApiClient::delete_post(self, post_id).await
    }

    async fn toggle_post_like(&self, post_id: PostId) -> ApiResult<LikeStatus> {
        ApiClient::toggle_post_like(self, post_id).await
    }

    async fn list_comments(&self, post_id: PostId) -> ApiResult<Vec<Comment>> {
        ApiClient::list_comments(self, post_id).await
    }

    async fn create_comment(
        &self,
        post_id: PostId,
        content: String,
        parent: Option<CommentId>,
    ) -> ApiResult<Comment> {
        ApiClient::create_comment(self, post_id, content, parent).await
    }

    async fn list_replies(&self, comment_id: CommentId) -> ApiResult<Vec<Comment>> {
        ApiClient::list_replies(self, comment_id).await
    }

    async fn delete_comment(&self, comment_id: CommentId) -> ApiResult<()> {
        ApiClient::delete_comment(self, comment_id).await
    }

    async fn toggle_comment_like(&self, comment_id: CommentId) -> ApiResult<LikeStatus> {
        ApiClient::toggle_comment_like(self, comment_id).await
    }

    async fn upload_image(&self, file_name: String, bytes: Vec<u8>) -> ApiResult<UploadResponse> {
        ApiClient::upload_image(self, file_name, bytes).await
    }
}
