//! The paginated post timeline.

use std::sync::Arc;

use plaza_types::{CreatePostRequest, Post, PostId, UpdatePostRequest, Visibility};
use thiserror::Error;

use crate::api::{ApiError, SocialApi};
use crate::confirm::Confirm;
use crate::thread::{PostThread, ThreadError};

pub const DEFAULT_PAGE_SIZE: u32 = 20;

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Cannot post empty content")]
    EmptyContent,

    #[error("Post {0} is not in the feed")]
    UnknownPost(PostId),

    #[error(transparent)]
    Thread(#[from] ThreadError),

    #[error(transparent)]
    Api(#[from] ApiError),
}

pub type FeedResult<T> = Result<T, FeedError>;

/// An image picked for a new post
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Newest-first list of posts, each with its own comment thread
pub struct Feed {
    api: Arc<dyn SocialApi>,
    confirm: Arc<dyn Confirm>,
    threads: Vec<Arc<PostThread>>,
    page: u32,
    page_size: u32,
    has_more: bool,
    total: u64,
}

impl Feed {
    pub fn new(api: Arc<dyn SocialApi>, confirm: Arc<dyn Confirm>) -> Self {
        Self {
            api,
            confirm,
            threads: Vec::new(),
            page: 0,
            page_size: DEFAULT_PAGE_SIZE,
            has_more: false,
            total: 0,
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Live threads in feed order; posts deleted through their thread are skipped
    pub fn threads(&self) -> Vec<Arc<PostThread>> {
        self.threads
            .iter()
            .filter(|t| !t.is_deleted())
            .cloned()
            .collect()
    }

    pub fn thread(&self, post_id: PostId) -> Option<Arc<PostThread>> {
        self.threads
            .iter()
            .find(|t| t.post_id() == post_id && !t.is_deleted())
            .cloned()
    }

    /// Put a post fetched on its own into the feed, or refresh the copy
    /// already there
    pub fn track(&mut self, post: Post) -> Arc<PostThread> {
        self.prune();
        if let Some(thread) = self.thread(post.id) {
            thread.replace_post(post);
            return thread;
        }
        let thread = self.wrap(post);
        self.threads.push(thread.clone());
        thread
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    /// Total posts the server reported on the last page fetch
    pub fn total(&self) -> u64 {
        let deleted = self.threads.iter().filter(|t| t.is_deleted()).count() as u64;
        self.total.saturating_sub(deleted)
    }

    /// Reload the first page, replacing everything
    pub async fn refresh(&mut self) -> FeedResult<()> {
        let page = self.api.list_posts(1, self.page_size).await.map_err(|e| {
            log::warn!("Failed to load feed: {}", e);
            e
        })?;

        for thread in &self.threads {
            thread.cancel_pending();
        }
        self.threads = page.data.into_iter().map(|p| self.wrap(p)).collect();
        self.page = 1;
        self.has_more = page.has_more;
        self.total = page.total;
        log::debug!("Feed refreshed: {} posts, has_more={}", self.threads.len(), self.has_more);
        Ok(())
    }

    /// Append the next page. Returns how many posts were added.
    pub async fn load_more(&mut self) -> FeedResult<usize> {
        if !self.has_more {
            return Ok(0);
        }

        self.prune();
        let next = self.page + 1;
        let page = self.api.list_posts(next, self.page_size).await.map_err(|e| {
            log::warn!("Failed to load feed page {}: {}", next, e);
            e
        })?;

        // Posts created since the first page shift the window; skip repeats
        let fresh: Vec<_> = page
            .data
            .into_iter()
            .filter(|p| self.thread(p.id).is_none())
            .collect();
        let added = fresh.len();
        let wrapped: Vec<_> = fresh.into_iter().map(|p| self.wrap(p)).collect();
        self.threads.extend(wrapped);
        self.page = next;
        self.has_more = page.has_more;
        self.total = page.total;
        Ok(added)
    }

    /// Create a post, uploading its image first when one is attached
    pub async fn publish(
        &mut self,
        content: &str,
        image: Option<ImageUpload>,
        visibility: Visibility,
    ) -> FeedResult<Arc<PostThread>> {
        let content = content.trim();
        if content.is_empty() {
            return Err(FeedError::EmptyContent);
        }

        let image_url = match image {
            Some(image) => {
                let uploaded = self
                    .api
                    .upload_image(image.file_name, image.bytes)
                    .await
                    .map_err(|e| {
                        log::warn!("Image upload failed: {}", e);
                        e
                    })?;
                Some(uploaded.url)
            }
            None => None,
        };

        let request = CreatePostRequest {
            content: content.to_string(),
            image_url,
            is_private: Some(visibility.is_private()),
        };
        let post = self.api.create_post(&request).await.map_err(|e| {
            log::warn!("Failed to create post: {}", e);
            e
        })?;

        self.prune();
        let thread = self.wrap(post);
        self.threads.insert(0, thread.clone());
        self.total += 1;
        Ok(thread)
    }

    pub async fn edit_post(
        &mut self,
        post_id: PostId,
        content: Option<String>,
        visibility: Option<Visibility>,
    ) -> FeedResult<()> {
        let thread = self
            .thread(post_id)
            .ok_or(FeedError::UnknownPost(post_id))?;

        let content = match content {
            Some(text) if text.trim().is_empty() => return Err(FeedError::EmptyContent),
            Some(text) => Some(text.trim().to_string()),
            None => None,
        };
        let request = UpdatePostRequest {
            content,
            is_private: visibility.map(|v| v.is_private()),
        };

        let updated = self.api.update_post(post_id, &request).await.map_err(|e| {
            log::warn!("Failed to update post {}: {}", post_id, e);
            e
        })?;
        thread.replace_post(updated);
        Ok(())
    }

    /// Delete through the post's thread (which asks for confirmation), then drop it
    pub async fn delete_post(&mut self, post_id: PostId) -> FeedResult<()> {
        self.prune();
        let thread = self
            .thread(post_id)
            .ok_or(FeedError::UnknownPost(post_id))?;

        thread.delete_post().await?;

        self.threads.retain(|t| !Arc::ptr_eq(t, &thread));
        self.total = self.total.saturating_sub(1);
        Ok(())
    }

    // Drop threads whose post was deleted without going through the feed
    fn prune(&mut self) {
        let before = self.threads.len();
        self.threads.retain(|t| !t.is_deleted());
        let removed = (before - self.threads.len()) as u64;
        if removed > 0 {
            log::debug!("Pruned {} deleted posts from the feed", removed);
            self.total = self.total.saturating_sub(removed);
        }
    }

    fn wrap(&self, post: Post) -> Arc<PostThread> {
        Arc::new(PostThread::new(
            post,
            self.api.clone(),
            self.confirm.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confirm::{AlwaysDecline, AssumeYes};
    use crate::testing::{sample_post, FakeApi};

    fn posts(count: u64) -> Vec<plaza_types::Post> {
        (1..=count).map(|id| sample_post(id, 0)).collect()
    }

    fn feed_over(api: &Arc<FakeApi>) -> Feed {
        Feed::new(api.clone(), Arc::new(AssumeYes)).with_page_size(2)
    }

    fn post_ids(feed: &Feed) -> Vec<u64> {
        feed.threads()
            .iter()
            .map(|t| t.post_id().0)
            .collect()
    }

    #[tokio::test]
    async fn test_refresh_and_paginate() {
        let api = Arc::new(FakeApi::new().with_posts(posts(5)));
        let mut feed = feed_over(&api);

        feed.refresh().await.unwrap();
        assert_eq!(post_ids(&feed), vec![1, 2]);
        assert!(feed.has_more());
        assert_eq!(feed.total(), 5);

        assert_eq!(feed.load_more().await.unwrap(), 2);
        assert_eq!(feed.load_more().await.unwrap(), 1);
        assert!(!feed.has_more());
        assert_eq!(feed.load_more().await.unwrap(), 0);

        assert_eq!(post_ids(&feed), vec![1, 2, 3, 4, 5]);
        assert_eq!(api.calls("list_posts"), 3);
    }

    #[tokio::test]
    async fn test_refresh_failure_keeps_posts() {
        let api = Arc::new(FakeApi::new().with_posts(posts(3)));
        let mut feed = feed_over(&api);
        feed.refresh().await.unwrap();

        api.fail("list_posts");
        assert!(feed.refresh().await.is_err());
        assert_eq!(post_ids(&feed), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_publish_with_image_uploads_first() {
        let api = Arc::new(FakeApi::new());
        let mut feed = feed_over(&api);

        let image = ImageUpload {
            file_name: "cat.png".to_string(),
            bytes: vec![1, 2, 3],
        };
        let thread = feed
            .publish(" hello world ", Some(image), Visibility::Private)
            .await
            .unwrap();

        let post = thread.post().unwrap();
        assert_eq!(post.content, "hello world");
        assert_eq!(post.image_url.as_deref(), Some("/uploads/cat.png"));
        assert!(post.is_private);
        assert_eq!(api.calls("upload_image"), 1);
        assert_eq!(feed.threads().len(), 1);
    }

    #[tokio::test]
    async fn test_publish_prepends() {
        let api = Arc::new(FakeApi::new().with_posts(posts(2)));
        let mut feed = feed_over(&api);
        feed.refresh().await.unwrap();

        let thread = feed.publish("new", None, Visibility::Public).await.unwrap();

        assert_eq!(feed.threads()[0].post_id(), thread.post_id());
        assert_eq!(feed.threads().len(), 3);
    }

    #[tokio::test]
    async fn test_publish_rejects_empty_content() {
        let api = Arc::new(FakeApi::new());
        let mut feed = feed_over(&api);

        let err = feed.publish("  ", None, Visibility::Public).await.unwrap_err();

        assert!(matches!(err, FeedError::EmptyContent));
        assert_eq!(api.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_failed_upload_creates_nothing() {
        let api = Arc::new(FakeApi::new());
        api.fail("upload_image");
        let mut feed = feed_over(&api);

        let image = ImageUpload {
            file_name: "cat.png".to_string(),
            bytes: vec![0],
        };
        assert!(feed.publish("hi", Some(image), Visibility::Public).await.is_err());
        assert_eq!(api.calls("create_post"), 0);
        assert!(feed.threads().is_empty());
    }

    #[tokio::test]
    async fn test_edit_post_replaces_content() {
        let api = Arc::new(FakeApi::new().with_posts(posts(2)));
        let mut feed = feed_over(&api);
        feed.refresh().await.unwrap();

        feed.edit_post(PostId(2), Some("edited".to_string()), None)
            .await
            .unwrap();

        let post = feed.thread(PostId(2)).unwrap().post().unwrap();
        assert_eq!(post.content, "edited");
    }

    #[tokio::test]
    async fn test_delete_post_removes_thread() {
        let api = Arc::new(FakeApi::new().with_posts(posts(2)));
        let mut feed = feed_over(&api);
        feed.refresh().await.unwrap();

        feed.delete_post(PostId(1)).await.unwrap();

        assert_eq!(post_ids(&feed), vec![2]);
        assert!(feed.thread(PostId(1)).is_none());
    }

    #[tokio::test]
    async fn test_post_deleted_through_its_thread_leaves_feed() {
        let api = Arc::new(FakeApi::new().with_posts(posts(2)));
        let mut feed = feed_over(&api);
        feed.refresh().await.unwrap();
        let total = feed.total();

        let thread = feed.thread(PostId(1)).unwrap();
        thread.delete_post().await.unwrap();

        assert_eq!(thread.post_id(), PostId(1));
        assert_eq!(post_ids(&feed), vec![2]);
        assert!(feed.thread(PostId(1)).is_none());
        assert_eq!(feed.total(), total - 1);

        // Later feed operations drop the dead entry for good
        feed.publish("after", None, Visibility::Public).await.unwrap();
        assert_eq!(feed.threads().len(), 2);
        assert_eq!(feed.total(), total);
    }

    #[tokio::test]
    async fn test_track_then_edit() {
        let api = Arc::new(FakeApi::new().with_posts(posts(3)));
        let mut feed = feed_over(&api);

        let thread = feed.track(sample_post(3, 0));
        assert_eq!(thread.post_id(), PostId(3));

        // Tracking the same post again refreshes the existing thread
        let again = feed.track(sample_post(3, 4));
        assert!(Arc::ptr_eq(&thread, &again));
        assert_eq!(feed.threads().len(), 1);
        assert_eq!(thread.post().unwrap().comments_count, 4);

        feed.edit_post(PostId(3), None, Some(Visibility::Private))
            .await
            .unwrap();
        assert!(thread.post().unwrap().is_private);
    }

    #[tokio::test]
    async fn test_edit_post_rejects_blank_content() {
        let api = Arc::new(FakeApi::new().with_posts(posts(1)));
        let mut feed = feed_over(&api);
        feed.track(sample_post(1, 0));

        let err = feed
            .edit_post(PostId(1), Some("   ".to_string()), None)
            .await
            .unwrap_err();

        assert!(matches!(err, FeedError::EmptyContent));
        assert_eq!(api.calls("update_post"), 0);
    }

    #[tokio::test]
    async fn test_declined_post_delete_keeps_thread() {
        let api = Arc::new(FakeApi::new().with_posts(posts(2)));
        let mut feed = Feed::new(api.clone(), Arc::new(AlwaysDecline));
        feed.refresh().await.unwrap();

        let err = feed.delete_post(PostId(1)).await.unwrap_err();

        assert!(matches!(err, FeedError::Thread(ThreadError::Declined)));
        assert_eq!(post_ids(&feed), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_unknown_post() {
        let api = Arc::new(FakeApi::new());
        let mut feed = feed_over(&api);

        assert!(matches!(
            feed.delete_post(PostId(9)).await,
            Err(FeedError::UnknownPost(PostId(9)))
        ));
    }
}
