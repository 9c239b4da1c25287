//! One post and its comment thread.
//!
//! [`PostThread`] owns the in-memory comment tree of a single post: the
//! lazily fetched top-level comments, per-comment reply sets that load on
//! demand, and the counters that have to stay in step with what the server
//! acknowledged. Every mutation is applied only after the server confirms
//! it, so a failed request never needs a rollback.
//!
//! Methods take `&self`. State lives behind a mutex that is released before
//! every network call, which lets a front end fire events while a load is
//! still in flight: a repeated toggle is coalesced instead of issuing a
//! second request, and [`PostThread::cancel_pending`] discards loads whose
//! results are no longer wanted.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use plaza_types::{Comment, CommentId, Post, PostId};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::api::{ApiError, SocialApi};
use crate::confirm::Confirm;

mod state;
pub use state::*;


#[derive(Error, Debug)]
pub enum ThreadError {
    #[error("Cannot post empty content")]
    EmptyContent,

    #[error("Cancelled")]
    Declined,

    #[error("Comment {0} is not part of this thread")]
    UnknownComment(CommentId),

    #[error("Post has been deleted")]
    PostDeleted,

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl ThreadError {
    /// Caught before any request was made
    pub fn is_validation(&self) -> bool {
        matches!(self, ThreadError::EmptyContent)
    }
}

pub type ThreadResult<T> = Result<T, ThreadError>;

/// What a visibility toggle ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadOutcome {
    Expanded,
    Collapsed,
    /// A load for the same target was already in flight; nothing happened
    Coalesced,
    /// The load finished after it was cancelled; its result was dropped
    Discarded,
}

/// Identifies one load so a late result can be recognised and dropped
struct LoadTicket {
    generation: u64,
    token: CancellationToken,
}

impl LoadTicket {
    /// Run `fut` unless the ticket is cancelled first
    async fn run<F: Future>(&self, fut: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => None,
            out = fut => Some(out),
        }
    }
}

struct Inner {
    view: ThreadState,
    epoch: CancellationToken,
    generation: u64,
}

impl Inner {
    fn ticket(&self) -> LoadTicket {
        LoadTicket {
            generation: self.generation,
            token: self.epoch.child_token(),
        }
    }

    fn is_current(&self, ticket: &LoadTicket) -> bool {
        ticket.generation == self.generation && !ticket.token.is_cancelled()
    }

    fn post_id(&self) -> ThreadResult<PostId> {
        self.view
            .post
            .as_ref()
            .map(|p| p.id)
            .ok_or(ThreadError::PostDeleted)
    }
}

/// Controller for one post's comment thread
pub struct PostThread {
    post_id: PostId,
    api: Arc<dyn SocialApi>,
    confirm: Arc<dyn Confirm>,
    inner: Mutex<Inner>,
}

impl PostThread {
    pub fn new(post: Post, api: Arc<dyn SocialApi>, confirm: Arc<dyn Confirm>) -> Self {
        Self {
            post_id: post.id,
            api,
            confirm,
            inner: Mutex::new(Inner {
                view: ThreadState::new(post),
                epoch: CancellationToken::new(),
                generation: 0,
            }),
        }
    }

    // The guard is never held across an await, so a poisoned lock can only
    // come from a panic inside a plain state update; keep going with it.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Copy of the current state for rendering
    pub fn snapshot(&self) -> ThreadState {
        self.lock().view.clone()
    }

    pub fn post(&self) -> Option<Post> {
        self.lock().view.post.clone()
    }

    /// Id of the post, kept even after deletion
    pub fn post_id(&self) -> PostId {
        self.post_id
    }

    pub fn is_deleted(&self) -> bool {
        self.lock().view.post.is_none()
    }

    pub fn is_expanded(&self) -> bool {
        self.lock().view.expanded
    }

    pub fn is_loading(&self) -> bool {
        self.lock().view.loading
    }

    /// Top-level comments in display order
    pub fn comments(&self) -> Vec<Comment> {
        self.lock()
            .view
            .comments
            .iter()
            .map(|n| n.comment.clone())
            .collect()
    }

    /// Cached replies of a top-level comment, loaded or not
    pub fn replies(&self, comment_id: CommentId) -> Option<Vec<Comment>> {
        self.lock().view.node(comment_id).map(|n| n.replies.clone())
    }

    pub fn draft(&self, target: DraftTarget) -> Option<String> {
        self.lock().view.draft(target).map(str::to_string)
    }

    /// Replace the text of an input box
    pub fn set_draft(&self, target: DraftTarget, text: impl Into<String>) -> ThreadResult<()> {
        let mut inner = self.lock();
        match inner.view.draft_mut(target) {
            Some(draft) => {
                *draft = text.into();
                Ok(())
            }
            None => Err(unknown_target(target)),
        }
    }

    /// Show or hide the comment thread.
    ///
    /// Expanding with nothing loaded fetches the post's comments and replaces
    /// the local list with the server's, in server order. Toggling while that
    /// fetch is in flight is coalesced.
    pub async fn toggle_thread(&self) -> ThreadResult<ThreadOutcome> {
        let (post_id, ticket) = {
            let mut inner = self.lock();
            let post_id = inner.post_id()?;

            if inner.view.loading {
                crate::log_thread!("post {}: toggle coalesced into in-flight load", post_id);
                return Ok(ThreadOutcome::Coalesced);
            }

            inner.view.expanded = !inner.view.expanded;
            if !inner.view.expanded {
                crate::log_thread!("post {}: thread collapsed", post_id);
                return Ok(ThreadOutcome::Collapsed);
            }
            if inner.view.loaded && !inner.view.comments.is_empty() {
                crate::log_thread!("post {}: thread expanded from cache", post_id);
                return Ok(ThreadOutcome::Expanded);
            }

            inner.view.loading = true;
            (post_id, inner.ticket())
        };

        crate::log_thread!("post {}: loading comments", post_id);
        let result = ticket.run(self.api.list_comments(post_id)).await;

        let mut inner = self.lock();
        if !inner.is_current(&ticket) {
            crate::log_thread!("post {}: discarding superseded comment load", post_id);
            return Ok(ThreadOutcome::Discarded);
        }
        inner.view.loading = false;

        match result {
            None => Ok(ThreadOutcome::Discarded),
            Some(Ok(comments)) => {
                crate::log_thread!("post {}: loaded {} comments", post_id, comments.len());
                inner.view.comments = comments.into_iter().map(CommentNode::new).collect();
                inner.view.loaded = true;
                Ok(ThreadOutcome::Expanded)
            }
            Some(Err(e)) => {
                log::warn!("Failed to load comments for post {}: {}", post_id, e);
                if !inner.view.loaded {
                    inner.view.expanded = false;
                }
                Err(e.into())
            }
        }
    }

    /// Show or hide the replies of a top-level comment.
    ///
    /// Hiding keeps the cached replies; showing them again reuses the cache
    /// without a request. Only the first expansion fetches.
    pub async fn toggle_replies(&self, comment_id: CommentId) -> ThreadResult<ThreadOutcome> {
        let ticket = {
            let mut inner = self.lock();
            inner.post_id()?;
            let ticket = inner.ticket();
            let node = inner
                .view
                .node_mut(comment_id)
                .ok_or(ThreadError::UnknownComment(comment_id))?;

            if node.replies_loading {
                return Ok(ThreadOutcome::Coalesced);
            }
            if node.replies_visible {
                node.replies_visible = false;
                return Ok(ThreadOutcome::Collapsed);
            }
            if node.replies_loaded {
                node.replies_visible = true;
                return Ok(ThreadOutcome::Expanded);
            }

            node.replies_loading = true;
            ticket
        };

        crate::log_thread!("comment {}: loading replies", comment_id);
        let result = ticket.run(self.api.list_replies(comment_id)).await;

        let mut inner = self.lock();
        if !inner.is_current(&ticket) {
            crate::log_thread!("comment {}: discarding superseded reply load", comment_id);
            return Ok(ThreadOutcome::Discarded);
        }
        let Some(node) = inner.view.node_mut(comment_id) else {
            // The comment was deleted while its replies were loading
            return Ok(ThreadOutcome::Discarded);
        };
        node.replies_loading = false;

        match result {
            None => Ok(ThreadOutcome::Discarded),
            Some(Ok(replies)) => {
                crate::log_thread!("comment {}: loaded {} replies", comment_id, replies.len());
                node.replies = replies;
                node.replies_loaded = true;
                node.replies_visible = true;
                Ok(ThreadOutcome::Expanded)
            }
            Some(Err(e)) => {
                log::warn!("Failed to load replies for comment {}: {}", comment_id, e);
                Err(e.into())
            }
        }
    }

    /// Post a comment, or a reply when `parent` is given.
    ///
    /// Blank text is rejected before any request. On success the new comment
    /// goes to the head of its list, the owning counters move by one and the
    /// matching draft is cleared.
    pub async fn submit_comment(
        &self,
        text: &str,
        parent: Option<CommentId>,
    ) -> ThreadResult<Comment> {
        let content = text.trim();
        if content.is_empty() {
            return Err(ThreadError::EmptyContent);
        }

        let post_id = {
            let inner = self.lock();
            let post_id = inner.post_id()?;
            if let Some(parent_id) = parent {
                if inner.view.node(parent_id).is_none() {
                    return Err(ThreadError::UnknownComment(parent_id));
                }
            }
            post_id
        };

        let created = match self
            .api
            .create_comment(post_id, content.to_string(), parent)
            .await
        {
            Ok(comment) => comment,
            Err(e) => {
                log::warn!("Failed to post comment on post {}: {}", post_id, e);
                return Err(e.into());
            }
        };

        crate::log_thread!(
            "post {}: comment {} created (parent {:?})",
            post_id,
            created.id,
            parent
        );
        self.lock().view.insert_created(created.clone(), parent);
        Ok(created)
    }

    /// Submit whatever is in an input box
    pub async fn submit_draft(&self, target: DraftTarget) -> ThreadResult<Comment> {
        let text = self.draft(target).ok_or_else(|| unknown_target(target))?;
        self.submit_comment(&text, target.parent()).await
    }

    /// Toggle the viewer's like on a comment or reply.
    ///
    /// The server answers with the resulting state, which is then applied;
    /// on failure the comment is left exactly as it was.
    pub async fn toggle_like(&self, comment_id: CommentId) -> ThreadResult<bool> {
        {
            let inner = self.lock();
            inner.post_id()?;
            if inner.view.find_comment(comment_id).is_none() {
                return Err(ThreadError::UnknownComment(comment_id));
            }
        }

        let status = match self.api.toggle_comment_like(comment_id).await {
            Ok(status) => status,
            Err(e) => {
                log::warn!("Failed to toggle like on comment {}: {}", comment_id, e);
                return Err(e.into());
            }
        };

        if let Some(comment) = self.lock().view.find_comment_mut(comment_id) {
            comment.apply_like(status.liked);
        }
        Ok(status.liked)
    }

    /// Toggle the viewer's like on the post itself
    pub async fn toggle_post_like(&self) -> ThreadResult<bool> {
        let post_id = self.lock().post_id()?;

        let status = match self.api.toggle_post_like(post_id).await {
            Ok(status) => status,
            Err(e) => {
                log::warn!("Failed to toggle like on post {}: {}", post_id, e);
                return Err(e.into());
            }
        };

        if let Some(post) = self.lock().view.post.as_mut() {
            post.apply_like(status.liked);
        }
        Ok(status.liked)
    }

    /// Delete a comment or reply after the viewer confirms
    pub async fn delete_comment(&self, comment_id: CommentId) -> ThreadResult<()> {
        {
            let inner = self.lock();
            inner.post_id()?;
            if inner.view.locate(comment_id).is_none() {
                return Err(ThreadError::UnknownComment(comment_id));
            }
        }

        if !self.confirm.confirm("Delete this comment?") {
            return Err(ThreadError::Declined);
        }

        if let Err(e) = self.api.delete_comment(comment_id).await {
            log::warn!("Failed to delete comment {}: {}", comment_id, e);
            return Err(e.into());
        }

        let location = self.lock().view.remove_deleted(comment_id);
        crate::log_thread!("comment {} deleted ({:?})", comment_id, location);
        Ok(())
    }

    /// Delete the post after the viewer confirms; the thread then renders nothing
    pub async fn delete_post(&self) -> ThreadResult<()> {
        let post_id = self.lock().post_id()?;

        if !self
            .confirm
            .confirm("Are you sure you want to delete this post?")
        {
            return Err(ThreadError::Declined);
        }

        if let Err(e) = self.api.delete_post(post_id).await {
            log::warn!("Failed to delete post {}: {}", post_id, e);
            return Err(e.into());
        }

        let mut inner = self.lock();
        inner.cancel_loads();
        inner.view.post = None;
        inner.view.comments.clear();
        inner.view.expanded = false;
        inner.view.loaded = false;
        crate::log_thread!("post {} deleted", post_id);
        Ok(())
    }

    /// Replace the post with a fresher server copy (after an edit)
    pub fn replace_post(&self, post: Post) {
        let mut inner = self.lock();
        if inner.view.post.as_ref().map(|p| p.id) == Some(post.id) {
            inner.view.post = Some(post);
        }
    }

    /// Abandon every load in flight; their results will be discarded.
    ///
    /// Mutations (comment, like, delete) are not cancelled: once sent, the
    /// server applies them and their results must still be merged.
    pub fn cancel_pending(&self) {
        self.lock().cancel_loads();
    }
}

// Only a reply box can point at a missing comment
fn unknown_target(target: DraftTarget) -> ThreadError {
    match target {
        DraftTarget::Reply(id) => ThreadError::UnknownComment(id),
        DraftTarget::Thread => ThreadError::PostDeleted,
    }
}

impl Inner {
    fn cancel_loads(&mut self) {
        self.epoch.cancel();
        self.epoch = CancellationToken::new();
        self.generation += 1;
        if self.view.loading && !self.view.loaded {
            // Nothing to show for the abandoned expansion
            self.view.expanded = false;
        }
        self.view.loading = false;
        for node in &mut self.view.comments {
            node.replies_loading = false;
        }
    }
}

impl Drop for PostThread {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(|e| e.into_inner());
        inner.epoch.cancel();
    }
}

impl std::fmt::Debug for PostThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostThread")
            .field("state", &self.snapshot())
            .finish()
    }
}
