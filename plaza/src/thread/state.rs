use plaza_types::{Comment, CommentId, Post};

/// A top-level comment together with its lazily loaded replies.
#[derive(Debug, Clone, PartialEq)]
pub struct CommentNode {
    pub comment: Comment,
    /// Loaded/visible cache; `comment.replies_count` is the real count
    pub replies: Vec<Comment>,
    pub replies_loaded: bool,
    pub replies_visible: bool,
    pub replies_loading: bool,
    /// Unsent text in this comment's reply box
    pub reply_draft: String,
}

impl CommentNode {
    pub fn new(comment: Comment) -> Self {
        Self {
            comment,
            replies: Vec::new(),
            replies_loaded: false,
            replies_visible: false,
            replies_loading: false,
            reply_draft: String::new(),
        }
    }

    pub fn id(&self) -> CommentId {
        self.comment.id
    }
}

/// Where a comment lives inside a thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    TopLevel,
    Reply { parent: CommentId },
}

/// Which input box a draft belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DraftTarget {
    /// The "write a comment" box under the post
    Thread,
    /// The reply box under a top-level comment
    Reply(CommentId),
}

impl DraftTarget {
    pub fn parent(&self) -> Option<CommentId> {
        match self {
            DraftTarget::Thread => None,
            DraftTarget::Reply(id) => Some(*id),
        }
    }
}

/// Everything a view needs to render one post and its comment thread.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadState {
    /// `None` once the post has been deleted
    pub post: Option<Post>,
    /// Top-level comments: server order for loaded data, newest local ones first
    pub comments: Vec<CommentNode>,
    /// Whether the thread is shown
    pub expanded: bool,
    /// Whether `comments` holds a server snapshot
    pub loaded: bool,
    /// A comment list request is in flight
    pub loading: bool,
    pub comment_draft: String,
}

impl ThreadState {
    pub fn new(post: Post) -> Self {
        Self {
            post: Some(post),
            comments: Vec::new(),
            expanded: false,
            loaded: false,
            loading: false,
            comment_draft: String::new(),
        }
    }

    pub fn node(&self, id: CommentId) -> Option<&CommentNode> {
        self.comments.iter().find(|n| n.id() == id)
    }

    pub(crate) fn node_mut(&mut self, id: CommentId) -> Option<&mut CommentNode> {
        self.comments.iter_mut().find(|n| n.id() == id)
    }

    /// Find a comment, searching top-level comments first, then loaded replies.
    pub fn find_comment(&self, id: CommentId) -> Option<&Comment> {
        self.node(id).map(|n| &n.comment).or_else(|| {
            self.comments
                .iter()
                .flat_map(|n| n.replies.iter())
                .find(|r| r.id == id)
        })
    }

    pub(crate) fn find_comment_mut(&mut self, id: CommentId) -> Option<&mut Comment> {
        if let Some(index) = self.comments.iter().position(|n| n.id() == id) {
            return Some(&mut self.comments[index].comment);
        }
        self.comments
            .iter_mut()
            .flat_map(|n| n.replies.iter_mut())
            .find(|r| r.id == id)
    }

    pub fn locate(&self, id: CommentId) -> Option<Location> {
        if self.node(id).is_some() {
            return Some(Location::TopLevel);
        }
        self.comments
            .iter()
            .find(|n| n.replies.iter().any(|r| r.id == id))
            .map(|n| Location::Reply { parent: n.id() })
    }

    pub fn draft(&self, target: DraftTarget) -> Option<&str> {
        match target {
            DraftTarget::Thread => Some(self.comment_draft.as_str()),
            DraftTarget::Reply(id) => self.node(id).map(|n| n.reply_draft.as_str()),
        }
    }

    pub(crate) fn draft_mut(&mut self, target: DraftTarget) -> Option<&mut String> {
        match target {
            DraftTarget::Thread => Some(&mut self.comment_draft),
            DraftTarget::Reply(id) => self.node_mut(id).map(|n| &mut n.reply_draft),
        }
    }

    /// Head-insert a server-accepted comment and bump the owning counters.
    ///
    /// A reply bumps its parent's `replies_count` and the post's
    /// `comments_count`, and opens the parent's reply list so it shows. If the parent has vanished in the meantime only the
    /// post counter moves.
    pub(crate) fn insert_created(&mut self, comment: Comment, parent: Option<CommentId>) {
        match parent {
            None => {
                self.comments.insert(0, CommentNode::new(comment));
                self.comment_draft.clear();
            }
            Some(parent_id) => match self.node_mut(parent_id) {
                Some(node) => {
                    node.replies.insert(0, comment);
                    node.comment.replies_count += 1;
                    node.replies_visible = true;
                    node.reply_draft.clear();
                }
                None => {
                    log::warn!(
                        "Reply {} created for comment {} which is no longer in the thread",
                        comment.id,
                        parent_id
                    );
                }
            },
        }

        if let Some(post) = self.post.as_mut() {
            post.comments_count += 1;
        }
    }

    /// Remove a comment wherever it lives and drop the owning counters.
    pub(crate) fn remove_deleted(&mut self, id: CommentId) -> Option<Location> {
        let location = self.locate(id)?;
        match location {
            Location::TopLevel => self.comments.retain(|n| n.id() != id),
            Location::Reply { parent } => {
                if let Some(node) = self.node_mut(parent) {
                    node.replies.retain(|r| r.id != id);
                    decrement(&mut node.comment.replies_count);
                }
            }
        }

        if let Some(post) = self.post.as_mut() {
            decrement(&mut post.comments_count);
        }
        Some(location)
    }
}

fn decrement(count: &mut i64) {
    *count = (*count - 1).max(0);
}
