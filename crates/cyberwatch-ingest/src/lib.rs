//! Comment ingestion: validate the request, label the text, persist the row.

use chrono::{Local, NaiveDate};
use cyberwatch_ai::InferenceService;
use cyberwatch_core::{Comment, CommentId, Label, LoginId, NewComment, PostId};
use cyberwatch_store::{CommentStore, StoreError};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("invalid user or post")]
    NotFound {
        author: LoginId,
        post: PostId,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IngestError {
    /// True for rejections caused by the request rather than the backend.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::NotFound { .. })
    }
}

/// Outcome of a successful ingestion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestedComment {
    pub comment_id: CommentId,
    pub bullying_status: Label,
}

/// Ties a store to the classifier for the comment endpoints.
pub struct CommentHandler<'a, S: ?Sized> {
    store: &'a S,
    classifier: &'a InferenceService,
}

impl<'a, S: CommentStore + ?Sized> CommentHandler<'a, S> {
    pub fn new(store: &'a S, classifier: &'a InferenceService) -> Self {
        Self { store, classifier }
    }

    /// Validate, classify, and store a comment dated today.
    pub fn add_comment(
        &self,
        author: Option<LoginId>,
        post: Option<PostId>,
        text: Option<&str>,
    ) -> Result<IngestedComment, IngestError> {
        self.add_comment_on(author, post, text, Local::now().date_naive())
    }

    /// As [`add_comment`](Self::add_comment), with an explicit comment date.
    pub fn add_comment_on(
        &self,
        author: Option<LoginId>,
        post: Option<PostId>,
        text: Option<&str>,
        date: NaiveDate,
    ) -> Result<IngestedComment, IngestError> {
        let (Some(author), Some(post)) = (author, post) else {
            return Err(IngestError::Validation("author and post are required".into()));
        };
        let text = match text {
            Some(t) if !t.is_empty() => t,
            _ => return Err(IngestError::Validation("comment text is required".into())),
        };

        let Some(profile) = self.store.author_profile(author)? else {
            return Err(IngestError::NotFound { author, post });
        };
        if !self.store.post_exists(post)? {
            return Err(IngestError::NotFound { author, post });
        }

        let label = self.classifier.classify(text);
        let comment_id = self.store.insert_comment(&NewComment {
            body: text.to_string(),
            label,
            date,
            author: profile,
            post,
        })?;

        info!(comment = comment_id, post, author, label = %label, "comment added");
        Ok(IngestedComment {
            comment_id,
            bullying_status: label,
        })
    }

    /// Comments on `post`, oldest first.
    pub fn view_comments(&self, post: PostId) -> Result<Vec<Comment>, IngestError> {
        view_comments(self.store, post)
    }
}

/// Comments on `post` with their labels and author names, oldest first.
pub fn view_comments<S: CommentStore + ?Sized>(
    store: &S,
    post: PostId,
) -> Result<Vec<Comment>, IngestError> {
    let comments = store.comments_for_post(post)?;
    debug!(post, count = comments.len(), "listed comments");
    Ok(comments)
}
