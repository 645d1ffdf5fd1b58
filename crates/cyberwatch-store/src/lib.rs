//! Storage layer: the comment persistence seam and its DuckDB implementation.

mod error;
pub use error::StoreError;

#[cfg(feature = "duckdb")]
mod duck;
#[cfg(feature = "duckdb")]
pub use duck::DuckStore;

use cyberwatch_core::{Comment, CommentId, LoginId, NewComment, PostId, ProfileId};

/// Lookups and writes the comment pipeline needs from storage.
pub trait CommentStore {
    /// Profile owned by `login`, if that login exists and has one.
    fn author_profile(&self, login: LoginId) -> Result<Option<ProfileId>, StoreError>;

    fn post_exists(&self, post: PostId) -> Result<bool, StoreError>;

    /// Persist a comment and return its new id.
    fn insert_comment(&self, comment: &NewComment) -> Result<CommentId, StoreError>;

    /// Comments on `post`, oldest first.
    fn comments_for_post(&self, post: PostId) -> Result<Vec<Comment>, StoreError>;
}
