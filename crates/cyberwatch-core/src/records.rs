//! Social records persisted by the store.
//!
//! Only the comment carries behaviour (its label). Accounts and posts are
//! plain rows that comments reference.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::Label;

/// Identifier of a `login` row. Clients refer to authors by this id.
pub type LoginId = i64;
/// Identifier of a `user_profile` row.
pub type ProfileId = i64;
pub type PostId = i64;
pub type CommentId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Admin,
    User,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::User => "user",
        }
    }
}

/// A login plus its profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAccount {
    pub username: String,
    pub name: String,
    pub email: String,
    pub account_type: AccountType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPost {
    pub author: ProfileId,
    pub description: String,
}

/// A comment ready to be written. The label is fixed here and never
/// recomputed once the row exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewComment {
    pub body: String,
    pub label: Label,
    pub date: NaiveDate,
    pub author: ProfileId,
    pub post: PostId,
}

/// A stored comment as listed under its post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub body: String,
    pub label: Label,
    pub date: NaiveDate,
    pub author: ProfileId,
    pub author_name: String,
    pub post: PostId,
}
