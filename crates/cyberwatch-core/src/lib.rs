pub mod label;
pub mod records;

pub use label::{BULLYING_THRESHOLD, Label, ParseLabelError};
pub use records::{
    AccountType, Comment, CommentId, LoginId, NewAccount, NewComment, NewPost, PostId, ProfileId,
};
