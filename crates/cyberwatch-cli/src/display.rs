//! Vertical card display for comments under a post.

use std::fmt::Write;

use cyberwatch_core::{Comment, PostId};

const LABEL_WIDTH: usize = 10;

// ── Public API ──

/// Print every comment on `post` as a card, oldest first.
pub fn print_comment_cards(post: PostId, comments: &[Comment]) {
    println!("=== Post {post} ===");
    if comments.is_empty() {
        println!("(no comments)");
        return;
    }
    println!("{} comment(s), {} flagged", comments.len(), flagged(comments));
    for comment in comments {
        println!();
        print!("{}", comment_card(comment));
    }
}

// ── Card rendering ──

fn comment_card(comment: &Comment) -> String {
    let marker = if comment.label.is_bullying() { " [!]" } else { "" };
    let mut out = String::new();
    let _ = writeln!(out, "Comment #{}{marker}", comment.id);
    for (field, value) in [
        ("author", format!("{} (profile {})", comment.author_name, comment.author)),
        ("date", comment.date.to_string()),
        ("status", comment.label.to_string()),
        ("text", comment.body.clone()),
    ] {
        let _ = writeln!(out, "  {field:<LABEL_WIDTH$} {value}");
    }
    out
}

fn flagged(comments: &[Comment]) -> usize {
    comments.iter().filter(|c| c.label.is_bullying()).count()
}
