//! DuckDB storage for accounts, posts, and classified comments.

use std::path::Path;

use arrow::array::{Array, Date32Array, Int64Array, LargeStringArray, StringArray};
use arrow::record_batch::RecordBatch;
use chrono::NaiveDate;
use cyberwatch_core::{
    Comment, CommentId, Label, LoginId, NewAccount, NewComment, NewPost, PostId, ProfileId,
};
use duckdb::{Connection, params};
use tracing::{debug, info};

use crate::{CommentStore, StoreError};

const SCHEMA: &str = "
CREATE SEQUENCE IF NOT EXISTS login_id_seq START 1;
CREATE TABLE IF NOT EXISTS login (
    id BIGINT PRIMARY KEY DEFAULT nextval('login_id_seq'),
    username VARCHAR NOT NULL UNIQUE,
    account_type VARCHAR NOT NULL DEFAULT 'user'
);

CREATE SEQUENCE IF NOT EXISTS user_profile_id_seq START 1;
CREATE TABLE IF NOT EXISTS user_profile (
    id BIGINT PRIMARY KEY DEFAULT nextval('user_profile_id_seq'),
    login_id BIGINT NOT NULL UNIQUE REFERENCES login(id),
    name VARCHAR NOT NULL,
    email VARCHAR NOT NULL UNIQUE
);

CREATE SEQUENCE IF NOT EXISTS post_id_seq START 1;
CREATE TABLE IF NOT EXISTS post (
    id BIGINT PRIMARY KEY DEFAULT nextval('post_id_seq'),
    description VARCHAR NOT NULL DEFAULT '',
    date DATE NOT NULL DEFAULT current_date,
    user_id BIGINT NOT NULL REFERENCES user_profile(id)
);

CREATE SEQUENCE IF NOT EXISTS comment_id_seq START 1;
CREATE TABLE IF NOT EXISTS comment (
    id BIGINT PRIMARY KEY DEFAULT nextval('comment_id_seq'),
    comments VARCHAR NOT NULL,
    status VARCHAR NOT NULL DEFAULT 'Not Bullying'
        CHECK (status IN ('Bullying Words', 'Not Bullying')),
    date DATE NOT NULL,
    user_id BIGINT NOT NULL REFERENCES user_profile(id),
    post_id BIGINT NOT NULL REFERENCES post(id)
);
";

const TABLES: [&str; 4] = ["login", "user_profile", "post", "comment"];

/// DuckDB-backed store for the comment pipeline.
///
/// Supports both in-memory (ephemeral) and persistent (file-backed) modes.
/// Use [`open`](Self::open) for in-memory and [`open_persistent`](Self::open_persistent)
/// for a database that survives across process restarts. Both create the
/// schema if it is missing.
pub struct DuckStore {
    conn: Connection,
}

impl DuckStore {
    /// Open an in-memory DuckDB database.
    pub fn open() -> Result<Self, StoreError> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Open or create a persistent DuckDB database at the given path.
    pub fn open_persistent(path: &Path) -> Result<Self, StoreError> {
        let store = Self {
            conn: Connection::open(path)?,
        };
        store.init_schema()?;
        info!(path = %path.display(), "opened comment store");
        Ok(store)
    }

    /// Create any missing tables. Idempotent.
    pub fn init_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Check whether every table exists.
    pub fn has_tables(&self) -> bool {
        TABLES.iter().all(|t| self.count_table(t).is_ok())
    }

    // ── Accounts and posts ──

    /// Create a login and its profile in one transaction.
    pub fn create_account(&mut self, account: &NewAccount) -> Result<LoginId, StoreError> {
        let tx = self.conn.transaction()?;
        let login: LoginId = tx.query_row(
            "INSERT INTO login (username, account_type) VALUES (?, ?) RETURNING id",
            params![account.username, account.account_type.as_str()],
            |row| row.get(0),
        )?;
        let profile: ProfileId = tx.query_row(
            "INSERT INTO user_profile (login_id, name, email) VALUES (?, ?, ?) RETURNING id",
            params![login, account.name, account.email],
            |row| row.get(0),
        )?;
        tx.commit()?;
        info!(login, profile, username = %account.username, "created account");
        Ok(login)
    }

    pub fn create_post(&self, post: &NewPost) -> Result<PostId, StoreError> {
        let id: PostId = self.conn.query_row(
            "INSERT INTO post (description, user_id) VALUES (?, ?) RETURNING id",
            params![post.description, post.author],
            |row| row.get(0),
        )?;
        info!(post = id, author = post.author, "created post");
        Ok(id)
    }

    // ── Counts ──

    /// Number of rows in the `comment` table.
    pub fn comment_count(&self) -> Result<usize, StoreError> {
        self.count_table("comment")
    }

    fn count_table(&self, table: &str) -> Result<usize, StoreError> {
        let sql = format!("SELECT count(*)::BIGINT AS cnt FROM {table}");
        let mut stmt = self.conn.prepare(&sql)?;
        let batches: Vec<RecordBatch> = stmt.query_arrow([])?.collect();
        let batch = batches.first().ok_or(StoreError::NoResults)?;
        let col = batch
            .column(0)
            .as_any()
            .downcast_ref::<Int64Array>()
            .ok_or_else(|| StoreError::Other("count column not i64".into()))?;
        Ok(col.value(0) as usize)
    }

    // ── Comments ──

    /// Comments on `post` joined with author names, as Arrow batches.
    pub fn comments_arrow(&self, post: PostId) -> Result<Vec<RecordBatch>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT c.id, c.comments, c.status, c.date, c.user_id, p.name AS author_name, c.post_id
             FROM comment c
             JOIN user_profile p ON p.id = c.user_id
             WHERE c.post_id = ?
             ORDER BY c.id",
        )?;
        let batches: Vec<RecordBatch> = stmt.query_arrow([post])?.collect();
        Ok(batches)
    }
}

impl CommentStore for DuckStore {
    fn author_profile(&self, login: LoginId) -> Result<Option<ProfileId>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM user_profile WHERE login_id = ?")?;
        let mut rows = stmt.query(params![login])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    fn post_exists(&self, post: PostId) -> Result<bool, StoreError> {
        let count: i64 = self.conn.query_row(
            "SELECT count(*)::BIGINT FROM post WHERE id = ?",
            params![post],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn insert_comment(&self, comment: &NewComment) -> Result<CommentId, StoreError> {
        let id: CommentId = self.conn.query_row(
            "INSERT INTO comment (comments, status, date, user_id, post_id)
             VALUES (?, ?, ?::DATE, ?, ?) RETURNING id",
            params![
                comment.body,
                comment.label.as_str(),
                comment.date.to_string(),
                comment.author,
                comment.post
            ],
            |row| row.get(0),
        )?;
        debug!(comment = id, post = comment.post, label = %comment.label, "stored comment");
        Ok(id)
    }

    fn comments_for_post(&self, post: PostId) -> Result<Vec<Comment>, StoreError> {
        let batches = self.comments_arrow(post)?;
        let mut comments = Vec::new();
        for batch in &batches {
            comments.extend(comments_from_batch(batch)?);
        }
        Ok(comments)
    }
}

// ── Arrow extraction helpers ──

fn comments_from_batch(batch: &RecordBatch) -> Result<Vec<Comment>, StoreError> {
    let ids = i64_column(batch, "id")?;
    let authors = i64_column(batch, "user_id")?;
    let posts = i64_column(batch, "post_id")?;
    let dates = column::<Date32Array>(batch, "date")?;

    (0..batch.num_rows())
        .map(|row| {
            let status = get_string(batch, "status", row)?;
            let label: Label = status
                .parse()
                .map_err(|e| StoreError::InvalidRow(format!("row {row}: {e}")))?;
            let date: NaiveDate = dates
                .value_as_date(row)
                .ok_or_else(|| StoreError::InvalidRow(format!("row {row}: bad date")))?;
            Ok(Comment {
                id: ids.value(row),
                body: get_string(batch, "comments", row)?,
                label,
                date,
                author: authors.value(row),
                author_name: get_string(batch, "author_name", row)?,
                post: posts.value(row),
            })
        })
        .collect()
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T, StoreError> {
    batch
        .column_by_name(name)
        .ok_or_else(|| StoreError::InvalidRow(format!("missing column {name}")))?
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| StoreError::InvalidRow(format!("unexpected type for column {name}")))
}

fn i64_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Int64Array, StoreError> {
    column::<Int64Array>(batch, name)
}

/// Read a string cell, accepting both Utf8 and LargeUtf8 columns.
fn get_string(batch: &RecordBatch, name: &str, row: usize) -> Result<String, StoreError> {
    let col = batch
        .column_by_name(name)
        .ok_or_else(|| StoreError::InvalidRow(format!("missing column {name}")))?;
    if col.is_null(row) {
        return Err(StoreError::InvalidRow(format!("null {name} at row {row}")));
    }
    if let Some(arr) = col.as_any().downcast_ref::<StringArray>() {
        return Ok(arr.value(row).to_string());
    }
    if let Some(arr) = col.as_any().downcast_ref::<LargeStringArray>() {
        return Ok(arr.value(row).to_string());
    }
    Err(StoreError::InvalidRow(format!(
        "unexpected type for column {name}"
    )))
}
