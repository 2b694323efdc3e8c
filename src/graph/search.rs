//! `search`: ranked full-text search over note titles and bodies.
//!
//! One FTS5 document per note, replaced wholesale on every [`SearchIndex::index`]
//! call. User text never reaches `MATCH` verbatim: see [`build_match_expr`].

use std::sync::Arc;

use rusqlite::params;
use tracing::debug;

use crate::error::AppError;

use super::db::Database;
use super::store::node_stamp;

/// FTS5 `snippet()` accepts at most this many tokens.
const MAX_SNIPPET_TOKENS: usize = 64;

/// Tuning for [`SearchIndex::query`].
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOptions {
    /// Maximum number of hits returned (default 30).
    pub limit: usize,
    /// Approximate snippet window in tokens (default 20, clamped to 1..=64).
    pub snippet_tokens: usize,
    /// Marker inserted before each matched term (default `<b>`).
    pub highlight_open: String,
    /// Marker inserted after each matched term (default `</b>`).
    pub highlight_close: String,
    /// Marker for text elided from either end of the snippet (default `…`).
    pub ellipsis: String,
    /// Treat the final query token as a prefix, for search-as-you-type.
    pub prefix_last_token: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: 30,
            snippet_tokens: 20,
            highlight_open: "<b>".to_string(),
            highlight_close: "</b>".to_string(),
            ellipsis: "…".to_string(),
            prefix_last_token: true,
        }
    }
}

/// One ranked search result.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SearchHit {
    pub id: String,
    pub title: String,
    /// Window around the best match, matched terms wrapped in the highlight markers.
    pub snippet: String,
    /// Negated BM25 rank: higher is more relevant.
    pub score: f64,
}

#[derive(Debug, Clone)]
pub struct SearchIndex {
    db: Arc<Database>,
    options: SearchOptions,
}

impl SearchIndex {
    pub fn new(db: Arc<Database>, options: SearchOptions) -> Self {
        Self { db, options }
    }

    pub fn options(&self) -> &SearchOptions {
        &self.options
    }

    /// Replace the document for `id` with a freshly tokenized one.
    ///
    /// Documents only exist for stored nodes: when `id` names no node, any
    /// stale document is dropped and `false` is returned.
    pub fn index(&self, id: &str, title: &str, content: &str) -> Result<bool, AppError> {
        self.db.write(|conn| {
            let replaced = conn
                .execute("DELETE FROM search_index WHERE note_id = ?1", params![id])
                .map_err(|e| AppError::Storage(format!("search: clear doc {id}: {e}")))?;

            let Some(stamp) = node_stamp(conn, id)? else {
                debug!(id, replaced = replaced > 0, "search: node absent, document not indexed");
                return Ok(false);
            };
            conn.execute(
                "INSERT INTO search_index (note_id, title, content, updated_at) VALUES (?1, ?2, ?3, ?4)",
                params![id, title, content, stamp],
            )
            .map_err(|e| AppError::Storage(format!("search: insert doc {id}: {e}")))?;

            debug!(id, replaced = replaced > 0, "search: document indexed");
            Ok(true)
        })
    }

    /// Delete the document for `id`. Returns `false` when there was none.
    pub fn remove(&self, id: &str) -> Result<bool, AppError> {
        self.db.write(|conn| {
            let removed = conn
                .execute("DELETE FROM search_index WHERE note_id = ?1", params![id])
                .map_err(|e| AppError::Storage(format!("search: remove doc {id}: {e}")))?;
            debug!(id, existed = removed > 0, "search: document removed");
            Ok(removed > 0)
        })
    }

    /// Number of indexed documents.
    pub fn count(&self) -> Result<usize, AppError> {
        self.db.read(|conn| {
            conn.query_row("SELECT COUNT(*) FROM search_index", [], |row| {
                row.get::<_, i64>(0)
            })
            .map(|n| n as usize)
            .map_err(|e| AppError::Storage(format!("search: count docs: {e}")))
        })
    }

    /// Ranked hits for `text`, at most `options.limit` of them.
    pub fn query(&self, text: &str) -> Result<Vec<SearchHit>, AppError> {
        self.query_with_limit(text, self.options.limit)
    }

    /// Ranked hits for `text` with an explicit result cap.
    ///
    /// Blank text (or text with no alphanumeric characters) returns an empty
    /// list without opening a connection.
    pub fn query_with_limit(&self, text: &str, limit: usize) -> Result<Vec<SearchHit>, AppError> {
        let Some(expr) = build_match_expr(text, self.options.prefix_last_token) else {
            return Ok(Vec::new());
        };
        if limit == 0 {
            return Ok(Vec::new());
        }

        let opts = &self.options;
        let snippet_tokens = opts.snippet_tokens.clamp(1, MAX_SNIPPET_TOKENS) as i64;

        let hits = self.db.read(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT
                        note_id,
                        title,
                        snippet(search_index, -1, ?2, ?3, ?4, ?5),
                        bm25(search_index) AS score
                     FROM search_index
                     WHERE search_index MATCH ?1
                       AND note_id IN (SELECT id FROM nodes)
                     ORDER BY score ASC, updated_at DESC
                     LIMIT ?6",
                )
                .map_err(|e| AppError::Storage(format!("search: prepare query: {e}")))?;

            let rows = stmt
                .query_map(
                    params![
                        expr,
                        opts.highlight_open,
                        opts.highlight_close,
                        opts.ellipsis,
                        snippet_tokens,
                        limit as i64,
                    ],
                    |row| {
                        let bm25: f64 = row.get(3)?;
                        Ok(SearchHit {
                            id: row.get(0)?,
                            title: row.get(1)?,
                            snippet: row.get(2)?,
                            score: -bm25,
                        })
                    },
                )
                .map_err(query_failure)?;

            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(query_failure)
        })?;

        debug!(query = %expr, hits = hits.len(), "search: query executed");
        Ok(hits)
    }
}

/// Turn free text into an FTS5 expression that cannot carry query syntax.
///
/// Every non-alphanumeric character becomes whitespace, and each remaining
/// token is emitted as a quoted string, so operators such as `AND`, `NEAR`,
/// `-` or `*` typed by the user are matched literally (or dropped). With
/// `prefix_last` the final token also matches longer words (`"ban"*`).
///
/// Returns `None` when no token survives.
pub fn build_match_expr(text: &str, prefix_last: bool) -> Option<String> {
    let neutral: String = text
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    let tokens: Vec<&str> = neutral.split_whitespace().collect();
    let (last, rest) = tokens.split_last()?;

    let mut parts: Vec<String> = rest.iter().map(|tok| format!("\"{tok}\"")).collect();
    if prefix_last {
        parts.push(format!("\"{last}\"*"));
    } else {
        parts.push(format!("\"{last}\""));
    }
    Some(parts.join(" "))
}

/// FTS5 reports expression problems as `fts5: …` errors; those are query
/// errors, anything else is a storage failure.
fn query_failure(e: rusqlite::Error) -> AppError {
    let msg = e.to_string();
    if msg.contains("fts5") {
        AppError::Query(format!("search: {msg}"))
    } else {
        AppError::Storage(format!("search: execute query: {msg}"))
    }
}
