//! `store`: nodes, directed edges, and the referential-integrity rules.
//!
//! Every mutation is one transaction on the [`Database`] writer, so a reader
//! sees either the state before a call or the state after it. Edges only ever
//! connect existing nodes: inserts are filtered against `nodes`, and deleting
//! a node removes its incident edges and its search document in the same
//! transaction.

use std::collections::HashSet;
use std::sync::Arc;

use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::debug;

use crate::error::AppError;

use super::db::{Database, now_millis, sha256_hex};
use super::links::TitleIndex;

// ── Types ─────────────────────────────────────────────────────────────────────

/// One note in the graph. Timestamps are epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Node {
    /// Stable slug supplied by the content source.
    pub id: String,
    pub title: String,
    /// SHA-256 hex of the content passed to the last effective upsert.
    pub content_hash: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A directed reference from `source`'s content to `target`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
}

/// Nodes and edges read from a single committed state.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct GraphCounts {
    pub nodes: usize,
    pub edges: usize,
}

const NODE_COLUMNS: &str = "id, title, content_hash, created_at, updated_at";

// ── GraphStore ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct GraphStore {
    db: Arc<Database>,
}

impl GraphStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    // ── Nodes ─────────────────────────────────────────────────────────────

    /// Insert the node if absent, otherwise update its title and content hash.
    ///
    /// Identical input (same title, same content) leaves the stored row
    /// untouched and returns it as-is. `created_at` is set once.
    ///
    /// `updated_at` is a store-wide logical clock: the current time, bumped
    /// past the newest stored stamp when needed, so no two effective upserts
    /// share a stamp and recency order matches write order.
    pub fn upsert_node(&self, id: &str, title: &str, content: &str) -> Result<Node, AppError> {
        let content_hash = sha256_hex(content);

        self.db.write(|conn| {
            let existing = select_node(conn, id)?;
            if let Some(node) = &existing {
                if node.title == title && node.content_hash == content_hash {
                    debug!(id, "graph: upsert unchanged");
                    return Ok(node.clone());
                }
            }

            let stamp = next_stamp(conn)?;
            match existing {
                Some(mut node) => {
                    conn.execute(
                        "UPDATE nodes SET title = ?2, content_hash = ?3, updated_at = ?4 WHERE id = ?1",
                        params![id, title, content_hash, stamp],
                    )
                    .map_err(|e| AppError::Storage(format!("graph: update node {id}: {e}")))?;
                    node.title = title.to_string();
                    node.content_hash = content_hash;
                    node.updated_at = stamp;
                    debug!(id, "graph: node updated");
                    Ok(node)
                }
                None => {
                    conn.execute(
                        "INSERT INTO nodes (id, title, content_hash, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?4)",
                        params![id, title, content_hash, stamp],
                    )
                    .map_err(|e| AppError::Storage(format!("graph: insert node {id}: {e}")))?;
                    debug!(id, "graph: node created");
                    Ok(Node {
                        id: id.to_string(),
                        title: title.to_string(),
                        content_hash,
                        created_at: stamp,
                        updated_at: stamp,
                    })
                }
            }
        })
    }

    /// Remove the node, every edge touching it, and its search document.
    ///
    /// Returns `false` when no such node existed; that is not an error.
    pub fn delete_node(&self, id: &str) -> Result<bool, AppError> {
        self.db.write(|conn| {
            let edges = conn
                .execute(
                    "DELETE FROM edges WHERE source_id = ?1 OR target_id = ?1",
                    params![id],
                )
                .map_err(|e| AppError::Storage(format!("graph: delete edges of {id}: {e}")))?;
            conn.execute("DELETE FROM search_index WHERE note_id = ?1", params![id])
                .map_err(|e| AppError::Storage(format!("graph: delete search doc of {id}: {e}")))?;
            let removed = conn
                .execute("DELETE FROM nodes WHERE id = ?1", params![id])
                .map_err(|e| AppError::Storage(format!("graph: delete node {id}: {e}")))?;

            debug!(id, edges, existed = removed > 0, "graph: node deleted");
            Ok(removed > 0)
        })
    }

    pub fn get_node(&self, id: &str) -> Result<Option<Node>, AppError> {
        self.db.read(|conn| select_node(conn, id))
    }

    /// Like [`get_node`](Self::get_node), but an absent id is `NotFound`.
    pub fn require_node(&self, id: &str) -> Result<Node, AppError> {
        self.get_node(id)?
            .ok_or_else(|| AppError::NotFound(format!("node {id}")))
    }

    /// All nodes, most recently updated first.
    pub fn get_all_nodes(&self) -> Result<Vec<Node>, AppError> {
        self.db.read(select_all_nodes)
    }

    // ── Edges ─────────────────────────────────────────────────────────────

    /// Replace the outgoing edges of `source` with edges to `targets`.
    ///
    /// Targets that do not name an existing node are dropped, as are repeats.
    /// When `source` itself does not exist no edge is written. Returns the
    /// number of outgoing edges `source` has afterwards.
    pub fn sync_edges<S: AsRef<str>>(&self, source: &str, targets: &[S]) -> Result<usize, AppError> {
        self.db.write(|conn| {
            let cleared = conn
                .execute("DELETE FROM edges WHERE source_id = ?1", params![source])
                .map_err(|e| AppError::Storage(format!("graph: clear edges of {source}: {e}")))?;

            if select_node(conn, source)?.is_none() {
                debug!(source, cleared, "graph: sync skipped, source node absent");
                return Ok(0);
            }

            let mut insert = conn
                .prepare_cached(
                    "INSERT OR IGNORE INTO edges (source_id, target_id) SELECT ?1, id FROM nodes WHERE id = ?2",
                )
                .map_err(|e| AppError::Storage(format!("graph: prepare edge insert: {e}")))?;
            let mut inserted = 0usize;
            for target in targets {
                let target = target.as_ref();
                inserted += insert.execute(params![source, target]).map_err(|e| {
                    AppError::Storage(format!("graph: insert edge {source} -> {target}: {e}"))
                })?;
            }

            debug!(
                source,
                cleared,
                inserted,
                dropped = targets.len() - inserted,
                "graph: edges synced"
            );
            Ok(inserted)
        })
    }

    /// Targets of `id`'s outgoing edges, in the order they were inserted.
    pub fn get_outgoing_links(&self, id: &str) -> Result<Vec<String>, AppError> {
        self.db.read(|conn| {
            select_ids(
                conn,
                "SELECT target_id FROM edges WHERE source_id = ?1 ORDER BY id",
                id,
            )
        })
    }

    /// Sources of edges pointing at `id`.
    pub fn get_backlinks(&self, id: &str) -> Result<Vec<String>, AppError> {
        self.db.read(|conn| {
            select_ids(
                conn,
                "SELECT source_id FROM edges WHERE target_id = ?1 ORDER BY id",
                id,
            )
        })
    }

    /// Nodes linked with `id` in either direction: outgoing targets first,
    /// then backlinks not already listed.
    pub fn neighbors(&self, id: &str) -> Result<Vec<String>, AppError> {
        self.db.read_snapshot(|conn| {
            let mut out = select_ids(
                conn,
                "SELECT target_id FROM edges WHERE source_id = ?1 ORDER BY id",
                id,
            )?;
            let back = select_ids(
                conn,
                "SELECT source_id FROM edges WHERE target_id = ?1 ORDER BY id",
                id,
            )?;
            let mut seen: HashSet<String> = out.iter().cloned().collect();
            out.extend(back.into_iter().filter(|b| seen.insert(b.clone())));
            Ok(out)
        })
    }

    pub fn get_all_edges(&self) -> Result<Vec<Edge>, AppError> {
        self.db.read(select_all_edges)
    }

    // ── Snapshots & lookups ───────────────────────────────────────────────

    /// Nodes and edges from one committed state, for layout.
    pub fn snapshot(&self) -> Result<GraphSnapshot, AppError> {
        self.db.read_snapshot(|conn| {
            Ok(GraphSnapshot {
                nodes: select_all_nodes(conn)?,
                edges: select_all_edges(conn)?,
            })
        })
    }

    pub fn counts(&self) -> Result<GraphCounts, AppError> {
        self.db.read(|conn| {
            conn.query_row(
                "SELECT (SELECT COUNT(*) FROM nodes), (SELECT COUNT(*) FROM edges)",
                [],
                |row| {
                    Ok(GraphCounts {
                        nodes: row.get::<_, i64>(0)? as usize,
                        edges: row.get::<_, i64>(1)? as usize,
                    })
                },
            )
            .map_err(|e| AppError::Storage(format!("graph: count rows: {e}")))
        })
    }

    /// Title lookup over the current nodes, most recently updated first.
    pub fn title_index(&self) -> Result<TitleIndex, AppError> {
        let nodes = self.get_all_nodes()?;
        Ok(TitleIndex::from_pairs(
            nodes.into_iter().map(|n| (n.id, n.title)),
        ))
    }

    /// Titles starting with `prefix` (case-insensitive), most recent first.
    pub fn suggest_titles(&self, prefix: &str, limit: usize) -> Result<Vec<String>, AppError> {
        let needle = prefix.trim().to_lowercase();
        let nodes = self.get_all_nodes()?;
        Ok(nodes
            .into_iter()
            .filter(|n| n.title.to_lowercase().starts_with(&needle))
            .map(|n| n.title)
            .take(limit)
            .collect())
    }

    /// Delete every node, edge and search document in one transaction.
    pub fn clear(&self) -> Result<(), AppError> {
        self.db.write(|conn| {
            conn.execute_batch(
                "DELETE FROM edges;
                 DELETE FROM search_index;
                 DELETE FROM nodes;",
            )
            .map_err(|e| AppError::Storage(format!("graph: clear: {e}")))
        })
    }
}

// ── Row helpers ───────────────────────────────────────────────────────────────

fn node_from_row(row: &Row<'_>) -> rusqlite::Result<Node> {
    Ok(Node {
        id: row.get(0)?,
        title: row.get(1)?,
        content_hash: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

fn select_node(conn: &Connection, id: &str) -> Result<Option<Node>, AppError> {
    conn.query_row(
        &format!("SELECT {NODE_COLUMNS} FROM nodes WHERE id = ?1"),
        params![id],
        node_from_row,
    )
    .optional()
    .map_err(|e| AppError::Storage(format!("graph: get node {id}: {e}")))
}

fn select_all_nodes(conn: &Connection) -> Result<Vec<Node>, AppError> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {NODE_COLUMNS} FROM nodes ORDER BY updated_at DESC, id ASC"
        ))
        .map_err(|e| AppError::Storage(format!("graph: prepare list nodes: {e}")))?;
    let rows = stmt
        .query_map([], node_from_row)
        .map_err(|e| AppError::Storage(format!("graph: query list nodes: {e}")))?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| AppError::Storage(format!("graph: map node row: {e}")))
}

fn select_all_edges(conn: &Connection) -> Result<Vec<Edge>, AppError> {
    let mut stmt = conn
        .prepare("SELECT source_id, target_id FROM edges ORDER BY id")
        .map_err(|e| AppError::Storage(format!("graph: prepare list edges: {e}")))?;
    let rows = stmt
        .query_map([], |row| {
            Ok(Edge {
                source: row.get(0)?,
                target: row.get(1)?,
            })
        })
        .map_err(|e| AppError::Storage(format!("graph: query list edges: {e}")))?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| AppError::Storage(format!("graph: map edge row: {e}")))
}

fn select_ids(conn: &Connection, sql: &str, id: &str) -> Result<Vec<String>, AppError> {
    let mut stmt = conn
        .prepare_cached(sql)
        .map_err(|e| AppError::Storage(format!("graph: prepare link lookup: {e}")))?;
    let rows = stmt
        .query_map(params![id], |row| row.get::<_, String>(0))
        .map_err(|e| AppError::Storage(format!("graph: query links of {id}: {e}")))?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| AppError::Storage(format!("graph: map link row: {e}")))
}

/// Next `updated_at` stamp: now, or one past the newest stamp if the clock
/// has not advanced beyond it.
fn next_stamp(conn: &Connection) -> Result<i64, AppError> {
    let newest: i64 = conn
        .query_row("SELECT COALESCE(MAX(updated_at), 0) FROM nodes", [], |row| {
            row.get(0)
        })
        .map_err(|e| AppError::Storage(format!("graph: read newest stamp: {e}")))?;
    Ok(now_millis().max(newest + 1))
}

/// `updated_at` of node `id`, recorded on its search document; `None` when
/// the node does not exist.
pub(crate) fn node_stamp(conn: &Connection, id: &str) -> Result<Option<i64>, AppError> {
    Ok(select_node(conn, id)?.map(|n| n.updated_at))
}
