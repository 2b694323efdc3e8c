//! Note ingestion: the save/delete/rebuild pipeline over store and index.
//!
//! [`NoteGraph`] owns the database and sequences the per-note steps:
//! upsert the node, extract `[[references]]`, resolve them against current
//! titles, replace the node's outgoing edges, and re-index its text. Each
//! step is atomic on its own; a failure part-way leaves earlier steps
//! committed and the next save of the same note repairs the rest.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::AppError;
use crate::graph::{
    Database, GraphCounts, GraphStore, Node, SearchHit, SearchIndex, SearchOptions, TitleIndex,
    extract_references,
};
use crate::layout::{LayoutParams, LayoutPoint, Surface, spawn_layout};

/// A note as supplied by its content source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteSource {
    pub id: String,
    pub title: String,
    pub content: String,
}

impl NoteSource {
    pub fn new(id: impl Into<String>, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            content: content.into(),
        }
    }
}

/// Outcome of [`NoteGraph::save`].
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SaveReport {
    pub node: Node,
    /// Ids the note now links to, in reference order.
    pub linked: Vec<String>,
    /// Referenced titles that matched no note.
    pub unresolved: Vec<String>,
}

pub struct NoteGraph {
    db: Arc<Database>,
    store: GraphStore,
    search: SearchIndex,
}

impl NoteGraph {
    /// Open (or create) the graph database at `path`.
    pub fn open(path: &Path, options: SearchOptions) -> Result<Self, AppError> {
        let db = Arc::new(Database::open(path)?);
        Ok(Self {
            store: GraphStore::new(Arc::clone(&db)),
            search: SearchIndex::new(Arc::clone(&db), options),
            db,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        Self::open(&config.db_path(), config.search.clone())
    }

    /// Close the database. Fails with `Storage` while a cloned store or
    /// index handle is still alive.
    pub fn close(self) -> Result<(), AppError> {
        let Self { db, store, search } = self;
        drop(store);
        drop(search);
        let db = Arc::try_unwrap(db)
            .map_err(|_| AppError::Storage("graph: database still in use".into()))?;
        db.close()
    }

    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    pub fn search_index(&self) -> &SearchIndex {
        &self.search
    }

    // ── Pipeline ──────────────────────────────────────────────────────────

    /// Persist one note and bring its edges and search document up to date.
    ///
    /// References resolve against titles as they are after the upsert, so a
    /// note may link to itself.
    pub fn save(&self, note: &NoteSource) -> Result<SaveReport, AppError> {
        let node = self.store.upsert_node(&note.id, &note.title, &note.content)?;

        let titles = self.store.title_index()?;
        let (linked, unresolved) = link_note(&self.store, &titles, note)?;

        if !self.search.index(&note.id, &note.title, &note.content)? {
            debug!(id = %note.id, "ingest: note deleted mid-save, not indexed");
        }

        debug!(
            id = %note.id,
            linked = linked.len(),
            unresolved = unresolved.len(),
            "ingest: note saved"
        );
        Ok(SaveReport {
            node,
            linked,
            unresolved,
        })
    }

    /// Remove a note with its edges and search document.
    pub fn delete(&self, id: &str) -> Result<bool, AppError> {
        let existed = self.store.delete_node(id)?;
        debug!(id, existed, "ingest: note deleted");
        Ok(existed)
    }

    /// Replace the whole graph with `notes`.
    ///
    /// All nodes are written before any edge, so a reference resolves no
    /// matter where its target appears in `notes`.
    pub fn rebuild(&self, notes: &[NoteSource]) -> Result<GraphCounts, AppError> {
        self.store.clear()?;

        for note in notes {
            self.store.upsert_node(&note.id, &note.title, &note.content)?;
            self.search.index(&note.id, &note.title, &note.content)?;
        }

        let titles = self.store.title_index()?;
        let mut unresolved = 0usize;
        for note in notes {
            let (_, missing) = link_note(&self.store, &titles, note)?;
            unresolved += missing.len();
        }

        let counts = self.store.counts()?;
        info!(
            nodes = counts.nodes,
            edges = counts.edges,
            unresolved,
            "ingest: graph rebuilt"
        );
        Ok(counts)
    }

    /// Ranked search. Text the index rejects as malformed yields no hits.
    pub fn search(&self, text: &str) -> Result<Vec<SearchHit>, AppError> {
        match self.search.query(text) {
            Err(AppError::Query(msg)) => {
                warn!(query = text, error = %msg, "ingest: search query rejected");
                Ok(Vec::new())
            }
            other => other,
        }
    }

    /// Lay out the current graph on the blocking pool.
    pub async fn layout(
        &self,
        surface: Surface,
        params: LayoutParams,
    ) -> Result<Vec<LayoutPoint>, AppError> {
        let snapshot = self.store.snapshot()?;
        debug!(
            nodes = snapshot.nodes.len(),
            edges = snapshot.edges.len(),
            "ingest: layout requested"
        );
        spawn_layout(snapshot.nodes, snapshot.edges, surface, params)
            .await
            .map_err(|e| AppError::Layout(format!("layout task failed: {e}")))
    }
}

/// Resolve `note`'s references and replace its outgoing edges.
fn link_note(
    store: &GraphStore,
    titles: &TitleIndex,
    note: &NoteSource,
) -> Result<(Vec<String>, Vec<String>), AppError> {
    let references = extract_references(&note.content);
    let (targets, unresolved) = titles.resolve_all(&references);

    for title in references.iter().filter(|t| titles.is_ambiguous(t)) {
        debug!(id = %note.id, title = %title, "ingest: ambiguous reference, newest note wins");
    }
    for title in &unresolved {
        debug!(id = %note.id, title, "ingest: unresolved reference");
    }

    let written = store.sync_edges(&note.id, &targets)?;
    if written != targets.len() {
        debug!(
            id = %note.id,
            resolved = targets.len(),
            written,
            "ingest: some targets vanished before linking"
        );
    }

    let unresolved = unresolved.into_iter().map(String::from).collect();
    Ok((targets, unresolved))
}
