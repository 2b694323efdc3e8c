//! Note graph persistence: SQLite-backed nodes, edges and full-text search.

pub mod db;
pub mod links;
pub mod search;
pub mod store;

pub use db::Database;
pub use links::{TitleIndex, extract_references};
pub use search::{SearchHit, SearchIndex, SearchOptions};
pub use store::{Edge, GraphCounts, GraphSnapshot, GraphStore, Node};
