//! Linked-note graph: SQLite persistence of notes and `[[references]]`,
//! ranked full-text search, and a force-directed layout for drawing.
//!
//! The entry point for most callers is [`ingest::NoteGraph`], which keeps
//! nodes, edges and the search index consistent as notes are saved.

pub mod config;
pub mod error;
pub mod graph;
pub mod ingest;
pub mod layout;
pub mod logger;
pub mod vault;
