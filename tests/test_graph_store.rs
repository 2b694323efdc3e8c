//! Integration tests for the graph store: nodes, edges and integrity rules.
//!
//! Run with:
//!   cargo test --test test_graph_store

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use tempfile::TempDir;

use aether_graph::graph::{Database, Edge, GraphStore, SearchIndex, SearchOptions};

// ── helpers ──────────────────────────────────────────────────────────────────

fn make_store() -> (TempDir, Arc<Database>, GraphStore) {
    let tmp = TempDir::new().expect("tempdir");
    let db = Arc::new(Database::open(&tmp.path().join("aether.db")).expect("open db"));
    let store = GraphStore::new(Arc::clone(&db));
    (tmp, db, store)
}

fn edge(source: &str, target: &str) -> Edge {
    Edge {
        source: source.into(),
        target: target.into(),
    }
}

// ── nodes ────────────────────────────────────────────────────────────────────

#[test]
fn upsert_then_get_roundtrip() {
    let (_tmp, _db, store) = make_store();
    let written = store.upsert_node("apple", "Apple", "I like fruit").unwrap();
    let fetched = store.get_node("apple").unwrap().expect("node exists");
    assert_eq!(written, fetched);
    assert_eq!(fetched.content_hash.len(), 64);
    assert_eq!(fetched.created_at, fetched.updated_at);
}

#[test]
fn content_change_updates_hash() {
    let (_tmp, _db, store) = make_store();
    let v1 = store.upsert_node("a", "A", "one").unwrap();
    let v2 = store.upsert_node("a", "A", "two").unwrap();
    assert_ne!(v1.content_hash, v2.content_hash);
    assert_eq!(store.get_all_nodes().unwrap().len(), 1);
}

#[test]
fn get_missing_node_is_none() {
    let (_tmp, _db, store) = make_store();
    assert!(store.get_node("nope").unwrap().is_none());
}

#[test]
fn data_survives_reopen() {
    let tmp = TempDir::new().expect("tempdir");
    let path = tmp.path().join("aether.db");
    {
        let db = Arc::new(Database::open(&path).unwrap());
        let store = GraphStore::new(Arc::clone(&db));
        store.upsert_node("a", "A", "").unwrap();
        store.upsert_node("b", "B", "").unwrap();
        store.sync_edges("a", &["b"]).unwrap();
        drop(store);
        Arc::try_unwrap(db).expect("sole owner").close().unwrap();
    }
    let store = GraphStore::new(Arc::new(Database::open(&path).unwrap()));
    assert_eq!(store.get_outgoing_links("a").unwrap(), vec!["b"]);
}

// ── edges ────────────────────────────────────────────────────────────────────

#[test]
fn sync_edges_drops_unknown_targets() {
    let (_tmp, _db, store) = make_store();
    store.upsert_node("a", "A", "").unwrap();
    store.upsert_node("b", "B", "").unwrap();

    let linked = store.sync_edges("a", &["b", "c"]).unwrap();
    assert_eq!(linked, 1);
    assert_eq!(store.get_outgoing_links("a").unwrap(), vec!["b"]);
    assert_eq!(store.get_all_edges().unwrap(), vec![edge("a", "b")]);
}

#[test]
fn sync_edges_is_idempotent() {
    let (_tmp, _db, store) = make_store();
    for id in ["a", "b", "c"] {
        store.upsert_node(id, id, "").unwrap();
    }
    store.sync_edges("a", &["b", "c"]).unwrap();
    let first = store.get_outgoing_links("a").unwrap();
    store.sync_edges("a", &["b", "c"]).unwrap();
    assert_eq!(store.get_outgoing_links("a").unwrap(), first);
    assert_eq!(store.counts().unwrap().edges, 2);
}

#[test]
fn sync_edges_with_no_targets_clears_outgoing() {
    let (_tmp, _db, store) = make_store();
    store.upsert_node("a", "A", "").unwrap();
    store.upsert_node("b", "B", "").unwrap();
    store.sync_edges("a", &["b"]).unwrap();
    store.sync_edges("b", &["a"]).unwrap();

    let none: [&str; 0] = [];
    assert_eq!(store.sync_edges("a", &none).unwrap(), 0);
    assert!(store.get_outgoing_links("a").unwrap().is_empty());
    // Incoming edges are untouched.
    assert_eq!(store.get_backlinks("a").unwrap(), vec!["b"]);
}

#[test]
fn sync_edges_replaces_previous_targets() {
    let (_tmp, _db, store) = make_store();
    for id in ["a", "b", "c"] {
        store.upsert_node(id, id, "").unwrap();
    }
    store.sync_edges("a", &["b"]).unwrap();
    store.sync_edges("a", &["c"]).unwrap();
    assert_eq!(store.get_outgoing_links("a").unwrap(), vec!["c"]);
    assert!(store.get_backlinks("b").unwrap().is_empty());
}

#[test]
fn self_loop_is_allowed() {
    let (_tmp, _db, store) = make_store();
    store.upsert_node("a", "A", "").unwrap();
    store.sync_edges("a", &["a"]).unwrap();
    assert_eq!(store.get_outgoing_links("a").unwrap(), vec!["a"]);
    assert_eq!(store.get_backlinks("a").unwrap(), vec!["a"]);
}

// ── delete ───────────────────────────────────────────────────────────────────

#[test]
fn delete_removes_node_edges_and_document() {
    let (_tmp, db, store) = make_store();
    let index = SearchIndex::new(Arc::clone(&db), SearchOptions::default());
    for id in ["a", "b", "c"] {
        store.upsert_node(id, id, "shared words").unwrap();
        index.index(id, id, "shared words").unwrap();
    }
    store.sync_edges("a", &["b"]).unwrap();
    store.sync_edges("b", &["c"]).unwrap();
    store.sync_edges("c", &["b"]).unwrap();

    assert!(store.delete_node("b").unwrap());

    assert!(store.get_node("b").unwrap().is_none());
    let edges = store.get_all_edges().unwrap();
    assert!(edges.iter().all(|e| e.source != "b" && e.target != "b"));
    assert!(edges.is_empty());
    let hits = index.query("shared").unwrap();
    assert!(hits.iter().all(|h| h.id != "b"));
    assert_eq!(hits.len(), 2);
}

#[test]
fn delete_missing_node_is_not_an_error() {
    let (_tmp, _db, store) = make_store();
    assert!(!store.delete_node("ghost").unwrap());
}

// ── snapshot & lookups ───────────────────────────────────────────────────────

#[test]
fn snapshot_matches_individual_reads() {
    let (_tmp, _db, store) = make_store();
    store.upsert_node("a", "A", "").unwrap();
    store.upsert_node("b", "B", "").unwrap();
    store.sync_edges("a", &["b"]).unwrap();

    let snapshot = store.snapshot().unwrap();
    assert_eq!(snapshot.nodes, store.get_all_nodes().unwrap());
    assert_eq!(snapshot.edges, store.get_all_edges().unwrap());
}

#[test]
fn title_index_prefers_most_recent_on_case_collision() {
    let (_tmp, _db, store) = make_store();
    store.upsert_node("old", "rust", "").unwrap();
    store.upsert_node("new", "Rust", "").unwrap();

    let titles = ["RUST".to_string(), "Missing".to_string()];
    let index = store.title_index().unwrap();
    let (ids, unresolved) = index.resolve_all(&titles);
    assert_eq!(ids, vec!["new"]);
    assert_eq!(unresolved, vec!["Missing"]);
    assert!(index.is_ambiguous("rust"));

    // Touch the older note; it becomes the preferred target.
    store.upsert_node("old", "rust", "edited").unwrap();
    assert_eq!(store.title_index().unwrap().resolve("rust"), Some("old"));
}

// ── concurrency ──────────────────────────────────────────────────────────────

#[test]
fn concurrent_writers_serialize() {
    let (_tmp, _db, store) = make_store();
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let store = store.clone();
            thread::spawn(move || {
                for i in 0..10 {
                    let id = format!("n{t}-{i}");
                    store.upsert_node(&id, &id, "body").unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("writer thread");
    }

    let nodes = store.get_all_nodes().unwrap();
    assert_eq!(nodes.len(), 40);
    // Logical clock: every stamp distinct, listed newest first.
    assert!(nodes.windows(2).all(|w| w[0].updated_at > w[1].updated_at));
}

#[test]
fn sync_edges_never_exposes_a_gap_to_readers() {
    let (_tmp, _db, store) = make_store();
    for id in ["a", "b", "c"] {
        store.upsert_node(id, id, "").unwrap();
    }
    store.sync_edges("a", &["b"]).unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let writer = {
        let store = store.clone();
        let done = Arc::clone(&done);
        thread::spawn(move || {
            for i in 0..200 {
                let target = if i % 2 == 0 { "c" } else { "b" };
                store.sync_edges("a", &[target]).unwrap();
            }
            done.store(true, Ordering::SeqCst);
        })
    };

    // Every read sees either the old or the new single target, never none.
    loop {
        let finished = done.load(Ordering::SeqCst);
        let outgoing = store.get_outgoing_links("a").unwrap();
        assert_eq!(outgoing.len(), 1, "reader saw {outgoing:?}");
        if finished {
            break;
        }
    }
    writer.join().expect("writer thread");
}
