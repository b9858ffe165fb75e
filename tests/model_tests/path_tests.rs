//! Tests for ResourcePath and DocumentKey
//!
//! These tests verify:
//! - Parsing and validation of paths and keys
//! - Segment-wise ordering (the physical row order)
//! - Prefix / parent relationships used by range scans

use doccache::{CacheError, DocumentKey, ResourcePath};

fn path(s: &str) -> ResourcePath {
    ResourcePath::from_string(s).unwrap()
}

// =============================================================================
// Parsing Tests
// =============================================================================

#[test]
fn test_path_from_string_trims_slashes() {
    let p = path("/rooms/abc/");

    assert_eq!(p.len(), 2);
    assert_eq!(p.segments(), &["rooms".to_string(), "abc".to_string()]);
    assert_eq!(p.canonical_string(), "rooms/abc");
}

#[test]
fn test_path_root_is_empty() {
    assert!(path("/").is_empty());
    assert_eq!(path(""), ResourcePath::empty());
}

#[test]
fn test_path_rejects_empty_segment() {
    let result = ResourcePath::from_string("rooms//abc");

    assert!(matches!(result, Err(CacheError::InvalidArgument(_))));
}

#[test]
fn test_path_from_segments_rejects_slash() {
    let result = ResourcePath::from_segments(["rooms", "a/b"]);

    assert!(matches!(result, Err(CacheError::InvalidArgument(_))));
}

#[test]
fn test_document_key_requires_even_length() {
    assert!(DocumentKey::from_path_string("rooms/abc").is_ok());
    assert!(DocumentKey::from_path_string("rooms/abc/messages/m1").is_ok());

    assert!(matches!(
        DocumentKey::from_path_string("rooms"),
        Err(CacheError::InvalidArgument(_))
    ));
    assert!(matches!(
        DocumentKey::from_path_string("/"),
        Err(CacheError::InvalidArgument(_))
    ));
}

#[test]
fn test_document_key_collection() {
    let key = DocumentKey::from_path_string("rooms/abc/messages/m1").unwrap();

    assert_eq!(key.collection_path(), path("rooms/abc/messages"));
    assert_eq!(key.collection_id(), "messages");
    assert_eq!(key.to_string(), "rooms/abc/messages/m1");
}

// =============================================================================
// Ordering Tests
// =============================================================================

#[test]
fn test_path_ordering_is_segment_wise() {
    // "rooms/a/sub/x" sorts between "rooms/a" and "rooms/b"
    let mut paths = vec![
        path("rooms/b"),
        path("rooms/a/sub/x"),
        path("rooms/a"),
        path("rooms"),
        path("roomsX/a"),
    ];
    paths.sort();

    assert_eq!(
        paths,
        vec![
            path("rooms"),
            path("rooms/a"),
            path("rooms/a/sub/x"),
            path("rooms/b"),
            path("roomsX/a"),
        ]
    );
}

#[test]
fn test_document_key_ordering_matches_path_ordering() {
    let a = DocumentKey::from_path_string("rooms/a").unwrap();
    let nested = DocumentKey::from_path_string("rooms/a/sub/x").unwrap();
    let b = DocumentKey::from_path_string("rooms/b").unwrap();

    assert!(a < nested);
    assert!(nested < b);
}

// =============================================================================
// Relationship Tests
// =============================================================================

#[test]
fn test_is_prefix_of() {
    assert!(path("rooms").is_prefix_of(&path("rooms/abc")));
    assert!(path("rooms").is_prefix_of(&path("rooms")));
    assert!(ResourcePath::empty().is_prefix_of(&path("rooms")));
    assert!(!path("rooms/abc").is_prefix_of(&path("rooms")));
    assert!(!path("room").is_prefix_of(&path("rooms/abc")));
}

#[test]
fn test_is_immediate_parent_of() {
    assert!(path("rooms").is_immediate_parent_of(&path("rooms/abc")));
    assert!(!path("rooms").is_immediate_parent_of(&path("rooms/abc/sub/x")));
    assert!(!path("rooms").is_immediate_parent_of(&path("rooms")));
}

#[test]
fn test_child_and_pop_last() {
    let child = path("rooms").child("abc").unwrap();

    assert_eq!(child, path("rooms/abc"));
    assert_eq!(child.pop_last(), path("rooms"));
    assert_eq!(child.first_segment(), Some("rooms"));
    assert_eq!(child.last_segment(), Some("abc"));
    assert!(path("rooms").child("").is_err());
}
