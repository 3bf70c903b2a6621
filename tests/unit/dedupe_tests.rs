//! Signature Deduplicator Unit Tests

use redundancy_scout::SignatureDeduplicator;
use std::sync::Arc;

#[test]
fn test_same_signature_is_new_exactly_once() {
    let dedupe = SignatureDeduplicator::new(10);
    assert!(dedupe.is_new("A", "sig"));
    assert!(!dedupe.is_new("A", "sig"));
    assert!(!dedupe.is_new("B", "sig"));
    assert_eq!(dedupe.len(), 1);
}

#[test]
fn test_capacity_bounds_memory() {
    let dedupe = SignatureDeduplicator::new(3);
    for i in 0..10 {
        dedupe.is_new("A", &format!("sig-{}", i));
    }
    assert_eq!(dedupe.len(), 3);
    assert!(dedupe.contains("sig-9"));
    assert!(!dedupe.contains("sig-0"));
}

#[test]
fn test_concurrent_offers_accept_once() {
    let dedupe = Arc::new(SignatureDeduplicator::new(100));
    let handles: Vec<_> = (0..16)
        .map(|_| {
            let dedupe = dedupe.clone();
            std::thread::spawn(move || dedupe.is_new("A", "contended"))
        })
        .collect();

    let accepted = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|new| *new)
        .count();
    assert_eq!(accepted, 1);
}
