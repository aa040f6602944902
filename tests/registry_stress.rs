//! Registry behaviour under concurrent readers and writers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use proxy_node::UserRegistry;

#[test]
fn test_readers_never_see_torn_entries() {
    let registry = Arc::new(UserRegistry::new());
    let stop = Arc::new(AtomicBool::new(false));

    let writers: Vec<_> = (0..4)
        .map(|w| {
            let registry = registry.clone();
            thread::spawn(move || {
                for round in 0..500 {
                    let id = format!("w{w}-{}", round % 50);
                    let internal = registry.add_or_update("A", &id);
                    if round % 3 == 0 {
                        assert_eq!(registry.remove("A", &id), Some(internal));
                    }
                }
            })
        })
        .collect();

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let registry = registry.clone();
            let stop = stop.clone();
            thread::spawn(move || {
                let mut checks = 0u64;
                while !stop.load(Ordering::Relaxed) {
                    for (external, internal) in registry.users("A") {
                        // A visible forward entry always has its reverse entry
                        // unless a writer removed both in between.
                        if let Some(back) = registry.external_id("A", internal) {
                            assert_eq!(back, external);
                        }
                        checks += 1;
                    }
                }
                checks
            })
        })
        .collect();

    for writer in writers {
        writer.join().unwrap();
    }
    stop.store(true, Ordering::Relaxed);
    for reader in readers {
        reader.join().unwrap();
    }

    // Every surviving mapping is consistent both ways and ids are unique.
    let users = registry.users("A");
    let mut seen = HashMap::new();
    for (external, internal) in &users {
        assert_eq!(registry.lookup("A", external), Some(*internal));
        assert_eq!(registry.external_id("A", *internal).as_deref(), Some(external.as_str()));
        assert!(seen.insert(*internal, external.clone()).is_none());
    }
}

#[test]
fn test_tags_are_independent_under_contention() {
    let registry = Arc::new(UserRegistry::new());
    let handles: Vec<_> = (0..8)
        .map(|t| {
            let registry = registry.clone();
            thread::spawn(move || {
                let tag = format!("T{}", t % 2);
                for i in 0..200 {
                    registry.add_or_update(&tag, &format!("u{i}"));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    for tag in ["T0", "T1"] {
        assert_eq!(registry.len(tag), 200);
        let mut ids: Vec<u64> = registry.users(tag).into_iter().map(|(_, id)| id).collect();
        ids.sort_unstable();
        assert_eq!(ids, (1..=200).collect::<Vec<_>>());
    }
}
