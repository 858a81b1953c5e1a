use dedulog::CacheStore;
use std::thread;

#[test]
fn respects_capacity_bound_with_lru_eviction() {
    let cache = CacheStore::new(3);
    cache.put("a");
    cache.put("b");
    cache.put("c");
    cache.put("d");
    assert_eq!(cache.len(), 3);
    assert!(!cache.contains_key("a"));
    assert!(cache.contains_key("b"));
    assert!(cache.contains_key("c"));
    assert!(cache.contains_key("d"));
}

#[test]
fn putting_an_existing_id_refreshes_recency() {
    let cache = CacheStore::new(3);
    cache.put("a");
    cache.put("b");
    cache.put("c");
    cache.put("a");
    cache.put("d");
    assert!(cache.contains_key("a"));
    assert!(!cache.contains_key("b"));
}

#[test]
fn contains_is_a_pure_read_and_does_not_refresh_recency() {
    let cache = CacheStore::new(3);
    cache.put("a");
    cache.put("b");
    cache.put("c");
    assert!(cache.contains_key("a"));
    cache.put("d");
    assert!(!cache.contains_key("a"));
}

#[test]
fn delete_reports_prior_presence() {
    let cache = CacheStore::new(3);
    cache.put("a");
    assert!(cache.delete("a"));
    assert!(!cache.delete("a"));
    assert!(!cache.contains_key("a"));
}

#[test]
fn clear_drops_every_entry() {
    let cache = CacheStore::new(3);
    cache.put("a");
    cache.put("b");
    cache.clear();
    assert!(cache.is_empty());
    assert_eq!(cache.capacity(), 3);
}

#[test]
fn zero_capacity_is_clamped_to_one() {
    let cache = CacheStore::new(0);
    cache.put("a");
    cache.put("b");
    assert_eq!(cache.len(), 1);
    assert!(cache.contains_key("b"));
}

#[test]
fn readers_and_writer_share_the_store() {
    let cache = CacheStore::new(64);
    let writer = {
        let cache = cache.clone();
        thread::spawn(move || {
            for idx in 0..64 {
                cache.put(&format!("id-{idx}"));
            }
        })
    };
    let reader = {
        let cache = cache.clone();
        thread::spawn(move || {
            for idx in 0..64 {
                let _ = cache.contains_key(&format!("id-{idx}"));
            }
        })
    };
    writer.join().unwrap();
    reader.join().unwrap();
    assert_eq!(cache.len(), 64);
}
