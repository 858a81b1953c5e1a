use dedulog::{BroadcastChannel, DedupRepository, MemoryBroker, RepositoryConfig};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(2);

fn test_config(topic: &str) -> RepositoryConfig {
    let mut config = RepositoryConfig::new(topic, "broker-0:9092");
    config.poll_timeout_ms = 5;
    config.warmup_timeout_ms = 2_000;
    config.shutdown_timeout_ms = 2_000;
    config
}

fn wait_for<F>(timeout: Duration, mut predicate: F)
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if predicate() {
            return;
        }
        thread::sleep(Duration::from_millis(5));
    }
    panic!("condition not met within {:?}", timeout);
}

#[test]
fn added_identifiers_eventually_become_visible() {
    let broker = Arc::new(MemoryBroker::new());
    let repo = DedupRepository::new(test_config("visible"), broker).unwrap();
    repo.start().unwrap();

    assert_eq!(repo.add("x"), Ok(true));
    // The mutation is applied asynchronously, on replay.
    wait_for(WAIT, || repo.contains("x"));
    repo.stop();
}

#[test]
fn second_add_after_convergence_is_a_duplicate() {
    let broker = Arc::new(MemoryBroker::new());
    let repo = DedupRepository::new(test_config("duplicates"), broker).unwrap();
    repo.start().unwrap();

    assert_eq!(repo.add("x"), Ok(true));
    wait_for(WAIT, || repo.contains("x"));
    let hits_before = repo.duplicate_count();
    assert_eq!(repo.add("x"), Ok(false));
    assert_eq!(repo.duplicate_count(), hits_before + 1);
    repo.stop();
}

#[test]
fn contains_hit_counts_a_duplicate() {
    let broker = Arc::new(MemoryBroker::new());
    let repo = DedupRepository::new(test_config("contains-hits"), broker).unwrap();
    repo.start().unwrap();

    repo.add("x").unwrap();
    wait_for(WAIT, || repo.contains("x"));

    let hits_before = repo.duplicate_count();
    assert!(repo.contains("x"));
    assert_eq!(repo.duplicate_count(), hits_before + 1);

    // A miss is not a duplicate.
    assert!(!repo.contains("y"));
    assert_eq!(repo.duplicate_count(), hits_before + 1);
    repo.stop();
}

#[test]
fn removed_identifiers_eventually_disappear() {
    let broker = Arc::new(MemoryBroker::new());
    let repo = DedupRepository::new(test_config("removal"), broker).unwrap();
    repo.start().unwrap();

    repo.add("x").unwrap();
    wait_for(WAIT, || repo.contains("x"));
    assert_eq!(repo.remove("x"), Ok(true));
    wait_for(WAIT, || !repo.contains("x"));
    repo.stop();
}

#[test]
fn late_joining_instance_replays_full_history() {
    let broker = Arc::new(MemoryBroker::new());
    let first = DedupRepository::new(test_config("late-joiner"), broker.clone()).unwrap();
    first.start().unwrap();
    first.add("x").unwrap();
    first.add("y").unwrap();
    wait_for(WAIT, || first.contains("x") && first.contains("y"));

    // The second instance starts after the history exists; start() blocks on
    // warm-up, so the replayed state is visible as soon as it returns.
    let second = DedupRepository::new(test_config("late-joiner"), broker).unwrap();
    second.start().unwrap();
    assert!(second.contains("x"));
    assert!(second.contains("y"));

    first.stop();
    second.stop();
}

#[test]
fn clear_converges_across_instances() {
    let broker = Arc::new(MemoryBroker::new());
    let first = DedupRepository::new(test_config("shared-clear"), broker.clone()).unwrap();
    let second = DedupRepository::new(test_config("shared-clear"), broker).unwrap();
    first.start().unwrap();
    second.start().unwrap();

    first.add("x").unwrap();
    wait_for(WAIT, || first.contains("x") && second.contains("x"));

    second.clear().unwrap();
    wait_for(WAIT, || !first.contains("x") && !second.contains("x"));

    first.stop();
    second.stop();
}

#[test]
fn capacity_bound_evicts_the_oldest_identifier() {
    let broker = Arc::new(MemoryBroker::new());
    let mut config = test_config("dedupe-test");
    config.cache_capacity = 3;
    let repo = DedupRepository::new(config, broker).unwrap();
    repo.start().unwrap();

    // Converge after each add so the apply order matches the add order.
    for id in ["a", "b", "c", "d"] {
        assert_eq!(repo.add(id), Ok(true));
        wait_for(WAIT, || repo.contains(id));
    }

    assert!(!repo.contains("a"));
    assert!(repo.contains("d"));
    repo.stop();
}

#[test]
fn malformed_record_halts_replication_but_not_reads() {
    let broker = Arc::new(MemoryBroker::new());
    let repo = DedupRepository::new(test_config("poisoned"), broker.clone()).unwrap();
    repo.start().unwrap();

    repo.add("x").unwrap();
    wait_for(WAIT, || repo.contains("x"));
    assert!(repo.poller_running());

    // Inject a record no variant maps to; same key keeps it ordered after
    // the add on its partition.
    let publisher = broker.open_publisher("poisoned").unwrap();
    publisher.publish(Some("x"), "explode").unwrap();

    wait_for(WAIT, || !repo.poller_running());
    // Stale local reads stay available after the fail-stop.
    assert!(repo.contains("x"));
    repo.stop();
}
