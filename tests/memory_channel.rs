use dedulog::{BroadcastChannel, ChannelError, MemoryBroker, MEMORY_PARTITIONS};
use std::time::Duration;

const POLL: Duration = Duration::from_millis(5);

#[test]
fn publish_is_acknowledged_with_partition_and_offset() {
    let broker = MemoryBroker::new();
    let publisher = broker.open_publisher("acks").unwrap();
    let first = publisher.publish(Some("k"), "add").unwrap();
    let second = publisher.publish(Some("k"), "remove").unwrap();
    assert_eq!(first.partition, second.partition);
    assert_eq!(second.offset, first.offset + 1);
    assert!((first.partition as usize) < MEMORY_PARTITIONS);
    assert_eq!(broker.record_count("acks"), 2);
}

#[test]
fn keyless_records_land_on_partition_zero() {
    let broker = MemoryBroker::new();
    let publisher = broker.open_publisher("keyless").unwrap();
    let ack = publisher.publish(None, "clear").unwrap();
    assert_eq!(ack.partition, 0);
}

#[test]
fn consumer_replays_from_earliest() {
    let broker = MemoryBroker::new();
    let publisher = broker.open_publisher("replay").unwrap();
    publisher.publish(Some("a"), "add").unwrap();
    publisher.publish(Some("b"), "add").unwrap();

    let mut consumer = broker.open_consumer("replay", "group-1").unwrap();
    consumer.subscribe().unwrap();
    consumer.seek_to_earliest().unwrap();
    let batch = consumer.poll(POLL).unwrap();
    assert_eq!(batch.len(), 2);
    assert!(batch.iter().all(|record| record.topic == "replay"));
    assert!(batch.iter().all(|record| record.value == "add"));

    // Caught up; next fetch is empty.
    assert!(consumer.poll(POLL).unwrap().is_empty());
}

#[test]
fn consumer_groups_keep_independent_cursors() {
    let broker = MemoryBroker::new();
    let publisher = broker.open_publisher("groups").unwrap();
    publisher.publish(Some("a"), "add").unwrap();

    let mut first = broker.open_consumer("groups", "group-1").unwrap();
    first.subscribe().unwrap();
    first.seek_to_earliest().unwrap();
    assert_eq!(first.poll(POLL).unwrap().len(), 1);

    let mut second = broker.open_consumer("groups", "group-2").unwrap();
    second.subscribe().unwrap();
    second.seek_to_earliest().unwrap();
    assert_eq!(second.poll(POLL).unwrap().len(), 1);
}

#[test]
fn closed_handles_reject_further_use() {
    let broker = MemoryBroker::new();
    let publisher = broker.open_publisher("closed").unwrap();
    publisher.close();
    assert_eq!(
        publisher.publish(Some("a"), "add"),
        Err(ChannelError::Closed)
    );

    let mut consumer = broker.open_consumer("closed", "group-1").unwrap();
    consumer.close();
    assert_eq!(consumer.poll(POLL), Err(ChannelError::Closed));
}

#[test]
fn poll_before_subscribe_is_a_transport_error() {
    let broker = MemoryBroker::new();
    let mut consumer = broker.open_consumer("unsubscribed", "group-1").unwrap();
    assert!(matches!(
        consumer.poll(POLL),
        Err(ChannelError::Transport(_))
    ));
}
