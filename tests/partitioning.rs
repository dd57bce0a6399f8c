use parking_lot::Mutex;
use proptest::prelude::*;
use ring_pipeline::{ConsumerGroup, RingBuffer, Sequence};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Publish `events` events into a buffer read by one group of `pool_size`
/// workers and return what each worker claimed.
fn claimed_by_worker(capacity: usize, pool_size: usize, events: u64) -> Vec<Vec<Sequence>> {
    let buffer = Arc::new(RingBuffer::new("partition", capacity).expect("Buffer creation failed"));
    let claimed = Arc::new(Mutex::new(vec![Vec::new(); pool_size]));

    let handler = {
        let claimed = Arc::clone(&claimed);
        Arc::new(move |ordinal: usize, sequence: Sequence, event: &u64| {
            assert_eq!(sequence, *event);
            claimed.lock()[ordinal].push(sequence);
        })
    };
    let mut group =
        ConsumerGroup::spawn("part", Arc::clone(&buffer), pool_size, handler).expect("Group spawn failed");

    for value in 0..events {
        buffer.publish(value).expect("Publish failed");
    }
    buffer.shutdown();
    group.await_exit(None).expect("Group exit failed");

    let claimed = claimed.lock().clone();
    claimed
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_partition_is_total_and_disjoint(
        capacity_exp in 0u32..6,
        pool_size in 1usize..6,
        events in 0u64..300,
    ) {
        let claimed = claimed_by_worker(1 << capacity_exp, pool_size, events);

        let mut union = BTreeSet::new();
        for (ordinal, sequences) in claimed.iter().enumerate() {
            // each worker sees its own residue class, in publish order
            prop_assert!(sequences.windows(2).all(|pair| pair[0] < pair[1]));
            for &sequence in sequences {
                prop_assert_eq!(sequence as usize % pool_size, ordinal);
                prop_assert!(union.insert(sequence), "sequence {} claimed twice", sequence);
            }
        }
        prop_assert_eq!(union, (0..events).collect::<BTreeSet<_>>());
    }
}

#[test]
fn test_two_groups_each_see_every_event() {
    let buffer = Arc::new(RingBuffer::new("fanout", 4).expect("Buffer creation failed"));
    let fast = Arc::new(Mutex::new(Vec::new()));
    let slow = Arc::new(Mutex::new(Vec::new()));

    let fast_handler = {
        let fast = Arc::clone(&fast);
        Arc::new(move |_: usize, sequence: Sequence, _: &u64| fast.lock().push(sequence))
    };
    let slow_handler = {
        let slow = Arc::clone(&slow);
        Arc::new(move |_: usize, sequence: Sequence, _: &u64| {
            std::thread::sleep(std::time::Duration::from_millis(1));
            slow.lock().push(sequence);
        })
    };
    let mut fast_group =
        ConsumerGroup::spawn("fast", Arc::clone(&buffer), 2, fast_handler).expect("Group spawn failed");
    let mut slow_group =
        ConsumerGroup::spawn("slow", Arc::clone(&buffer), 1, slow_handler).expect("Group spawn failed");

    for value in 0..40u64 {
        buffer.publish(value).expect("Publish failed");
    }
    buffer.shutdown();
    fast_group.await_exit(None).expect("Fast group exit failed");
    slow_group.await_exit(None).expect("Slow group exit failed");

    let mut fast = fast.lock().clone();
    fast.sort_unstable();
    assert_eq!(fast, (0..40).collect::<Vec<_>>());
    assert_eq!(*slow.lock(), (0..40).collect::<Vec<_>>());
}
