/// Retirement manager scenario tests
///
/// Ordering of completion notices across key queues, deferrals and holds
/// Run with: cargo test --test retirement_manager_tests

use entity_retirement::{ConcurrencyKey, RetirementManager};

type Manager = RetirementManager<&'static str, &'static str>;

#[test]
fn test_out_of_order_completion_on_one_key() {
    let manager = Manager::new();
    manager.register("m1", 1, "r1").unwrap();
    manager.register("m2", 1, "r2").unwrap();

    assert!(manager.complete(&"m2").unwrap().is_empty());
    assert_eq!(manager.complete(&"m1").unwrap(), vec!["r1", "r2"]);
}

#[test]
fn test_deferral_to_unregistered_message_on_other_key() {
    let manager = Manager::new();
    manager.register("m1", 1, "r1").unwrap();
    manager.defer("m1", "m3").unwrap();
    manager.register("m3", 2, "r3").unwrap();

    assert!(manager.complete(&"m1").unwrap().is_empty());
    assert!(!manager.is_retireable(&"m1").unwrap());
    assert_eq!(manager.complete(&"m3").unwrap(), vec!["r3", "r1"]);
    assert!(manager.stats().unwrap().is_drained());
}

#[test]
fn test_double_hold_needs_two_releases() {
    let manager = Manager::new();
    manager.register("a", 1, "ra").unwrap();
    manager.register("b", 1, "rb").unwrap();
    manager.register("c", 1, "rc").unwrap();
    manager.hold(&"b").unwrap();
    manager.hold(&"b").unwrap();

    assert_eq!(manager.complete(&"a").unwrap(), vec!["ra"]);
    assert!(manager.complete(&"b").unwrap().is_empty());
    assert!(manager.complete(&"c").unwrap().is_empty());

    assert!(!manager.release(&"b").unwrap());
    assert!(manager.complete(&"b").unwrap().is_empty());

    assert!(manager.release(&"b").unwrap());
    assert_eq!(manager.complete(&"b").unwrap(), vec!["rb", "rc"]);
}

#[test]
fn test_five_link_chain_across_keys() {
    let manager = Manager::new();
    let links = ["l1", "l2", "l3", "l4", "l5"];
    for (idx, link) in links.iter().enumerate() {
        manager.register(*link, idx as i32 + 1, *link).unwrap();
    }
    for pair in links.windows(2) {
        manager.defer(pair[0], pair[1]).unwrap();
    }

    for link in &links[..4] {
        assert!(manager.complete(link).unwrap().is_empty());
    }
    assert_eq!(
        manager.complete(&"l5").unwrap(),
        vec!["l5", "l4", "l3", "l2", "l1"]
    );
}

#[test]
fn test_chain_declared_before_registration() {
    let manager = Manager::new();
    manager.defer("l1", "l2").unwrap();
    manager.defer("l2", "l3").unwrap();

    manager.register("l3", 3, "r3").unwrap();
    manager.register("l2", 2, "r2").unwrap();
    manager.register("l1", 1, "r1").unwrap();

    assert!(manager.complete(&"l1").unwrap().is_empty());
    assert!(manager.complete(&"l2").unwrap().is_empty());
    assert_eq!(manager.complete(&"l3").unwrap(), vec!["r3", "r2", "r1"]);
}

#[test]
#[should_panic(expected = "already registered")]
fn test_double_registration_is_rejected() {
    let manager = Manager::new();
    manager.register("m", 1, "r").unwrap();
    manager.register("m", 2, "r").unwrap();
}

#[test]
#[should_panic(expected = "not registered")]
fn test_completing_unknown_message_is_rejected() {
    let manager = Manager::new();
    manager.complete(&"ghost").unwrap();
}

#[test]
#[should_panic(expected = "cycle")]
fn test_deferral_cycle_is_rejected() {
    let manager = Manager::new();
    manager.defer("a", "b").unwrap();
    manager.defer("b", "c").unwrap();
    manager.defer("c", "a").unwrap();
}

#[test]
fn test_chained_deferrals_on_same_key() {
    let manager = Manager::new();
    manager.register("invoke", 1, "r_invoke").unwrap();
    manager.defer("invoke", "fanout").unwrap();
    manager.register("fanout", 1, "r_fanout").unwrap();
    manager.defer("fanout", "nested").unwrap();
    manager.register("nested", 1, "r_nested").unwrap();

    assert!(manager.complete(&"invoke").unwrap().is_empty());
    assert!(manager.complete(&"fanout").unwrap().is_empty());
    assert_eq!(
        manager.complete(&"nested").unwrap(),
        vec!["r_nested", "r_fanout", "r_invoke"]
    );
}

#[test]
fn test_waiter_keeps_queue_position_for_later_messages() {
    let manager = Manager::new();
    manager.register("invoke", 1, "r_invoke").unwrap();
    manager.defer("invoke", "fanout").unwrap();
    manager.register("after", 1, "r_after").unwrap();
    manager.register("fanout", 1, "r_fanout").unwrap();

    assert!(manager.complete(&"after").unwrap().is_empty());
    assert!(manager.complete(&"invoke").unwrap().is_empty());
    assert_eq!(
        manager.complete(&"fanout").unwrap(),
        vec!["r_fanout", "r_invoke", "r_after"]
    );
}

#[test]
fn test_multiple_deferral_targets() {
    let manager = Manager::new();
    manager.register("source", 1, "r_source").unwrap();
    manager.defer("source", "t1").unwrap();
    manager.defer("source", "t2").unwrap();
    manager.register("t1", 2, "r_t1").unwrap();
    manager.register("t2", 3, "r_t2").unwrap();

    assert!(manager.complete(&"source").unwrap().is_empty());
    assert_eq!(manager.complete(&"t1").unwrap(), vec!["r_t1"]);
    assert!(!manager.is_retireable(&"source").unwrap());
    assert_eq!(manager.complete(&"t2").unwrap(), vec!["r_t2", "r_source"]);
}

#[test]
fn test_shared_target_releases_waiters_in_deferral_order() {
    let manager = Manager::new();
    manager.register("w1", 1, "r_w1").unwrap();
    manager.register("w2", 2, "r_w2").unwrap();
    manager.defer("w2", "target").unwrap();
    manager.defer("w1", "target").unwrap();
    manager.register("target", 3, "r_target").unwrap();

    manager.complete(&"w1").unwrap();
    manager.complete(&"w2").unwrap();
    assert_eq!(
        manager.complete(&"target").unwrap(),
        vec!["r_target", "r_w2", "r_w1"]
    );
}

#[test]
fn test_cross_key_deferral_keeps_fifo_on_both_keys() {
    let manager = Manager::new();
    manager.register("a", 1, "ra").unwrap();
    manager.defer("a", "f").unwrap();
    manager.register("x", 1, "rx").unwrap();
    manager.register("y", 2, "ry").unwrap();
    manager.register("f", 2, "rf").unwrap();

    assert!(manager.complete(&"x").unwrap().is_empty());
    assert!(manager.complete(&"a").unwrap().is_empty());
    assert!(manager.complete(&"f").unwrap().is_empty());
    assert_eq!(manager.complete(&"y").unwrap(), vec!["ry", "rf", "ra", "rx"]);
}

#[test]
fn test_uncompleted_head_blocks_key() {
    let manager = Manager::new();
    manager.register("m1", 4, "r1").unwrap();
    manager.register("m2", 4, "r2").unwrap();
    manager.register("m3", 4, "r3").unwrap();

    assert!(manager.complete(&"m3").unwrap().is_empty());
    assert!(manager.complete(&"m2").unwrap().is_empty());

    let stats = manager.stats().unwrap();
    assert_eq!(stats.pending, 3);
    assert_eq!(stats.completed_pending, 2);

    let backlog = manager.backlog().unwrap();
    assert_eq!(backlog.len(), 1);
    assert_eq!(backlog[0].key, ConcurrencyKey(4));
    assert_eq!(backlog[0].depth, 3);
    assert!(!backlog[0].head_completed);
}

#[test]
fn test_repeated_completion_signal_is_harmless() {
    let manager = Manager::new();
    manager.register("m1", 1, "r1").unwrap();
    manager.register("m2", 1, "r2").unwrap();

    assert!(manager.complete(&"m2").unwrap().is_empty());
    assert!(manager.complete(&"m2").unwrap().is_empty());
    assert_eq!(manager.complete(&"m1").unwrap(), vec!["r1", "r2"]);
    assert!(!manager.is_registered(&"m2").unwrap());
}

#[test]
fn test_message_ids_are_reusable_after_retirement() {
    let manager = Manager::new();
    manager.register("m", ConcurrencyKey::MANAGEMENT, "first").unwrap();
    assert_eq!(manager.complete(&"m").unwrap(), vec!["first"]);

    manager.register("m", ConcurrencyKey::MANAGEMENT, "second").unwrap();
    assert_eq!(manager.complete(&"m").unwrap(), vec!["second"]);
    assert_eq!(manager.stats().unwrap().retired_total, 2);
}

#[test]
fn test_large_backlog_drains_in_order() {
    let manager: RetirementManager<u64, u64> = RetirementManager::new();
    let count = 50_000u64;
    for id in 0..count {
        manager.register(id, 3, id).unwrap();
    }
    for id in (1..count).rev() {
        assert!(manager.complete(&id).unwrap().is_empty());
    }

    let retired = manager.complete(&0).unwrap();
    assert_eq!(retired, (0..count).collect::<Vec<_>>());
    assert!(manager.stats().unwrap().is_drained());
}

#[test]
fn test_large_backlog_behind_same_key_fan_out() {
    let manager: RetirementManager<u64, u64> = RetirementManager::new();
    let count = 20_000u64;
    manager.register(0, 3, 0).unwrap();
    manager.defer(0, count).unwrap();
    for id in 1..=count {
        manager.register(id, 3, id).unwrap();
    }
    for id in 0..count {
        assert!(manager.complete(&id).unwrap().is_empty());
    }

    let mut expected = vec![count];
    expected.extend(0..count);
    assert_eq!(manager.complete(&count).unwrap(), expected);
    assert!(manager.stats().unwrap().is_drained());
}

#[test]
fn test_deferral_to_retired_message_is_flagged() {
    let manager = Manager::new();
    manager.register("t", 1, "rt").unwrap();
    assert_eq!(manager.complete(&"t").unwrap(), vec!["rt"]);

    manager.register("s", 2, "rs").unwrap();
    manager.defer("s", "t").unwrap();
    assert!(manager.complete(&"s").unwrap().is_empty());
    assert!(!manager.is_retireable(&"s").unwrap());

    let stats = manager.stats().unwrap();
    assert_eq!(stats.blocked_on_unregistered, 1);
    assert!(!stats.is_drained());
    let backlog = manager.backlog().unwrap();
    assert_eq!(backlog.len(), 1);
    assert!(backlog[0].head_deferred);
    assert!(backlog[0].head_waiting_on_unregistered);
}
