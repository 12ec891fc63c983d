/// Universal concurrency key tests
///
/// Ordering of universal-key messages under both policies
/// Run with: cargo test --test universal_key_policy_tests

use entity_retirement::{
    ConcurrencyKey, RetirementConfig, RetirementManager, UniversalKeyPolicy,
};

const UNIVERSAL: ConcurrencyKey = ConcurrencyKey::UNIVERSAL;

fn manager(policy: UniversalKeyPolicy) -> RetirementManager<&'static str, &'static str> {
    RetirementManager::with_config(RetirementConfig::new().universal_key_policy(policy)).unwrap()
}

#[test]
fn test_deferred_universal_message_retires_with_its_target() {
    let manager = manager(UniversalKeyPolicy::Unordered);
    manager.register("u1", UNIVERSAL, "r_u1").unwrap();
    manager.register("u2", UNIVERSAL, "r_u2").unwrap();
    manager.defer("u1", "target").unwrap();
    manager.register("target", 3, "r_target").unwrap();

    assert!(manager.complete(&"u1").unwrap().is_empty());
    assert_eq!(
        manager.complete(&"target").unwrap(),
        vec!["r_target", "r_u1"]
    );
    assert!(manager.is_registered(&"u2").unwrap());
    assert_eq!(manager.complete(&"u2").unwrap(), vec!["r_u2"]);
}

#[test]
fn test_unordered_universal_messages_do_not_queue() {
    let manager = manager(UniversalKeyPolicy::Unordered);
    manager.register("u1", UNIVERSAL, "r_u1").unwrap();
    manager.register("a", 1, "ra").unwrap();
    manager.register("u2", UNIVERSAL, "r_u2").unwrap();

    assert_eq!(manager.complete(&"u2").unwrap(), vec!["r_u2"]);
    assert_eq!(manager.complete(&"a").unwrap(), vec!["ra"]);
    assert_eq!(manager.complete(&"u1").unwrap(), vec!["r_u1"]);
}

#[test]
fn test_unordered_universal_still_honors_holds() {
    let manager = manager(UniversalKeyPolicy::Unordered);
    manager.register("u", UNIVERSAL, "r_u").unwrap();
    manager.hold(&"u").unwrap();

    assert!(manager.complete(&"u").unwrap().is_empty());
    assert!(manager.release(&"u").unwrap());
    assert_eq!(manager.complete(&"u").unwrap(), vec!["r_u"]);
}

#[test]
fn test_barrier_waits_for_earlier_messages() {
    let manager = manager(UniversalKeyPolicy::Barrier);
    manager.register("a", 1, "ra").unwrap();
    manager.register("b", 2, "rb").unwrap();
    manager.register("u", UNIVERSAL, "r_u").unwrap();

    assert!(manager.complete(&"u").unwrap().is_empty());
    assert_eq!(manager.complete(&"b").unwrap(), vec!["rb"]);
    assert_eq!(manager.complete(&"a").unwrap(), vec!["ra", "r_u"]);
}

#[test]
fn test_barrier_blocks_later_messages_on_every_key() {
    let manager = manager(UniversalKeyPolicy::Barrier);
    manager.register("a", 1, "ra").unwrap();
    manager.register("u", UNIVERSAL, "r_u").unwrap();
    manager.register("b", 2, "rb").unwrap();
    manager.register("c", 1, "rc").unwrap();

    assert!(manager.complete(&"b").unwrap().is_empty());
    assert!(manager.complete(&"c").unwrap().is_empty());
    assert!(manager.complete(&"u").unwrap().is_empty());
    assert_eq!(manager.complete(&"a").unwrap(), vec!["ra", "r_u", "rb", "rc"]);
}

#[test]
fn test_barriers_retire_in_registration_order() {
    let manager = manager(UniversalKeyPolicy::Barrier);
    manager.register("u1", UNIVERSAL, "r_u1").unwrap();
    manager.register("u2", UNIVERSAL, "r_u2").unwrap();

    assert!(manager.complete(&"u2").unwrap().is_empty());
    assert_eq!(manager.complete(&"u1").unwrap(), vec!["r_u1", "r_u2"]);
}

#[test]
fn test_barrier_fan_out_is_exempt() {
    let manager = manager(UniversalKeyPolicy::Barrier);
    manager.register("u", UNIVERSAL, "r_u").unwrap();
    manager.defer("u", "fanout").unwrap();
    manager.register("fanout", 5, "r_fanout").unwrap();
    manager.register("later", 5, "r_later").unwrap();

    assert!(manager.complete(&"later").unwrap().is_empty());
    assert!(manager.complete(&"u").unwrap().is_empty());
    assert_eq!(
        manager.complete(&"fanout").unwrap(),
        vec!["r_fanout", "r_u", "r_later"]
    );
}

#[test]
fn test_barrier_deferred_to_earlier_message_of_other_key() {
    let manager = manager(UniversalKeyPolicy::Barrier);
    manager.register("a", 1, "ra").unwrap();
    manager.register("u", UNIVERSAL, "r_u").unwrap();
    manager.defer("u", "a").unwrap();

    assert!(manager.complete(&"u").unwrap().is_empty());
    assert_eq!(manager.complete(&"a").unwrap(), vec!["ra", "r_u"]);
    assert!(manager.stats().unwrap().is_drained());
}

#[test]
fn test_universal_backlog_is_listed_first() {
    let manager = manager(UniversalKeyPolicy::Barrier);
    manager.register("a", 2, "ra").unwrap();
    manager.register("u", UNIVERSAL, "r_u").unwrap();
    manager.complete(&"u").unwrap();

    let backlog = manager.backlog().unwrap();
    assert_eq!(backlog[0].key, UNIVERSAL);
    assert!(backlog[0].head_completed);
    assert_eq!(backlog[1].key, ConcurrencyKey(2));
    assert_eq!(manager.stats().unwrap().keys, 2);
}
