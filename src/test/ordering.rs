use std::cmp::Ordering;

use crate::sim::{Event, EventOrdering, EventType, NodeId, SimTime, TypeOrder};

fn ev(producer: &str, kind: &str, time: i64, ordinal: u64) -> Event {
    Event::new(NodeId::new(producer), EventType::new(kind), SimTime(time), ordinal)
}

#[test]
fn canonical_order_compares_time_producer_ordinal_then_type() {
    let order = EventOrdering::canonical();
    assert_eq!(order.compare(&ev("z", "X", 1, 9), &ev("a", "X", 2, 0)), Ordering::Less);
    assert_eq!(order.compare(&ev("a", "X", 2, 9), &ev("b", "X", 2, 0)), Ordering::Less);
    assert_eq!(order.compare(&ev("a", "X", 2, 1), &ev("a", "X", 2, 2)), Ordering::Less);
    assert_eq!(order.compare(&ev("a", "B", 2, 1), &ev("a", "A", 2, 1)), Ordering::Greater);
    assert_eq!(order.compare(&ev("a", "A", 2, 1), &ev("a", "A", 2, 1)), Ordering::Equal);
}

#[test]
fn type_override_outranks_producer_but_not_time() {
    let order = EventOrdering::with_type_order(TypeOrder::ranked(["FAIL", "REPAIR"]));
    assert_eq!(
        order.compare(&ev("z", "FAIL", 4, 0), &ev("a", "REPAIR", 4, 0)),
        Ordering::Less
    );
    assert_eq!(
        order.compare(&ev("z", "FAIL", 5, 0), &ev("a", "REPAIR", 4, 0)),
        Ordering::Greater
    );
}

#[test]
fn ranked_order_puts_unlisted_types_last() {
    let order = EventOrdering::with_type_order(TypeOrder::ranked(["FIRST"]));
    assert_eq!(
        order.compare(&ev("b", "FIRST", 1, 0), &ev("a", "OTHER", 1, 0)),
        Ordering::Less
    );
    // 未列出的类型彼此相等，退回生产者层
    assert_eq!(
        order.compare(&ev("a", "OTHER", 1, 0), &ev("b", "ANOTHER", 1, 0)),
        Ordering::Less
    );
}

#[test]
fn custom_type_order_closure_is_honored() {
    let reverse = TypeOrder::new(|a, b| b.cmp(a));
    let order = EventOrdering::from_override(Some(reverse));
    assert_eq!(
        order.compare(&ev("a", "A", 1, 0), &ev("a", "B", 1, 0)),
        Ordering::Greater
    );
}
