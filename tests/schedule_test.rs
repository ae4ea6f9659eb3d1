//! Event queue tests

use brt_sim::simulation::{BusId, EventQueue, ScheduledAction};

#[test]
fn test_actions_drain_in_time_order() {
    let mut queue = EventQueue::new();
    queue.schedule(3000.0, ScheduledAction::ActivateBus(BusId(3)));
    queue.schedule(1000.0, ScheduledAction::ActivateBus(BusId(1)));
    queue.schedule(2000.0, ScheduledAction::ReactivateBus(BusId(2)));
    assert_eq!(queue.len(), 3);
    assert_eq!(queue.next_due(), Some(1000.0));

    assert!(queue.drain_due(999.0).is_empty());
    assert_eq!(queue.drain_due(2000.0), vec![
        ScheduledAction::ActivateBus(BusId(1)),
        ScheduledAction::ReactivateBus(BusId(2)),
    ]);
    assert_eq!(queue.len(), 1);
    assert_eq!(queue.next_due(), Some(3000.0));

    assert_eq!(queue.drain_due(10_000.0), vec![ScheduledAction::ActivateBus(BusId(3))]);
    assert!(queue.is_empty());
    assert_eq!(queue.next_due(), None);
}

#[test]
fn test_same_time_actions_keep_insertion_order() {
    let mut queue = EventQueue::new();
    for id in [4, 1, 3] {
        queue.schedule(500.0, ScheduledAction::ActivateBus(BusId(id)));
    }
    let drained: Vec<usize> = queue.drain_due(500.0).iter().map(|a| a.bus().0).collect();
    assert_eq!(drained, vec![4, 1, 3]);
}

#[test]
fn test_cancel_bus_leaves_other_buses() {
    let mut queue = EventQueue::new();
    queue.schedule(100.0, ScheduledAction::ActivateBus(BusId(0)));
    queue.schedule(100.0, ScheduledAction::ActivateBus(BusId(1)));
    queue.schedule(200.0, ScheduledAction::ReactivateBus(BusId(0)));

    assert_eq!(queue.cancel_bus(BusId(0)), 2);
    assert_eq!(queue.len(), 1);
    assert!(queue.is_pending(ScheduledAction::ActivateBus(BusId(1))));
    assert!(!queue.is_pending(ScheduledAction::ReactivateBus(BusId(0))));
    assert_eq!(queue.cancel_bus(BusId(7)), 0);
}

#[test]
fn test_cancel_all_empties_the_queue() {
    let mut queue = EventQueue::new();
    for i in 0..5 {
        queue.schedule(i as f64 * 10.0, ScheduledAction::ReactivateBus(BusId(i)));
    }
    assert_eq!(queue.cancel_all(), 5);
    assert!(queue.is_empty());
    assert!(queue.drain_due(f64::MAX).is_empty());
}
