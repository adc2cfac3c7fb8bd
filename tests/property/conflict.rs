//! Property-based tests for time-slot conflict checking.
//!
//! 1. Empty or inverted candidate ranges are never available.
//! 2. Any non-empty range is available on an empty day.
//! 3. Range-versus-range conflicts are symmetric.
//! 4. A point candidate conflicts with a range exactly when it starts inside it.
//! 5. Free slots are sorted, disjoint and never overlap a timed task.

use pairplan::tasks::{free_slots, is_slot_available};
use pairplan_proto::task::{ClockTime, DEFAULT_TASK_MINUTES, Task, TaskType, Weekday};
use proptest::prelude::*;

// --- Helpers ---

fn task_at(start: u16, end: Option<u16>) -> Task {
    let mut task = Task::new("t", TaskType::Work, "u", Weekday::Monday, 0);
    task.time = ClockTime::from_minutes(start);
    task.end_time = end.and_then(ClockTime::from_minutes);
    task
}

// --- Strategies ---

/// A range `(start, end)` within the day whose length is not the point length.
fn arb_range() -> impl Strategy<Value = (u16, u16)> {
    (0u16..1400, 1u16..=180)
        .prop_map(|(start, len)| (start, (start + len).min(1439)))
        .prop_filter("not a point", |(s, e)| e - s != DEFAULT_TASK_MINUTES && e > s)
}

/// A timed task, either a point or an explicit range.
fn arb_timed_task() -> impl Strategy<Value = Task> {
    (0u16..1380, prop::option::of(1u16..=240)).prop_map(|(start, len)| {
        task_at(start, len.map(|l| (start + l).min(1439)))
    })
}

proptest! {
    #[test]
    fn inverted_ranges_never_available(start in 0u16..1440, back in 0u16..1440) {
        let end = start.saturating_sub(back);
        let existing: Vec<Task> = Vec::new();
        prop_assert!(!is_slot_available(start, end, &existing));
    }

    #[test]
    fn empty_day_always_available((start, end) in arb_range()) {
        let existing: Vec<Task> = Vec::new();
        prop_assert!(is_slot_available(start, end, &existing));
    }

    #[test]
    fn range_conflicts_are_symmetric(a in arb_range(), b in arb_range()) {
        let task_a = task_at(a.0, Some(a.1));
        let task_b = task_at(b.0, Some(b.1));
        prop_assert_eq!(
            is_slot_available(a.0, a.1, [&task_b]),
            is_slot_available(b.0, b.1, [&task_a])
        );
    }

    #[test]
    fn point_conflicts_iff_inside_range(point in 0u16..1440, range in arb_range()) {
        let existing = task_at(range.0, Some(range.1));
        let inside = (range.0..range.1).contains(&point);
        prop_assert_eq!(
            is_slot_available(point, point + DEFAULT_TASK_MINUTES, [&existing]),
            !inside
        );
    }

    #[test]
    fn free_slots_avoid_timed_tasks(tasks in prop::collection::vec(arb_timed_task(), 0..8)) {
        let slots = free_slots(&tasks);

        for (start, end) in &slots {
            prop_assert!(start < end);
        }
        for pair in slots.windows(2) {
            prop_assert!(pair[0].1 <= pair[1].0);
        }
        for task in &tasks {
            let (busy_start, busy_end) = task.effective_interval().unwrap();
            let busy_end = busy_end.min(1439);
            for (start, end) in &slots {
                prop_assert!(
                    end.minutes() <= busy_start || start.minutes() >= busy_end,
                    "slot {}-{} overlaps task {:?}", start, end, (busy_start, busy_end)
                );
            }
        }
    }
}
