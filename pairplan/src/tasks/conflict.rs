//! Time-slot conflict checking and free-slot computation.
//!
//! Times are minutes since midnight; only clock time within a weekday
//! matters. A slot lasting exactly [`DEFAULT_TASK_MINUTES`] is a "point"
//! (a task booked without an explicit end); anything else is a "range".
//! Pairs are compared as follows:
//!
//! | candidate | existing | conflict when                                  |
//! |-----------|----------|------------------------------------------------|
//! | point     | range    | candidate start in `[start, end)` of existing  |
//! | range     | range    | the two intervals overlap                      |
//! | point     | point    | same start                                     |
//! | range     | point    | candidate overlaps `[p, p + 60)` of the point  |
//!
//! Existing tasks are points when they have no stored end time.

use pairplan_proto::task::{ClockTime, DEFAULT_TASK_MINUTES, MINUTES_PER_DAY, Task};

/// Last minute of the day used as the end of the free-slot timeline.
const DAY_END: u16 = MINUTES_PER_DAY - 1;

fn conflicts(new_start: u16, new_end: u16, candidate_is_point: bool, existing: &Task) -> bool {
    let Some((start, end)) = existing.effective_interval() else {
        return false;
    };
    let existing_is_point = existing.end_time.is_none();
    match (candidate_is_point, existing_is_point) {
        (true, false) => (start..end).contains(&new_start),
        (true, true) => new_start == start,
        (false, _) => new_start < end && new_end > start,
    }
}

/// Whether `[new_start, new_end)` can be booked next to `existing`.
///
/// Untimed existing tasks never conflict. An empty or inverted candidate
/// range is never available.
pub fn is_slot_available<'a>(
    new_start: u16,
    new_end: u16,
    existing: impl IntoIterator<Item = &'a Task>,
) -> bool {
    if new_end <= new_start {
        return false;
    }
    let candidate_is_point = new_end - new_start == DEFAULT_TASK_MINUTES;
    !existing
        .into_iter()
        .any(|task| conflicts(new_start, new_end, candidate_is_point, task))
}

/// Checks `candidate` against the tasks on its weekday, ignoring its own
/// previous version. Untimed candidates are always available.
#[must_use]
pub fn slot_available_for(candidate: &Task, existing: &[Task]) -> bool {
    let Some((start, end)) = candidate.effective_interval() else {
        return true;
    };
    is_slot_available(
        start,
        end,
        existing
            .iter()
            .filter(|t| t.weekday == candidate.weekday && t.id != candidate.id),
    )
}

/// Gaps of the day `00:00..23:59` not covered by any timed task.
///
/// Callers pass the tasks of a single weekday. Untimed tasks are ignored;
/// tasks without an end occupy the default duration. Returned slots are
/// sorted, disjoint and non-empty.
pub fn free_slots<'a>(tasks: impl IntoIterator<Item = &'a Task>) -> Vec<(ClockTime, ClockTime)> {
    let mut busy: Vec<(u16, u16)> = tasks
        .into_iter()
        .filter_map(Task::effective_interval)
        .map(|(start, end)| (start, end.min(DAY_END)))
        .filter(|(start, end)| start < end)
        .collect();
    busy.sort_unstable();

    let mut gaps = Vec::new();
    let mut cursor = 0;
    for (start, end) in busy {
        if start > cursor {
            gaps.push((cursor, start));
        }
        cursor = cursor.max(end);
    }
    if cursor < DAY_END {
        gaps.push((cursor, DAY_END));
    }

    gaps.into_iter()
        .filter_map(|(s, e)| Some((ClockTime::from_minutes(s)?, ClockTime::from_minutes(e)?)))
        .collect()
}
