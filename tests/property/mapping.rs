//! Property-based tests for the document mapping and wire decoding.
//!
//! 1. Any valid `Task` survives `task_to_document` -> `task_from_document`.
//! 2. `isCompleted` always agrees with `status` on written documents.
//! 3. Random bytes never panic the wire decoders.
//! 4. Session codes parse case- and whitespace-insensitively.

use pairplan_proto::mapping::{task_from_document, task_to_document};
use pairplan_proto::session::SessionCode;
use pairplan_proto::task::{
    ChecklistItem, ClockTime, Task, TaskId, TaskStatus, TaskType, Weekday,
};
use pairplan_proto::value::FieldValue;
use pairplan_proto::wire;
use proptest::prelude::*;

// --- Strategies ---

fn arb_clock_time() -> impl Strategy<Value = ClockTime> {
    (0u16..1440).prop_filter_map("in range", ClockTime::from_minutes)
}

fn arb_weekday() -> impl Strategy<Value = Weekday> {
    prop::sample::select(Weekday::ALL.to_vec())
}

fn arb_task_type() -> impl Strategy<Value = TaskType> {
    prop::sample::select(TaskType::ALL.to_vec())
}

fn arb_status() -> impl Strategy<Value = TaskStatus> {
    prop_oneof![
        Just(TaskStatus::Normal),
        Just(TaskStatus::Snoozed),
        Just(TaskStatus::Cancelled),
        Just(TaskStatus::Done),
    ]
}

fn arb_checklist_item() -> impl Strategy<Value = ChecklistItem> {
    ("[a-z0-9]{1,12}", ".{0,40}", any::<bool>()).prop_map(|(id, text, is_completed)| {
        ChecklistItem {
            id,
            text,
            is_completed,
        }
    })
}

prop_compose! {
    fn arb_task()(
        id in "[a-f0-9-]{8,36}",
        title in "[^\\s][^\\x00]{0,60}",
        task_type in arb_task_type(),
        owner_id in "[A-Za-z0-9-]{1,36}",
        weekday in arb_weekday(),
        time in prop::option::of(arb_clock_time()),
        end_time in prop::option::of(arb_clock_time()),
        status in arb_status(),
        description in prop::option::of(".{0,80}"),
        checklist in prop::collection::vec(arb_checklist_item(), 0..5),
        timestamp in 0i64..4_000_000_000_000,
    ) -> Task {
        Task {
            id: TaskId::from_string(id),
            title,
            task_type,
            owner_id,
            weekday,
            time,
            end_time,
            status,
            description,
            checklist,
            timestamp,
        }
    }
}

// --- Properties ---

proptest! {
    #[test]
    fn task_survives_document_round_trip(task in arb_task()) {
        let decoded = task_from_document(&task_to_document(&task)).unwrap();
        prop_assert_eq!(decoded, task);
    }

    #[test]
    fn completion_flag_matches_status(task in arb_task()) {
        let doc = task_to_document(&task);
        prop_assert_eq!(
            doc.get("isCompleted"),
            Some(&FieldValue::Bool(task.status == TaskStatus::Done))
        );
    }

    #[test]
    fn random_bytes_never_panic_decoders(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = wire::decode_client(&bytes);
        let _ = wire::decode_server(&bytes);
    }

    #[test]
    fn codes_are_case_and_whitespace_insensitive(
        raw in "[A-Z0-9]{6}",
        pad_left in " {0,3}",
        pad_right in "[ \\t]{0,3}",
    ) {
        let messy = format!("{pad_left}{}{pad_right}", raw.to_ascii_lowercase());
        let code = SessionCode::parse(&messy).unwrap();
        prop_assert_eq!(code.as_str(), raw.as_str());
    }
}
