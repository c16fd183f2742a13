//! Property-based tests for task records and id handling

use proptest::prelude::*;
use taskapp_sync::offline::reconciliation::server_id_from_body;
use taskapp_sync::shared::task::{is_temp_id, new_temp_id};
use taskapp_sync::shared::{TaskFields, TaskPatch};

proptest! {
    #[test]
    fn test_temp_ids_never_collide(_ in 0..100u32) {
        let a = new_temp_id();
        let b = new_temp_id();
        prop_assert!(is_temp_id(&a));
        prop_assert_ne!(a, b);
    }

    #[test]
    fn test_patch_is_idempotent(
        name in ".*",
        new_name in proptest::option::of(".*"),
        completed in proptest::option::of(any::<bool>()),
        tags in proptest::option::of(prop::collection::vec("[a-z]{1,8}", 0..4)),
    ) {
        let patch = TaskPatch {
            name: new_name,
            completed,
            tags,
            ..TaskPatch::default()
        };

        let mut once = TaskFields::named(name);
        once.apply(&patch);
        let mut twice = once.clone();
        twice.apply(&patch);

        prop_assert_eq!(once, twice);
    }

    #[test]
    fn test_server_id_read_from_record_or_list(id in "[A-Za-z0-9_-]{1,24}") {
        let record = serde_json::json!({ "id": id });
        let list = serde_json::json!([{ "id": id }, { "id": "other" }]);

        prop_assert_eq!(server_id_from_body(record.to_string().as_bytes()), Some(id.clone()));
        prop_assert_eq!(server_id_from_body(list.to_string().as_bytes()), Some(id));
    }
}
