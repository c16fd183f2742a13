//! Property-based tests for the mutation queue

use proptest::prelude::*;
use serde_json::json;
use taskapp_sync::local_db::LocalDatabase;
use taskapp_sync::shared::config::CURRENT_SCHEMA_VERSION;
use taskapp_sync::shared::{ActionKind, EntityKind, NewAction};

fn action_for(kind: ActionKind, entity: u8) -> NewAction {
    let id = format!("srv-{}", entity);
    match kind {
        ActionKind::Create => NewAction::create(EntityKind::Task, json!({ "id": id, "name": "t" })),
        ActionKind::Update => NewAction::update(EntityKind::Task, &id, json!({ "completed": true })),
        ActionKind::Delete => NewAction::delete(EntityKind::Task, &id),
    }
}

fn any_kind() -> impl Strategy<Value = ActionKind> {
    prop_oneof![
        Just(ActionKind::Create),
        Just(ActionKind::Update),
        Just(ActionKind::Delete),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn test_snapshot_preserves_enqueue_order(
        ops in prop::collection::vec((any_kind(), 0u8..4), 1..24),
        removed in prop::collection::vec(any::<prop::sample::Index>(), 0..6),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let dir = tempfile::tempdir().unwrap();
            let db = LocalDatabase::open(dir.path().join("local.db"), CURRENT_SCHEMA_VERSION)
                .await
                .unwrap();

            let mut enqueued = Vec::new();
            for (kind, entity) in &ops {
                enqueued.push(db.enqueue(action_for(*kind, *entity)).await.unwrap());
            }

            // Keys strictly increase in enqueue order
            prop_assert!(enqueued.windows(2).all(|pair| pair[0].id < pair[1].id));

            for index in &removed {
                if enqueued.is_empty() {
                    break;
                }
                let victim = index.get(&enqueued).id;
                db.remove_action(victim).await.unwrap();
                enqueued.retain(|action| action.id != victim);
            }

            let snapshot = db.drain_queue_snapshot().await.unwrap();
            prop_assert_eq!(snapshot, enqueued);
            Ok(())
        })?;
    }
}
