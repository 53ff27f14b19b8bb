mod common;

use common::*;
use delegated_ops::{ExecuteQueuedOptions, OperationFilter, RunState};
use proptest::prelude::*;
use serde_json::json;

fn operator_strategy() -> impl Strategy<Value = &'static str> {
    prop_oneof![
        Just(ECHO),
        Just(FAILING),
        Just(PANICKING),
        Just(VALIDATING),
        Just("@test/unregistered"),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Property: one unlimited pass leaves every queued document terminal
    #[test]
    fn batch_leaves_every_document_terminal(
        operators in prop::collection::vec(operator_strategy(), 0..12)
    ) {
        let (summary, states) = tokio_test::block_on(async {
            let harness = setup();
            for (n, operator) in operators.iter().enumerate() {
                harness
                    .service
                    .queue_operation(*operator, None, context(json!({"n": n})))
                    .await
                    .unwrap();
            }

            let summary = harness
                .service
                .execute_queued_operations(&ExecuteQueuedOptions::default())
                .await
                .unwrap();
            let states: Vec<RunState> = harness
                .service
                .list_operations(&OperationFilter::default(), None)
                .await
                .unwrap()
                .into_iter()
                .map(|doc| doc.run_state)
                .collect();
            (summary, states)
        });

        prop_assert_eq!(summary.processed, operators.len());
        prop_assert_eq!(summary.completed + summary.failed, operators.len());
        prop_assert!(states.iter().all(|state| state.is_terminal()));
    }

    /// Property: a batch never processes more documents than its limit
    #[test]
    fn batch_respects_limit(queued in 0usize..10, limit in 1usize..6) {
        let processed = tokio_test::block_on(async {
            let harness = setup();
            for _ in 0..queued {
                harness.service.queue_operation(ECHO, None, None).await.unwrap();
            }
            harness
                .service
                .execute_queued_operations(&ExecuteQueuedOptions::default().limit(limit))
                .await
                .unwrap()
                .processed
        });

        prop_assert_eq!(processed, queued.min(limit));
    }
}
