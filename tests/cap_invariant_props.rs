// Property tests for the per-user cap.
//
// A simple model (running total per user) decides what every submission
// should yield; the coordinator must agree with it and the store must end up
// holding exactly the accepted rows.

use std::collections::HashMap;
use std::sync::Arc;

use bounded_ledger::{
    DEFAULT_AMOUNT_LIMIT, InMemoryLedgerStore, Outcome, TransactionRequest, WriteCoordinator,
};
use proptest::prelude::*;

fn arb_submissions(max_len: usize) -> impl Strategy<Value = Vec<(i64, i64)>> {
    prop::collection::vec((0i64..3, -300i64..700), 1..max_len)
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("tokio runtime")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: committed totals never exceed the cap and equal the sum of
    /// accepted amounts.
    #[test]
    fn prop_committed_total_matches_model(submissions in arb_submissions(60)) {
        runtime().block_on(async {
            let store = InMemoryLedgerStore::new();
            let coordinator = WriteCoordinator::new(Arc::new(store.clone()));
            let mut model: HashMap<i64, i64> = HashMap::new();

            for (user_id, amount) in submissions {
                let total = model.entry(user_id).or_insert(0);
                let expect_created = *total + amount <= DEFAULT_AMOUNT_LIMIT;

                let outcome = coordinator
                    .submit(TransactionRequest {
                        user_id,
                        amount,
                        description: String::new(),
                    })
                    .await;

                match outcome {
                    Outcome::Created => {
                        assert!(expect_created, "accepted {amount} on top of {total}");
                        *total += amount;
                    }
                    Outcome::CapExceeded { cap } => {
                        assert!(!expect_created, "rejected {amount} on top of {total}");
                        assert_eq!(cap, DEFAULT_AMOUNT_LIMIT);
                    }
                    other => panic!("unexpected outcome {other:?}"),
                }
            }

            for user_id in 0..3 {
                let committed = store.committed_total(user_id).await;
                assert!(committed <= DEFAULT_AMOUNT_LIMIT);
                assert_eq!(committed, model.get(&user_id).copied().unwrap_or(0));
            }
        });
    }

    /// Property: an over-cap request never mutates state, however often it is
    /// resubmitted.
    #[test]
    fn prop_rejection_is_idempotent(prior in 0i64..=1000, excess in 1i64..500, repeats in 1usize..8) {
        runtime().block_on(async {
            let store = InMemoryLedgerStore::new();
            let coordinator = WriteCoordinator::new(Arc::new(store.clone()));

            let seeded = coordinator
                .submit(TransactionRequest {
                    user_id: 1,
                    amount: prior,
                    description: "prior".to_string(),
                })
                .await;
            assert!(seeded.is_created());

            let over_cap = TransactionRequest {
                user_id: 1,
                amount: DEFAULT_AMOUNT_LIMIT - prior + excess,
                description: "over".to_string(),
            };
            for _ in 0..repeats {
                assert!(coordinator.submit(over_cap.clone()).await.is_cap_exceeded());
            }

            assert_eq!(store.entries_for(1).await.len(), 1);
            assert_eq!(store.committed_total(1).await, prior);
        });
    }
}
