use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use serde_json::json;
use typed_firestore::firestore::{
    Firestore, FirestoreErrorCode, RetrySettings, SetOptions, TransactionOptions,
};

fn fast_options(max_attempts: u32) -> TransactionOptions {
    TransactionOptions::default()
        .with_max_attempts(max_attempts)
        .with_retry(RetrySettings::immediate())
}

#[tokio::test]
async fn transfers_between_documents() {
    let firestore = Firestore::in_memory("transactions");
    let from = firestore.doc("accounts/a").unwrap();
    let to = firestore.doc("accounts/b").unwrap();
    from.set(&json!({"balance": 100}), true, SetOptions::Overwrite)
        .await
        .unwrap();
    to.set(&json!({"balance": 0}), true, SetOptions::Overwrite)
        .await
        .unwrap();

    let (source, target) = (from.clone(), to.clone());
    let moved = firestore
        .run_transaction(move |tx| {
            let (source, target) = (source.clone(), target.clone());
            async move {
                let available: i64 = tx.get(&source).await?.get("balance")?.unwrap_or_default();
                let received: i64 = tx.get(&target).await?.get("balance")?.unwrap_or_default();
                let amount = available.min(30);
                tx.update(&source, &json!({"balance": available - amount}), true)?;
                tx.update(&target, &json!({"balance": received + amount}), true)?;
                Ok(amount)
            }
        })
        .await
        .unwrap();

    assert_eq!(moved, 30);
    assert_eq!(from.get().await.unwrap().get::<i64>("balance").unwrap(), Some(70));
    assert_eq!(to.get().await.unwrap().get::<i64>("balance").unwrap(), Some(30));
}

#[tokio::test]
async fn contention_is_retried_with_fresh_reads() {
    let firestore = Firestore::in_memory("transactions");
    let counter = firestore.doc("counters/visits").unwrap();
    counter
        .set(&json!({"n": 0}), true, SetOptions::Overwrite)
        .await
        .unwrap();

    let attempts = Arc::new(AtomicU32::new(0));
    let (doc, seen) = (counter.clone(), attempts.clone());
    firestore
        .run_transaction_with_options(fast_options(3), move |tx| {
            let (doc, seen) = (doc.clone(), seen.clone());
            async move {
                let n: i64 = tx.get(&doc).await?.get("n")?.unwrap_or_default();
                if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                    doc.update(&json!({"n": 10}), true).await?;
                }
                tx.set(&doc, &json!({"n": n + 1}), true, SetOptions::Overwrite)?;
                Ok(())
            }
        })
        .await
        .unwrap();

    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_eq!(counter.get().await.unwrap().get::<i64>("n").unwrap(), Some(11));
}

#[tokio::test]
async fn persistent_contention_exhausts_the_attempts() {
    let firestore = Firestore::in_memory("transactions");
    let counter = firestore.doc("counters/visits").unwrap();
    counter
        .set(&json!({"n": 0}), true, SetOptions::Overwrite)
        .await
        .unwrap();

    let attempts = Arc::new(AtomicU32::new(0));
    let (doc, seen) = (counter.clone(), attempts.clone());
    let err = firestore
        .run_transaction_with_options(fast_options(3), move |tx| {
            let (doc, seen) = (doc.clone(), seen.clone());
            async move {
                let n: i64 = tx.get(&doc).await?.get("n")?.unwrap_or_default();
                seen.fetch_add(1, Ordering::SeqCst);
                doc.update(&json!({"n": n + 100}), true).await?;
                tx.set(&doc, &json!({"n": n + 1}), true, SetOptions::Overwrite)?;
                Ok(())
            }
        })
        .await
        .unwrap_err();

    assert_eq!(err.code, FirestoreErrorCode::FailedPrecondition);
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn body_errors_abort_without_writing() {
    let firestore = Firestore::in_memory("transactions");
    let doc = firestore.doc("accounts/a").unwrap();
    let target = doc.clone();
    let err = firestore
        .run_transaction(move |tx| {
            let doc = target.clone();
            async move {
                tx.set(&doc, &json!({"balance": 1}), true, SetOptions::Overwrite)?;
                Err::<(), _>(typed_firestore::firestore::error::invalid_argument("insufficient funds"))
            }
        })
        .await
        .unwrap_err();
    assert_eq!(err.code, FirestoreErrorCode::InvalidArgument);
    assert!(!doc.get().await.unwrap().exists());
}
