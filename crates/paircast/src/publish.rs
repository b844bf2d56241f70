//! Publish phase: one send, then durable recording.
//!
//! The send happens exactly once per invocation. Only the recording step is
//! retried, and every attempt resubmits the same record with the same
//! receipt; minting a new receipt would mean posting again. When recording
//! exhausts its budget the receipt is abandoned with the failure, and any
//! fresh send is the next cycle's deliberate decision.

use tracing::{info, warn};

use crate::backoff::Backoff;
use crate::endpoint::PostingEndpoint;
use crate::error::{PublishError, PublishResult};
use crate::store::PostStore;
use crate::types::{Draft, PostReceipt, PostRecord, RecordId};

/// A completed publish: the live post and its durable record.
#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    pub receipt: PostReceipt,
    pub record_id: RecordId,
}

/// Send the draft once, then record it with bounded retries.
pub async fn publish(
    endpoint: &dyn PostingEndpoint,
    store: &dyn PostStore,
    draft: &Draft,
    retry: &Backoff,
) -> PublishResult<Published> {
    // Step A: a failure here means nothing was posted, so recording would
    // have nothing to point at. Fatal for this invocation, never looped.
    let receipt = match endpoint.send(&draft.pair, &draft.text).await {
        Ok(receipt) => receipt,
        Err(e) => return Err(PublishError::send(&draft.pair.symbol, format!("{e:#}"))),
    };
    info!(pair = %draft.pair, receipt = %receipt, "update posted, recording");

    // Step B: the record is built once and resubmitted unchanged on every
    // attempt.
    let record = PostRecord::new(draft, receipt.clone());
    let mut attempt: u32 = 1;
    loop {
        match store.record(&record).await {
            Ok(record_id) => {
                info!(pair = %draft.pair, record_id = %record_id, attempt, "post recorded");
                return Ok(Published { receipt, record_id });
            }
            Err(e) => {
                let detail = format!("{e:#}");
                warn!(
                    attempt,
                    limit = retry.limit(),
                    pair = %draft.pair,
                    error = %detail,
                    "Record attempt failed"
                );
                attempt += 1;
                if !retry.allows(attempt) {
                    return Err(PublishError::record(
                        &draft.pair.symbol,
                        receipt.to_string(),
                        detail,
                    ));
                }
                retry.wait().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::MockPostingEndpoint;
    use crate::store::MockPostStore;
    use crate::types::Pair;

    fn draft() -> Draft {
        Draft::new(Pair::new("A", 1.0, &["venue"]), "msg")
    }

    fn sending_endpoint(receipt: &'static str) -> MockPostingEndpoint {
        let mut endpoint = MockPostingEndpoint::new();
        endpoint
            .expect_send()
            .times(1)
            .returning(move |_, _| Ok(PostReceipt(receipt.into())));
        endpoint
    }

    #[tokio::test]
    async fn test_record_retries_reuse_the_same_receipt() {
        let endpoint = sending_endpoint("tid1");

        // Fails twice, then succeeds: three record calls, one send, and the
        // identical (pair, receipt, body) triple every time.
        let matches_record =
            |r: &PostRecord| r.pair == "A" && r.receipt == PostReceipt("tid1".into()) && r.body == "msg";
        let mut store = MockPostStore::new();
        store
            .expect_record()
            .withf(matches_record)
            .times(2)
            .returning(|_| Err(anyhow::anyhow!("store busy")));
        store
            .expect_record()
            .withf(matches_record)
            .times(1)
            .returning(|_| Ok(RecordId("rid1".into())));

        let published = publish(&endpoint, &store, &draft(), &Backoff::new(3, 0))
            .await
            .unwrap();

        assert_eq!(published.receipt, PostReceipt("tid1".into()));
        assert_eq!(published.record_id, RecordId("rid1".into()));
    }

    #[tokio::test]
    async fn test_send_failure_never_reaches_the_store() {
        let mut endpoint = MockPostingEndpoint::new();
        endpoint
            .expect_send()
            .times(1)
            .returning(|_, _| Err(anyhow::anyhow!("503 from endpoint")));

        let mut store = MockPostStore::new();
        store.expect_record().times(0);

        let err = publish(&endpoint, &store, &draft(), &Backoff::new(3, 0))
            .await
            .unwrap_err();

        match err {
            PublishError::SendFailure { pair, detail } => {
                assert_eq!(pair, "A");
                assert!(detail.contains("503"));
            }
            other => panic!("expected SendFailure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_exhaustion_reports_the_abandoned_receipt() {
        let endpoint = sending_endpoint("tid9");

        let mut store = MockPostStore::new();
        store
            .expect_record()
            .times(2)
            .returning(|_| Err(anyhow::anyhow!("disk full")));

        let err = publish(&endpoint, &store, &draft(), &Backoff::new(2, 0))
            .await
            .unwrap_err();

        match err {
            PublishError::RecordFailure { receipt, detail, .. } => {
                assert_eq!(receipt, "tid9");
                assert!(detail.contains("disk full"));
            }
            other => panic!("expected RecordFailure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_zero_limit_retries_until_the_store_recovers() {
        let endpoint = sending_endpoint("tid3");

        let mut store = MockPostStore::new();
        store
            .expect_record()
            .times(7)
            .returning(|_| Err(anyhow::anyhow!("still starting")));
        store
            .expect_record()
            .times(1)
            .returning(|_| Ok(RecordId("rid3".into())));

        let published = publish(&endpoint, &store, &draft(), &Backoff::new(0, 0))
            .await
            .unwrap();

        assert_eq!(published.record_id, RecordId("rid3".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempts_are_spaced_by_the_interval() {
        let endpoint = sending_endpoint("tid5");

        let mut store = MockPostStore::new();
        store
            .expect_record()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("busy")));
        store
            .expect_record()
            .times(1)
            .returning(|_| Ok(RecordId("rid5".into())));

        let before = tokio::time::Instant::now();
        publish(&endpoint, &store, &draft(), &Backoff::new(3, 5))
            .await
            .unwrap();

        // One failed attempt, one sleep, one success.
        assert_eq!(
            tokio::time::Instant::now() - before,
            std::time::Duration::from_secs(5)
        );
    }
}
