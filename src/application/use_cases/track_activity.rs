use std::{collections::BTreeMap, sync::Arc};

use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;

use super::{FetchOptions, SignatureFetcher, TransactionResolver};
use crate::{
    application::{AppError, AppResult},
    domain::{ItemFailure, ProjectAggregate, ProjectContribution, RunReport},
};

pub const DEFAULT_CONCURRENCY: usize = 16;
pub const DEFAULT_TOP_N: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    pub fetch: FetchOptions,
    /// Resolve requests in flight at once.
    pub concurrency: usize,
    pub top_n: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            fetch: FetchOptions::default(),
            concurrency: DEFAULT_CONCURRENCY,
            top_n: DEFAULT_TOP_N,
        }
    }
}

const LOST_WORKER_REASON: &str = "resolver task panicked";

type Outcome = (usize, String, AppResult<Option<ProjectContribution>>);

/// Fetch signatures once, resolve them on a bounded pool, aggregate on a single writer.
pub struct ActivityPipeline {
    fetcher: SignatureFetcher,
    resolver: Arc<TransactionResolver>,
    options: PipelineOptions,
    cancel: CancellationToken,
}

impl ActivityPipeline {
    /// The pipeline observes the same cancellation token as the resolver's client.
    pub fn new(
        fetcher: SignatureFetcher,
        resolver: Arc<TransactionResolver>,
        options: PipelineOptions,
    ) -> Self {
        let cancel = resolver.client().cancellation_token().clone();
        Self {
            fetcher,
            resolver,
            options,
            cancel,
        }
    }

    /// Fetch-phase failures abort the run. Resolve-phase failures are recorded
    /// per signature in the report.
    pub async fn run(&self, program_id: &str) -> AppResult<RunReport> {
        tracing::info!(program_id, "Fetching signatures");
        let signatures: Vec<String> = self
            .fetcher
            .fetch_signatures(program_id, &self.options.fetch)
            .await?
            .into_iter()
            .map(|info| info.signature)
            .collect();

        tracing::info!(
            count = signatures.len(),
            concurrency = self.options.concurrency,
            attributor = self.resolver.attributor_name(),
            "Resolving transactions"
        );
        Ok(self.resolve_all(signatures).await)
    }

    /// Resolves every signature and aggregates in signature order, so the
    /// ranking does not depend on which request finishes first.
    pub async fn resolve_all(&self, signatures: Vec<String>) -> RunReport {
        let mut summary = RunSummary::new(signatures.len());
        let concurrency = self.options.concurrency.max(1);
        let (tx, mut rx) = mpsc::channel::<Outcome>(concurrency * 2);
        let expected = signatures.clone();

        // Producer loop
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let resolver = self.resolver.clone();
        let cancel = self.cancel.clone();
        let producer = tokio::spawn(async move {
            for (index, signature) in signatures.into_iter().enumerate() {
                let permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    permit = semaphore.clone().acquire_owned() => permit.ok(),
                };
                let Some(permit) = permit else {
                    if tx.send((index, signature, Err(AppError::Cancelled))).await.is_err() {
                        break;
                    }
                    continue;
                };

                let resolver = resolver.clone();
                let tx = tx.clone();
                tokio::spawn(async move {
                    let outcome = resolver.resolve(&signature).await;
                    drop(permit);
                    let _ = tx.send((index, signature, outcome)).await;
                });
            }
        });

        // Consumer loop: the only writer of the aggregate.
        let mut pending = BTreeMap::new();
        let mut next = 0usize;
        while let Some((index, signature, outcome)) = rx.recv().await {
            pending.insert(index, (signature, outcome));
            while let Some((signature, outcome)) = pending.remove(&next) {
                summary.record(signature, outcome);
                next += 1;
            }
        }

        if let Err(err) = producer.await {
            tracing::error!(error = %err, "Signature producer task failed");
        }
        // A worker that panicked never reports; its signature still gets an entry.
        for (index, signature) in expected.into_iter().enumerate().skip(next) {
            match pending.remove(&index) {
                Some((signature, outcome)) => summary.record(signature, outcome),
                None => summary.record_lost(signature),
            }
        }

        let report = summary.finish(self.options.top_n, self.cancel.is_cancelled());
        tracing::info!(
            resolved = report.resolved,
            unattributed = report.unattributed,
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            projects = report.aggregate.len(),
            cancelled = report.cancelled,
            "Run finished"
        );
        report
    }
}

struct RunSummary {
    aggregate: ProjectAggregate,
    signatures_fetched: usize,
    resolved: usize,
    unattributed: usize,
    skipped: Vec<ItemFailure>,
    failed: Vec<ItemFailure>,
}

impl RunSummary {
    fn new(signatures_fetched: usize) -> Self {
        Self {
            aggregate: ProjectAggregate::new(),
            signatures_fetched,
            resolved: 0,
            unattributed: 0,
            skipped: Vec::new(),
            failed: Vec::new(),
        }
    }

    fn record(&mut self, signature: String, outcome: AppResult<Option<ProjectContribution>>) {
        match outcome {
            Ok(Some(contribution)) => {
                self.resolved += 1;
                self.aggregate.accumulate(&contribution);
            }
            Ok(None) => {
                self.resolved += 1;
                self.unattributed += 1;
            }
            Err(err @ AppError::NotFound(_)) => {
                tracing::warn!(%signature, "Skipping transaction that no longer resolves");
                self.skipped.push(ItemFailure {
                    signature,
                    reason: err.to_string(),
                });
            }
            Err(err) => {
                if err != AppError::Cancelled {
                    tracing::warn!(%signature, error = %err, "Failed to resolve transaction");
                }
                self.failed.push(ItemFailure {
                    signature,
                    reason: err.to_string(),
                });
            }
        }
    }

    fn record_lost(&mut self, signature: String) {
        tracing::error!(%signature, "Resolver task ended without reporting");
        self.failed.push(ItemFailure {
            signature,
            reason: LOST_WORKER_REASON.to_string(),
        });
    }

    fn finish(self, top_n: usize, cancelled: bool) -> RunReport {
        RunReport {
            aggregate: self.aggregate,
            top_n,
            signatures_fetched: self.signatures_fetched,
            resolved: self.resolved,
            unattributed: self.unattributed,
            skipped: self.skipped,
            failed: self.failed,
            cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{attributors::PlaceholderAttributor, FixtureReply, FixtureTransportAdaptor};
    use crate::application::{
        ProjectAttributor, RetryPolicy, RpcClient, DEFAULT_SIGNATURES_METHOD,
        DEFAULT_TRANSACTION_METHOD,
    };
    use serde_json::{json, Value};
    use std::time::Duration;

    /// Attributes by the `projectId`/`amount` fields planted in fixture transactions.
    struct TaggedAttributor;

    impl ProjectAttributor for TaggedAttributor {
        fn attribute(&self, transaction: &Value) -> Option<ProjectContribution> {
            let project_id = transaction["projectId"].as_str()?;
            let amount = transaction["amount"].as_f64().unwrap_or(1.0);
            Some(ProjectContribution::new(project_id, amount))
        }

        fn name(&self) -> &str {
            "TaggedAttributor"
        }
    }

    fn tagged(project_id: &str, amount: f64) -> Value {
        json!({"projectId": project_id, "amount": amount})
    }

    fn pipeline(
        transport: Arc<FixtureTransportAdaptor>,
        attributor: Arc<dyn ProjectAttributor>,
        concurrency: usize,
    ) -> ActivityPipeline {
        let client = RpcClient::new(transport).with_retry_policy(RetryPolicy::none());
        let fetcher = SignatureFetcher::new(client.clone());
        let resolver = Arc::new(TransactionResolver::new(client, attributor));
        ActivityPipeline::new(
            fetcher,
            resolver,
            PipelineOptions {
                concurrency,
                ..PipelineOptions::default()
            },
        )
    }

    #[tokio::test]
    async fn aggregates_in_signature_order_regardless_of_concurrency() {
        let mut transport = FixtureTransportAdaptor::new();
        let mut signatures = Vec::new();
        for n in 0..40 {
            let signature = format!("sig{n}");
            // every project totals 4, so ranking is decided purely by first sighting
            let project = format!("P{}", n % 10);
            transport = transport.with_result(DEFAULT_TRANSACTION_METHOD, &signature, tagged(&project, 1.0));
            signatures.push(signature);
        }
        let transport = Arc::new(transport);

        for concurrency in [1, 4, 32] {
            let report = pipeline(transport.clone(), Arc::new(TaggedAttributor), concurrency)
                .resolve_all(signatures.clone())
                .await;

            let ids: Vec<_> = report.top().into_iter().map(|e| e.project_id).collect();
            assert_eq!(
                ids,
                (0..10).map(|n| format!("P{n}")).collect::<Vec<_>>(),
                "concurrency {concurrency}"
            );
            assert_eq!(report.resolved, 40);
        }
    }

    #[tokio::test]
    async fn unattributed_transactions_are_counted_but_not_aggregated() {
        let transport = Arc::new(
            FixtureTransportAdaptor::new()
                .with_result(DEFAULT_TRANSACTION_METHOD, "sigA", tagged("P1", 2.0))
                .with_result(DEFAULT_TRANSACTION_METHOD, "sigB", json!({"unrelated": true})),
        );
        let report = pipeline(transport, Arc::new(TaggedAttributor), 4)
            .resolve_all(vec!["sigA".to_string(), "sigB".to_string()])
            .await;

        assert_eq!(report.resolved, 2);
        assert_eq!(report.unattributed, 1);
        assert_eq!(report.aggregate.len(), 1);
    }

    #[tokio::test]
    async fn failures_are_reported_per_item() {
        let transport = Arc::new(
            FixtureTransportAdaptor::new()
                .with_result(DEFAULT_TRANSACTION_METHOD, "good", tagged("P1", 1.0))
                .with_result(DEFAULT_TRANSACTION_METHOD, "gone", Value::Null)
                .with_error(DEFAULT_TRANSACTION_METHOD, "bad", -32602, "Invalid param"),
        );
        let report = pipeline(transport, Arc::new(TaggedAttributor), 2)
            .resolve_all(vec!["good".into(), "gone".into(), "bad".into()])
            .await;

        assert_eq!(report.resolved, 1);
        assert_eq!(report.aggregate.total("P1"), Some(1.0));
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].signature, "gone");
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].signature, "bad");
        assert!(report.failed[0].reason.contains("Invalid param"));
        assert!(!report.cancelled);
    }

    /// Panics on one project, otherwise behaves like `TaggedAttributor`.
    struct PanicsOn(&'static str);

    impl ProjectAttributor for PanicsOn {
        fn attribute(&self, transaction: &Value) -> Option<ProjectContribution> {
            if transaction["projectId"] == self.0 {
                panic!("attributor bug");
            }
            TaggedAttributor.attribute(transaction)
        }

        fn name(&self) -> &str {
            "PanicsOn"
        }
    }

    #[tokio::test]
    async fn panicking_attributor_is_reported_as_a_failed_item() {
        let transport = Arc::new(
            FixtureTransportAdaptor::new()
                .with_result(DEFAULT_TRANSACTION_METHOD, "a", tagged("P1", 1.0))
                .with_result(DEFAULT_TRANSACTION_METHOD, "b", tagged("P2", 1.0))
                .with_result(DEFAULT_TRANSACTION_METHOD, "c", tagged("P3", 1.0)),
        );
        let report = pipeline(transport, Arc::new(PanicsOn("P2")), 2)
            .resolve_all(vec!["a".into(), "b".into(), "c".into()])
            .await;

        assert_eq!(
            report.resolved + report.skipped.len() + report.failed.len(),
            report.signatures_fetched
        );
        assert_eq!(report.resolved, 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].signature, "b");
        assert_eq!(report.failed[0].reason, LOST_WORKER_REASON);
        let ids: Vec<_> = report.top().into_iter().map(|e| e.project_id).collect();
        assert_eq!(ids, vec!["P1", "P3"]);
    }

    #[tokio::test]
    async fn cancellation_returns_a_partial_report() {
        let transport = Arc::new(
            FixtureTransportAdaptor::new()
                .with_result(DEFAULT_TRANSACTION_METHOD, "fast", tagged("P1", 1.0))
                .with_reply(DEFAULT_TRANSACTION_METHOD, "slow", FixtureReply::Hang),
        );
        let pipeline = pipeline(transport, Arc::new(TaggedAttributor), 1);
        let cancel = pipeline.cancel.clone();

        let signatures = vec!["fast".to_string(), "slow".to_string(), "never".to_string()];
        let run = tokio::spawn(async move { pipeline.resolve_all(signatures).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let report = run.await.unwrap();
        assert!(report.cancelled);
        assert_eq!(report.aggregate.total("P1"), Some(1.0));
        let failed: Vec<_> = report.failed.iter().map(|f| f.signature.as_str()).collect();
        assert_eq!(failed, vec!["slow", "never"]);
        assert!(report
            .failed
            .iter()
            .all(|f| f.reason == AppError::Cancelled.to_string()));
    }

    #[tokio::test]
    async fn fetch_failure_aborts_the_run() {
        let transport = Arc::new(FixtureTransportAdaptor::new().with_error(
            DEFAULT_SIGNATURES_METHOD,
            "Prog",
            -32602,
            "Invalid param: WrongSize",
        ));
        let err = pipeline(transport.clone(), Arc::new(PlaceholderAttributor::default()), 4)
            .run("Prog")
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Rpc { .. }));
        assert_eq!(transport.request_count(DEFAULT_TRANSACTION_METHOD).await, 0);
    }
}
