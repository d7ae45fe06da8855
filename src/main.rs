use std::sync::Arc;

use anyhow::Context;
use program_activity_tracker::{
    adapters::{
        attributors::{MarketplaceAttributor, PlaceholderAttributor},
        reports::{JsonReport, TableReport},
        FixtureTransportAdaptor, HttpTransportAdaptor,
    },
    application::{
        ActivityPipeline, Cutoff, PipelineOptions, ProjectAttributor, ReportEmitter, RpcClient,
        RpcTransport, SignatureFetcher, TransactionResolver,
    },
    infrastructure::{logging, AppConfig, AttributionKind, ReportFormat, TransportKind},
};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    logging::init()?;

    let config = AppConfig::from_env().context("failed to load configuration")?;

    tracing::info!("Initializing Program Activity Tracker");

    // Cancellation: Ctrl-C and the optional run deadline
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, finishing with a partial report");
                cancel.cancel();
            }
        });
    }
    if let Some(deadline) = config.run_timeout {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            tracing::warn!(?deadline, "Run deadline reached, finishing with a partial report");
            cancel.cancel();
        });
    }

    // Dependency Injection - Transport
    let transport: Arc<dyn RpcTransport> = match config.transport {
        TransportKind::Http => Arc::new(HttpTransportAdaptor::new(&config.rpc_url)?),
        TransportKind::Fixture => {
            let path = config
                .fixture_path
                .as_ref()
                .context("FIXTURE_PATH is required when TRANSPORT=fixture")?;
            Arc::new(FixtureTransportAdaptor::from_file(path).await?)
        }
    };

    let client = RpcClient::new(transport)
        .with_retry_policy(config.retry_policy())
        .with_request_timeout(config.request_timeout)
        .with_cancellation(cancel);

    // Dependency Injection - Attribution
    let attributor: Arc<dyn ProjectAttributor> = match config.attribution {
        AttributionKind::Placeholder => Arc::new(PlaceholderAttributor::default()),
        AttributionKind::Marketplace => Arc::new(MarketplaceAttributor::new(
            config.program_id.clone(),
            MarketplaceAttributor::magic_eden_v2_rules(),
            config.amount_mode,
        )),
    };

    let fetcher = SignatureFetcher::new(client.clone()).with_method(config.signatures_method.clone());
    let resolver = Arc::new(
        TransactionResolver::new(client, attributor).with_method(config.transaction_method.clone()),
    );

    let fetch = config.fetch_options_at(chrono::Utc::now())?;
    if let Some(Cutoff::Timestamp(since)) = &fetch.until {
        tracing::info!(%since, "Looking back {} minutes", config.lookback_minutes);
    }

    let pipeline = ActivityPipeline::new(
        fetcher,
        resolver,
        PipelineOptions {
            fetch,
            concurrency: config.concurrency,
            top_n: config.top_n,
        },
    );

    let report = pipeline
        .run(&config.program_id)
        .await
        .with_context(|| format!("failed to fetch signatures for {}", config.program_id))?;

    let emitter: Box<dyn ReportEmitter> = match config.report_format {
        ReportFormat::Table => Box::new(TableReport::new()),
        ReportFormat::Json => Box::new(JsonReport::new()),
    };
    println!("{}", emitter.render(&report));

    Ok(())
}
