use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use swap_sync::{
    BarReporter, BlockchainSource, BlocksBack, ExtractorConfig, PostgresSink, RecordSink,
    RpcSource, SwapSync,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "extractor", about = "Extract pool swap events into Postgres")]
struct Args {
    /// How many blocks back from the chain head, or `genesis` for the whole history.
    /// Prompted for when omitted
    #[arg(short, long)]
    blocks_back: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Transport crates are noisy at info
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,alloy_transport_http=off,alloy_transport_ws=off,alloy_pubsub=warn,tokio_postgres=warn")
    });
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = ExtractorConfig::from_env().context("loading configuration")?;

    let blocks_back = match args.blocks_back {
        Some(input) => BlocksBack::parse(&input),
        None => BlocksBack::parse(&prompt("Please enter how many blocks back for swaps: ").await?),
    };

    let mut sources: Vec<Arc<dyn BlockchainSource>> = Vec::with_capacity(config.sources.len());
    for source_config in &config.sources {
        let source = RpcSource::connect(
            source_config,
            config.pool.address,
            config.call_timeout,
            config.max_retries,
        )
        .await
        .with_context(|| format!("connecting to {}", source_config.name))?;
        sources.push(Arc::new(source));
    }

    let sink = Arc::new(
        PostgresSink::connect(&config.database, &config.pool)
            .await
            .context("connecting to the database")?,
    );

    let result = run(&config, sources, sink.clone(), blocks_back).await;

    // release the connection whatever happened
    match Arc::try_unwrap(sink) {
        Ok(sink) => sink.shutdown().await,
        Err(_) => error!("Database connection still in use at shutdown"),
    }
    result
}

async fn run(
    config: &ExtractorConfig,
    sources: Vec<Arc<dyn BlockchainSource>>,
    sink: Arc<PostgresSink>,
    blocks_back: BlocksBack,
) -> Result<()> {
    sink.ensure_schema().await.context("creating the swap table")?;

    let sync = SwapSync::builder()
        .add_sources(sources)
        .sink(sink)
        .pool(config.pool.clone())
        .progress(Arc::new(BarReporter::new(config.memory_threshold)))
        .build()?;

    let stats = sync.run(blocks_back).await?;
    info!(
        latest_block = stats.latest_block,
        blocks_back = stats.blocks_back,
        events = stats.events_processed,
        persisted = stats.records_persisted,
        conversion_failures = stats.conversion_failures,
        write_failures = stats.write_failures,
        chunks = stats.chunks_processed,
        elapsed = ?stats.elapsed,
        "Extraction finished"
    );
    if !stats.failed_sources.is_empty() {
        error!(failed = ?stats.failed_sources, "Some sources did not finish");
    }
    Ok(())
}

async fn prompt(question: &str) -> Result<String> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(question.as_bytes()).await?;
    stdout.flush().await?;

    let mut answer = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut answer)
        .await
        .context("reading blocks back")?;
    Ok(answer)
}
