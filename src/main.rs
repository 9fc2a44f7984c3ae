use anyhow::Context;
use clap::Parser;
use docsummarizer::{
    api,
    config::{self, ConfigOverrides},
    extraction::SourceExtractor,
    generation::Ai21ChatClient,
    logging,
    pipeline::PipelineService,
    summarization::{OnnxSeq2Seq, SummarizationEngine, Summarizer},
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

/// HTTP service that summarizes documents with a local model and generates text remotely.
#[derive(Debug, Parser)]
#[command(name = "docsummarizer", version, about)]
struct Cli {
    /// Port to listen on; overrides `SERVER_PORT`.
    #[arg(long)]
    port: Option<u16>,
    /// Exported model directory; overrides `SUMMARIZER_MODEL_DIR`.
    #[arg(long)]
    model_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = config::init_config(&ConfigOverrides {
        server_port: cli.port,
        model_dir: cli.model_dir,
    })?;
    logging::init_tracing(&config.log_file);
    config.log_summary();

    let model_dir = config.summarizer_model_dir.clone();
    let preference = config.summarizer_device;
    let model = tokio::task::spawn_blocking(move || OnnxSeq2Seq::load(&model_dir, preference))
        .await?
        .with_context(|| {
            format!(
                "Failed to load summarization model from {}",
                config.summarizer_model_dir.display()
            )
        })?;
    let summarizer = SummarizationEngine::new(model);
    tracing::info!(device = summarizer.device().as_str(), "Summarization model ready");

    let generator = Ai21ChatClient::from_config(config)?;
    let extractor = SourceExtractor::new(&config.upload_dir).with_context(|| {
        format!(
            "Failed to prepare upload directory {}",
            config.upload_dir.display()
        )
    })?;
    let service =
        PipelineService::from_config(config, extractor, Arc::new(summarizer), Arc::new(generator));
    let app = api::create_router(Arc::new(service));

    let (listener, port) = bind_listener(config.server_port)
        .await
        .context("Failed to bind listener")?;
    tracing::info!("Listening on http://0.0.0.0:{}", port);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn bind_listener(configured: Option<u16>) -> Result<(TcpListener, u16), std::io::Error> {
    use std::net::Ipv4Addr;

    if let Some(port) = configured {
        return TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map(|listener| (listener, port));
    }

    const PORT_RANGE: std::ops::RangeInclusive<u16> = 5000..=5099;
    for port in PORT_RANGE {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => {
                tracing::debug!(port, "Bound server port");
                return Ok((listener, port));
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port already in use; trying next");
                continue;
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        "No available port found in range 5000-5099",
    ))
}
