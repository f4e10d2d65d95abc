use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use log::info;

use volume_overlay::{AppContext, CaseConfig, server};

/// Serve MRI volumes with selectable segmentation overlays.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// JSON case manifest. Without one the default case layout is used.
    #[arg(long)]
    case: Option<PathBuf>,
    /// Overrides the manifest's data directory.
    #[arg(long)]
    data_dir: Option<PathBuf>,
    #[arg(long, default_value = "127.0.0.1")]
    host: String,
    #[arg(long, default_value_t = 8000)]
    port: u16,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let mut config = match &cli.case {
        Some(path) => CaseConfig::from_json_file(path)?,
        None => CaseConfig::default(),
    };
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }

    let context = AppContext::load(&config)
        .with_context(|| format!("failed to prepare case in {}", config.data_dir.display()))?;
    info!(
        "prepared {} volume(s) and {} overlay option(s) on a {:?} grid",
        context.volumes().len(),
        context.overlays().len(),
        context.reference().dim()
    );

    let addr = format!("{}:{}", cli.host, cli.port);
    server::serve(Arc::new(context), &addr)
        .await
        .with_context(|| format!("failed to serve on {addr}"))
}
