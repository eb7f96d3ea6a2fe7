//! Run one crop request against a locally started service and print the
//! resulting job record.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use api::{CropService, StatusKind};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "raster-crop", about = "Crop a GeoTIFF in object storage to a bounding box")]
struct Args {
    /// JSON crop request, or `-` for stdin.
    request: PathBuf,

    /// Crop synchronously without creating a job record.
    #[arg(long)]
    now: bool,

    /// Status poll interval in milliseconds.
    #[arg(long, default_value_t = 250)]
    poll_ms: u64,

    /// Give up after this many seconds.
    #[arg(long, default_value_t = 300)]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let payload = read_request(&args.request)?;

    let service = CropService::from_env()
        .await
        .context("failed to start crop service")?;
    let outcome = run(&service, &args, &payload).await;
    service.shutdown().await;
    outcome
}

async fn run(service: &CropService, args: &Args, payload: &str) -> anyhow::Result<()> {
    if args.now {
        let request = api::CropRequest::from_json(payload)?;
        let result = service.crop_now(&request).await?;
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    let id = service.submit_json(payload).await?.to_string();
    tracing::info!(job_id = %id, "Submitted");

    let poll = Duration::from_millis(args.poll_ms.max(10));
    let update = tokio::time::timeout(Duration::from_secs(args.timeout_secs), async {
        loop {
            let update = service.status(&id).await?;
            if update.status.is_terminal() {
                return Ok::<_, api::ServiceError>(update);
            }
            tracing::debug!(job_id = %id, status = %update.status, progress = update.progress, "Polling");
            tokio::time::sleep(poll).await;
        }
    })
    .await
    .with_context(|| format!("job {id} did not finish within {}s", args.timeout_secs))??;

    let resource = service.job(&id).await?;
    println!("{}", serde_json::to_string_pretty(&resource)?);

    if update.status == StatusKind::Fail {
        bail!(
            "job {id} failed: {}",
            resource.error_message.unwrap_or_default()
        );
    }
    Ok(())
}

fn read_request(path: &Path) -> anyhow::Result<String> {
    if path.as_os_str() == "-" {
        return std::io::read_to_string(std::io::stdin()).context("failed to read stdin");
    }
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}
