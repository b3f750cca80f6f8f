//! sanus CLI: runs the entry/alert pipeline on a hygiene monitoring node.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use sanus_node::annunciator::{Annunciator, AplayAnnunciator, SilentAnnunciator};
use sanus_node::clock::Clock;
use sanus_node::config::Config;
use sanus_node::engine::{Collaborators, Pipeline};
use sanus_node::forwarder::http::HttpEventSink;
use sanus_node::model::CaptureEvent;
use sanus_node::notify::{StaffNotifier, WebhookNotifier};
use sanus_node::profile::ProfileDirectory;
use sanus_node::recognition::HttpRecognitionClient;
use sanus_node::telemetry::{TelemetryConfig, init_telemetry};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "sanus", about = "Hand-hygiene monitoring node")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the pipeline. Reads one captured image path per line on stdin.
    Serve {
        /// Directory containing staff/node profile TOML files
        #[arg(long, default_value = "profiles")]
        profiles: PathBuf,
        /// Log acknowledgments instead of playing audio
        #[arg(long)]
        silent: bool,
    },
    /// List the profiles found in a directory
    Profiles {
        /// Directory containing staff/node profile TOML files
        #[arg(long, default_value = "profiles")]
        profiles: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Serve { profiles, silent } => cmd_serve(profiles, silent).await,
        Command::Profiles { profiles } => cmd_profiles(profiles),
    }
}

async fn cmd_serve(profiles: PathBuf, silent: bool) -> anyhow::Result<()> {
    let config = Config::from_env()?;

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "sanus-node".to_string(),
        log_level: config.log_level.clone(),
    })?;

    let directory = ProfileDirectory::load_from_dir(&profiles)?;
    let recognition = HttpRecognitionClient::new(&config.recognition_url, config.remote_timeout)?;

    let mut sink = HttpEventSink::new(&config.telemetry_sink_url, config.telemetry_timeout)?;
    if let Some(ref token) = config.telemetry_sink_token {
        sink = sink.with_token(token.clone());
    }

    let annunciator: Arc<dyn Annunciator> = if silent {
        Arc::new(SilentAnnunciator)
    } else {
        Arc::new(AplayAnnunciator::new(&config.clip_dir))
    };

    let notifier: Option<Arc<dyn StaffNotifier>> = match config.notify_webhook_url {
        Some(ref url) => Some(Arc::new(WebhookNotifier::new(url, config.remote_timeout)?)),
        None => None,
    };

    let pipeline = Pipeline::new(
        config.pipeline(),
        Clock::system(),
        Collaborators {
            recognition: Arc::new(recognition),
            profiles: Arc::new(directory),
            sink: Arc::new(sink),
            annunciator,
            notifier,
        },
    );
    let workers = pipeline.start()?;
    info!(
        node_id = %pipeline.config().node_id,
        max_in_flight = pipeline.config().max_in_flight,
        "reading capture paths from stdin"
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            info!("stdin closed");
            break;
        };
        let path = line.trim();
        if path.is_empty() {
            continue;
        }

        match tokio::fs::read(path).await {
            Ok(image) => {
                let capture =
                    CaptureEvent::new(&pipeline.config().node_id, pipeline.clock().now(), image);
                let id = pipeline.enqueue(capture);
                info!(capture_id = %id, path, "capture queued");
            }
            Err(e) => warn!(path, error = %e, "cannot read capture, skipping"),
        }
    }

    pipeline.shutdown();
    workers.join().await;
    pipeline.forwarder().wait_for_replay().await;

    let buffered = pipeline.buffered_events();
    if buffered > 0 {
        warn!(buffered, "exiting with undelivered telemetry events");
    }
    Ok(())
}

fn cmd_profiles(profiles: PathBuf) -> anyhow::Result<()> {
    let directory = ProfileDirectory::load_from_dir(&profiles)?;

    let staff = directory.staff_profiles();
    if staff.is_empty() {
        println!("No staff profiles found.");
    } else {
        println!(
            "{:<16}  {:<20}  {:<12}  {:<12}  PHONE",
            "IDENTITY", "NAME", "TITLE", "UNIT"
        );
        println!("{}", "-".repeat(80));
        for profile in &staff {
            println!(
                "{:<16}  {:<20}  {:<12}  {:<12}  {}",
                profile.identity,
                profile.display_name(),
                profile.title,
                profile.unit,
                profile.phone.as_deref().unwrap_or("-")
            );
        }
        println!("\n{} staff profile(s)", staff.len());
    }

    let nodes = directory.node_profiles();
    if !nodes.is_empty() {
        println!();
        println!("{:<16}  {:<12}  {:<8}  DEPARTMENT", "NODE", "UNIT", "ROOM");
        println!("{}", "-".repeat(60));
        for node in &nodes {
            println!(
                "{:<16}  {:<12}  {:<8}  {}",
                node.node_id,
                node.unit,
                node.room_number,
                node.department.as_deref().unwrap_or("-")
            );
        }
        println!("\n{} node profile(s)", nodes.len());
    }

    Ok(())
}
