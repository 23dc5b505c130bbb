use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, anyhow, bail};
use clap::{Parser, Subcommand};
use parking_lot::Mutex;
use tokio::sync::{Notify, watch};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use live_session::core::realtime::{
    EventArgs, LifecycleSignal, LiveSessionClient, RealtimeError, RealtimeResult, SessionSignal,
    Speaker, Transport, events,
};
use live_session::{ClientConfig, SessionState};

/// Live session client - stream audio to a conversational backend
#[derive(Parser, Debug)]
#[command(name = "live-session")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Backend WebSocket URL (overrides configuration)
    #[arg(long, value_name = "URL")]
    url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Stream a 16-bit mono WAV file and print the conversation
    Stream {
        /// WAV file to send as the user's audio
        #[arg(short = 'i', long = "input")]
        input: PathBuf,

        /// Write the model's audio to this WAV file
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,

        /// Send chunks as fast as possible instead of in real time
        #[arg(long)]
        no_pacing: bool,

        /// Seconds to wait for the model to finish after the input is sent
        #[arg(long, default_value_t = 30)]
        reply_timeout: u64,
    },

    /// Check that the backend accepts a session
    Probe,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let mut config = if let Some(config_path) = &cli.config {
        ClientConfig::from_file(config_path).map_err(|e| anyhow!(e.to_string()))?
    } else {
        ClientConfig::from_env().map_err(|e| anyhow!(e.to_string()))?
    };
    if let Some(url) = cli.url {
        config.url = url;
        config.validate().map_err(|e| anyhow!(e.to_string()))?;
    }

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Initialize crypto provider for wss:// connections
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    match cli.command {
        Commands::Stream {
            input,
            output,
            no_pacing,
            reply_timeout,
        } => {
            stream(
                &config,
                &input,
                output.as_deref(),
                !no_pacing,
                Duration::from_secs(reply_timeout),
            )
            .await
        }
        Commands::Probe => probe(&config).await,
    }
}

/// Notifications the CLI waits on.
struct Waiters {
    setup_complete: Notify,
    /// Count of `turn_complete` events seen so far.
    turns_completed: watch::Sender<u64>,
    lost: Notify,
}

impl Waiters {
    fn new() -> Self {
        Self {
            setup_complete: Notify::new(),
            turns_completed: watch::Sender::new(0),
            lost: Notify::new(),
        }
    }

    fn record_turn_complete(&self) {
        self.turns_completed.send_modify(|n| *n += 1);
    }
}

/// Whether the send loop should keep going after one `send_chunk`.
///
/// A rejected send means the session left `active` underneath us; the
/// caller stops streaming but still runs its cleanup.
fn keep_streaming(result: RealtimeResult<()>) -> anyhow::Result<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(RealtimeError::SendRejected(rejected)) => {
            warn!(%rejected, "Stopping stream");
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

fn register_waiters<T>(client: &LiveSessionClient<T>) -> Arc<Waiters>
where
    T: Transport + 'static,
{
    let waiters = Arc::new(Waiters::new());

    let w = Arc::clone(&waiters);
    client.on(events::STATUS, move |args| {
        if args.data_str() == Some("setup_complete") {
            w.setup_complete.notify_one();
        }
        Ok(())
    });

    let w = Arc::clone(&waiters);
    client.on(events::TURN_COMPLETE, move |_| {
        w.record_turn_complete();
        Ok(())
    });

    let w = Arc::clone(&waiters);
    client.on(events::DISCONNECTED_UNEXPECTEDLY, move |args| {
        if let EventArgs::Lifecycle(LifecycleSignal::DisconnectedUnexpectedly(e)) = args {
            eprintln!("\n{}", e);
        }
        w.lost.notify_one();
        Ok(())
    });

    waiters
}

async fn stream(
    config: &ClientConfig,
    input: &Path,
    output: Option<&Path>,
    pacing: bool,
    reply_timeout: Duration,
) -> anyhow::Result<()> {
    let pcm = read_wav(input, config.input_sample_rate)?;
    let client = LiveSessionClient::from_config(config);
    let waiters = register_waiters(&client);

    client.on(events::TURN_STARTED, |args| {
        match args {
            EventArgs::Session(SessionSignal::TurnStarted(Speaker::User)) => print!("\nYou: "),
            EventArgs::Session(SessionSignal::TurnStarted(Speaker::Model)) => print!("\nModel: "),
            _ => {}
        }
        Ok(())
    });
    for event in [events::USER_TRANSCRIPT, events::MODEL_TRANSCRIPT] {
        client.on(event, |args| {
            print!("{}", args.data_str().unwrap_or_default());
            std::io::stdout().flush()?;
            Ok(())
        });
    }
    client.on(events::TOOL_CALL, |args| {
        let name = args
            .data()
            .and_then(|d| d.get("name"))
            .and_then(|n| n.as_str())
            .unwrap_or("<unnamed>");
        let call_args = args.data().map(|d| d["args"].to_string()).unwrap_or_default();
        println!("\n[tool call] {} {}", name, call_args);
        Ok(())
    });
    client.on(events::INTERRUPTED, |args| {
        if let EventArgs::Session(SessionSignal::Interrupted { reason }) = args {
            println!("\n[interrupted: {}]", reason.as_deref().unwrap_or("no reason given"));
        }
        Ok(())
    });
    client.on(events::USAGE, |args| {
        if let Some(usage) = args.data() {
            info!(%usage, "Usage");
        }
        Ok(())
    });

    let reply_audio = Arc::new(Mutex::new(Vec::new()));
    if output.is_some() {
        let r = Arc::clone(&reply_audio);
        client.on_inbound_chunk(move |chunk| r.lock().extend_from_slice(chunk.as_bytes()));
    }

    client
        .connect()
        .await
        .with_context(|| format!("Failed to connect to {}", config.url))?;
    let session_id = client.start_session(config.custom_params.clone()).await?;
    info!(session_id = %session_id, "Waiting for backend setup");

    tokio::time::timeout(
        Duration::from_secs(config.connect_timeout_seconds),
        waiters.setup_complete.notified(),
    )
    .await
    .map_err(|_| anyhow!("Backend did not complete setup in time"))?;

    let chunk_size = config.chunk_size_bytes();
    let mut ticker = tokio::time::interval(Duration::from_millis(config.chunk_duration_ms as u64));
    let mut interrupted_by_user = false;
    let mut turns = waiters.turns_completed.subscribe();

    for chunk in pcm.chunks(chunk_size) {
        if pacing {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = tokio::signal::ctrl_c() => {
                    interrupted_by_user = true;
                    break;
                }
            }
        }
        if client.snapshot().state != SessionState::Active {
            warn!("Session no longer active, stopping stream");
            break;
        }
        if !keep_streaming(client.send_chunk(chunk.to_vec()).await)? {
            break;
        }
    }

    // Only a turn that completes after the last chunk ends the wait.
    turns.mark_unchanged();

    if !interrupted_by_user {
        tokio::select! {
            _ = turns.changed() => {}
            _ = waiters.lost.notified() => {}
            _ = tokio::signal::ctrl_c() => {}
            _ = tokio::time::sleep(reply_timeout) => warn!("No turn_complete before timeout"),
        }
    }
    println!();

    client.end_session().await?;
    client.disconnect();
    client.settle().await?;

    if let Some(path) = output {
        let audio = std::mem::take(&mut *reply_audio.lock());
        write_wav(path, config.output_sample_rate, &audio)?;
        println!("Model audio written to {}", path.display());
    }

    Ok(())
}

async fn probe(config: &ClientConfig) -> anyhow::Result<()> {
    let client = LiveSessionClient::from_config(config);
    let waiters = register_waiters(&client);

    client
        .connect()
        .await
        .with_context(|| format!("Failed to connect to {}", config.url))?;
    client.start_session(config.custom_params.clone()).await?;

    let ready = tokio::time::timeout(
        Duration::from_secs(config.connect_timeout_seconds),
        waiters.setup_complete.notified(),
    )
    .await
    .is_ok();

    let snapshot = client.settle().await?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);

    client.end_session().await?;
    client.disconnect();
    client.settle().await?;

    if !ready {
        bail!("Backend at {} did not report setup_complete", config.url);
    }
    println!("Backend at {} is ready", config.url);
    Ok(())
}

/// Read a 16-bit mono WAV file as little-endian PCM bytes.
fn read_wav(path: &Path, expected_rate: u32) -> anyhow::Result<Vec<u8>> {
    let reader = hound::WavReader::open(path)
        .with_context(|| format!("Failed to open WAV file: {}", path.display()))?;
    let spec = reader.spec();

    if spec.channels != 1 || spec.bits_per_sample != 16 {
        bail!(
            "{} must be 16-bit mono, got {} channel(s) at {} bits",
            path.display(),
            spec.channels,
            spec.bits_per_sample
        );
    }
    if spec.sample_rate != expected_rate {
        warn!(
            file_rate = spec.sample_rate,
            expected_rate, "Input sample rate differs from configuration"
        );
    }

    let mut pcm = Vec::with_capacity(reader.len() as usize * 2);
    for sample in reader.into_samples::<i16>() {
        pcm.extend_from_slice(&sample?.to_le_bytes());
    }
    Ok(pcm)
}

fn write_wav(path: &Path, sample_rate: u32, pcm: &[u8]) -> anyhow::Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create WAV file: {}", path.display()))?;
    for sample in pcm.chunks_exact(2) {
        writer.write_sample(i16::from_le_bytes([sample[0], sample[1]]))?;
    }
    writer.finalize().context("Failed to finalize WAV file")?;
    Ok(())
}
