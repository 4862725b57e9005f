// Vive sender: stream tracker poses to a receiver, reconnecting on failure.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use vive_core::{run_until_signal, Shutdown};
use vive_sender::config::{self, Config};
use vive_sender::{
    send_frames, CaptureSession, Producer, ProducerConfig, ProducerExit, SyntheticRuntime,
    SyntheticSource,
};

/// Exit code for startup/configuration errors.
const EXIT_STARTUP: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "vive-sender", version)]
#[command(about = "Stream Vive tracker poses to a receiver over length-prefixed protobuf/TCP")]
struct Cli {
    /// Config file (default: ~/.config/vive-stream/sender.toml, then /etc/vive-stream/sender.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stream continuously, reconnecting whenever the link drops
    Stream(StreamArgs),
    /// Send a fixed number of synthetic frames over one connection, then exit
    Mock(MockArgs),
}

#[derive(Args, Debug)]
struct Target {
    /// Receiver IP/hostname
    #[arg(long)]
    host: Option<String>,

    /// Receiver TCP port
    #[arg(long)]
    port: Option<u16>,

    /// Tracker roles to stream
    #[arg(long, num_args = 1..)]
    roles: Option<Vec<String>>,
}

#[derive(Args, Debug)]
struct StreamArgs {
    #[command(flatten)]
    target: Target,

    /// Seconds to wait before retrying the TCP connection
    #[arg(long)]
    reconnect_delay: Option<f64>,

    /// Seconds to wait for a TCP connect to complete
    #[arg(long)]
    connect_timeout: Option<f64>,

    /// Tick rate of the synthetic capture runtime (Hz, <= 0 for unpaced)
    #[arg(long)]
    hz: Option<f64>,

    /// Log every sent frame
    #[arg(long)]
    verbose: bool,
}

#[derive(Args, Debug)]
struct MockArgs {
    #[command(flatten)]
    target: Target,

    /// Number of frames to send
    #[arg(long, default_value_t = 10)]
    frames: u64,

    /// Send rate (Hz, <= 0 for unpaced)
    #[arg(long, default_value_t = 30.0)]
    hz: f64,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut cfg = match config::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            error!("{e}");
            return ExitCode::from(EXIT_STARTUP);
        }
    };
    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!("cannot start runtime: {e}");
            return ExitCode::from(EXIT_STARTUP);
        }
    };
    let result = match cli.command {
        Command::Stream(args) => {
            args.apply(&mut cfg);
            rt.block_on(stream(cfg))
        }
        Command::Mock(args) => {
            args.target.apply(&mut cfg);
            rt.block_on(mock(cfg, args.frames, args.hz))
        }
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

impl Target {
    fn apply(&self, cfg: &mut Config) {
        if let Some(host) = &self.host {
            cfg.host = host.clone();
        }
        if let Some(port) = self.port {
            cfg.port = port;
        }
        if let Some(roles) = &self.roles {
            cfg.roles = roles.clone();
        }
    }
}

impl StreamArgs {
    fn apply(&self, cfg: &mut Config) {
        self.target.apply(cfg);
        if let Some(d) = self.reconnect_delay {
            cfg.reconnect_delay_secs = d;
        }
        if let Some(t) = self.connect_timeout {
            cfg.connect_timeout_secs = t;
        }
        if let Some(hz) = self.hz {
            cfg.hz = hz;
        }
        cfg.verbose |= self.verbose;
    }
}

async fn stream(cfg: Config) -> anyhow::Result<()> {
    let runtime = SyntheticRuntime::new(SyntheticSource::new(cfg.roles.clone(), cfg.hz, None));
    let session = CaptureSession::open(runtime).context("opening capture session")?;
    let producer_config = ProducerConfig {
        addr: cfg.addr(),
        connect_timeout: cfg.connect_timeout(),
        reconnect_delay: cfg.reconnect_delay(),
        verbose: cfg.verbose,
    };
    info!(addr = %producer_config.addr, roles = ?cfg.roles, "connecting to receiver host");

    let shutdown = Shutdown::new();
    let mut producer = Producer::new(producer_config, session);
    let (exit, _) = run_until_signal(
        producer.run(shutdown.signal()),
        &shutdown,
        vive_core::os_signal(),
    )
    .await;
    if exit == ProducerExit::Shutdown {
        info!("Stopped by user");
    }
    producer.into_source().close();
    Ok(())
}

async fn mock(cfg: Config, frames: u64, hz: f64) -> anyhow::Result<()> {
    let addr = cfg.addr();
    let shutdown = Shutdown::new();
    let mut signal = shutdown.signal();
    let send = async {
        tokio::select! {
            sent = send_frames(&addr, &cfg.roles, frames, hz) => Some(sent),
            _ = signal.wait() => None,
        }
    };
    match run_until_signal(send, &shutdown, vive_core::os_signal()).await {
        (Some(sent), _) => {
            let sent = sent.with_context(|| format!("mock send to {addr}"))?;
            info!(sent, "mock sender finished");
        }
        (None, _) => info!("Stopped by user"),
    }
    Ok(())
}
