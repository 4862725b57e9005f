// Vive receiver: listen for a sender, print frame summaries, optionally publish to Redis.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use vive_core::{run_until_signal, Shutdown};
use vive_receiver::config::{self, Config};
use vive_receiver::{Receiver, ReceiverSession, RedisPublisher};

/// Exit code for startup/configuration errors.
const EXIT_STARTUP: u8 = 2;
/// How long to keep publishing queued frames after the receiver stops.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Parser, Debug)]
#[command(name = "vive-receiver", version)]
#[command(about = "Receive Vive tracker frames over length-prefixed protobuf/TCP")]
struct Cli {
    /// Config file (default: ~/.config/vive-stream/receiver.toml, then /etc/vive-stream/receiver.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host/IP to bind the server to
    #[arg(long)]
    host: Option<String>,

    /// TCP port to listen on
    #[arg(long)]
    port: Option<u16>,

    /// Log a summary every N frames (0 disables)
    #[arg(long)]
    print_every: Option<u64>,

    /// Publish each frame as JSON to this Redis host (connected lazily; may come up later)
    #[arg(long)]
    redis_host: Option<String>,

    #[arg(long)]
    redis_port: Option<u16>,

    /// Redis pub/sub channel
    #[arg(long)]
    redis_channel: Option<String>,

    /// Drop a sender that is silent for this many seconds
    #[arg(long)]
    read_timeout: Option<f64>,

    /// Largest accepted frame payload in bytes
    #[arg(long)]
    max_frame_len: Option<u32>,
}

impl Cli {
    fn apply(&self, cfg: &mut Config) {
        if let Some(host) = &self.host {
            cfg.host = host.clone();
        }
        if let Some(port) = self.port {
            cfg.port = port;
        }
        if let Some(n) = self.print_every {
            cfg.print_every = n;
        }
        if let Some(host) = &self.redis_host {
            cfg.redis_host = Some(host.clone());
        }
        if let Some(port) = self.redis_port {
            cfg.redis_port = port;
        }
        if let Some(channel) = &self.redis_channel {
            cfg.redis_channel = channel.clone();
        }
        if let Some(t) = self.read_timeout {
            cfg.read_timeout_secs = Some(t);
        }
        if let Some(n) = self.max_frame_len {
            cfg.max_frame_len = n;
        }
    }
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
    cli.apply(&mut cfg);

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!("cannot start runtime: {e}");
            return ExitCode::from(EXIT_STARTUP);
        }
    };
    rt.block_on(run(cfg))
}

async fn run(cfg: Config) -> ExitCode {
    let (mut receiver, mut session) = match startup(&cfg).await {
        Ok(started) => started,
        Err(e) => {
            error!("{e:#}");
            return ExitCode::from(EXIT_STARTUP);
        }
    };

    let shutdown = Shutdown::new();
    let ((), stopped) = run_until_signal(
        receiver.run(&mut session, shutdown.signal()),
        &shutdown,
        vive_core::os_signal(),
    )
    .await;
    if stopped {
        info!("Stopped by user");
    }
    if session.has_publisher()
        && tokio::time::timeout(DRAIN_TIMEOUT, session.close_publisher())
            .await
            .is_err()
    {
        warn!("gave up waiting for queued frames to publish");
    }
    ExitCode::SUCCESS
}

/// Bind the listener and start the publisher, if one is configured. An unreachable Redis
/// is not fatal: the publisher reconnects on each publish until it succeeds.
async fn startup(cfg: &Config) -> anyhow::Result<(Receiver, ReceiverSession<RedisPublisher>)> {
    let server_config = cfg.server();
    let bind = server_config.bind.clone();
    let receiver = Receiver::bind(server_config)
        .await
        .with_context(|| format!("cannot bind {bind}"))?;

    let mut session = ReceiverSession::new(cfg.print_every);
    if let Some(addr) = cfg.redis_addr() {
        let mut publisher = RedisPublisher::new(addr);
        if let Err(e) = publisher.connect().await {
            warn!(addr = %publisher.addr(), error = %e, "redis unavailable; will retry on publish");
        }
        info!(channel = %cfg.redis_channel, "publishing frames to redis");
        session = session.with_publisher(publisher, cfg.redis_channel.clone());
    }
    Ok((receiver, session))
}
