use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use mogidigest::clock::{SystemClock, default_from_address, system_hostname};
use mogidigest::digest::{BufferLimits, GroupBy, LogUpstream, SmtpUpstream, Upstream};
use mogidigest::{Relay, RelayConfig};

/// SMTP relay that folds floods of similar mail into periodic digests.
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// Address the SMTP server listens on
    #[arg(long, default_value = "127.0.0.1:2525")]
    bind: String,

    /// Name announced to clients (defaults to the host name)
    #[arg(long)]
    hostname: Option<String>,

    /// Sender address of the digests (defaults to mogidigest@<host>)
    #[arg(long)]
    from: Option<String>,

    /// Upstream SMTP relay as host:port; digests are only logged when unset
    #[arg(long)]
    relay: Option<String>,

    /// Send every digest to this address instead of the original recipients
    #[arg(long = "to")]
    to: Vec<String>,

    /// Seconds without new mail before a batch is sent
    #[arg(long, default_value_t = 30)]
    soft_limit: u64,

    /// Maximum seconds a batch is held back
    #[arg(long, default_value_t = 300)]
    hard_limit: u64,

    /// Seconds between flush checks
    #[arg(long, default_value_t = 5)]
    flush_interval: u64,

    /// Seconds to wait for a silent client before dropping it
    #[arg(long, default_value_t = 60)]
    read_timeout: u64,

    /// Header selecting the batch a message belongs to
    #[arg(long, default_value = "X-Mogidigest-Batch")]
    batch_header: String,

    /// Batch by subject instead of by header
    #[arg(long, conflicts_with = "batch_header")]
    batch_subject: bool,

    /// Pattern replaced in subjects when grouping inside a digest
    #[arg(long, default_value = r"\d+")]
    group_pattern: String,

    /// Replacement for matches of the group pattern
    #[arg(long, default_value = "#")]
    group_replacement: String,

    /// Group inside a digest by this header instead of the subject pattern
    #[arg(long)]
    group_header: Option<String>,
}

fn parse_relay(relay: &str) -> anyhow::Result<(String, u16)> {
    match relay.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse()
                .with_context(|| format!("Invalid port in relay address {relay:?}"))?;
            Ok((host.to_string(), port))
        }
        None => Ok((relay.to_string(), 25)),
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let args = Args::parse();

    let hostname = match args.hostname {
        Some(hostname) => hostname,
        None => system_hostname().unwrap_or_else(|_| "localhost".to_string()),
    };
    let from = args
        .from
        .unwrap_or_else(|| default_from_address("mogidigest", system_hostname));

    let batch = if args.batch_subject {
        GroupBy::same_subject()
    } else {
        GroupBy::header(&args.batch_header, "")
    };
    let group = match args.group_header {
        Some(header) => GroupBy::header(&header, ""),
        None => GroupBy::replaced_subject(&args.group_pattern, &args.group_replacement)
            .with_context(|| format!("Invalid group pattern {:?}", args.group_pattern))?,
    };

    let upstream: Arc<dyn Upstream> = match &args.relay {
        Some(relay) => {
            let (host, port) = parse_relay(relay)?;
            info!(%host, port, "Relaying digests upstream");
            Arc::new(SmtpUpstream::new(&host, port, args.to))
        }
        None => {
            info!("No upstream relay configured, digests will be logged");
            Arc::new(LogUpstream)
        }
    };

    let config = RelayConfig {
        bind: args.bind,
        hostname,
        from,
        limits: BufferLimits {
            soft: Duration::from_secs(args.soft_limit),
            hard: Duration::from_secs(args.hard_limit),
        },
        flush_interval: Duration::from_secs(args.flush_interval),
        read_timeout: Some(Duration::from_secs(args.read_timeout)),
        batch,
        group,
    };

    Relay::new(config, Arc::new(SystemClock), upstream)
        .run()
        .context("SMTP server failed")?;

    Ok(())
}
