//! Queue one message and deliver it through the configured relay
//!
//! The body is read from `--body` or, when omitted, from stdin.

use std::{
    io::Read,
    path::{Path, PathBuf},
};

use anyhow::Context;
use clap::Parser;
use mailspool::{Email, Mailbox, Spooler, SpoolerConfig, common::internal, logging};

/// Spool a message and deliver it through an SMTP relay
#[derive(Parser, Debug)]
#[command(name = "mailspool")]
#[command(about = "Spool a message and deliver it through an SMTP relay", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file, taking precedence over `MAILSPOOL_CONFIG`
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Sender, either `user@example.com` or `"Name <user@example.com>"`
    #[arg(short, long)]
    from: Mailbox,

    /// Recipient; repeat for more than one
    #[arg(short, long, required = true)]
    to: Vec<Mailbox>,

    #[arg(short, long, default_value = "")]
    subject: String,

    /// Send the body as `text/html`
    #[arg(long)]
    html: bool,

    /// File holding the body
    #[arg(short, long)]
    body: Option<PathBuf>,

    /// Override the configured number of workers
    #[arg(short, long)]
    workers: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init();

    let config_path = match cli.config {
        Some(path) => path,
        None => find_config_file()?,
    };
    let mut config = SpoolerConfig::from_file(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    if let Some(workers) = cli.workers {
        config.workers = workers;
        config
            .validate()
            .context("Invalid --workers for this configuration")?;
    }

    let body = read_body(cli.body.as_deref())?;
    let builder = Email::builder()
        .from(cli.from)
        .recipients(cli.to)
        .subject(cli.subject);
    let email = if cli.html {
        builder.html(body)
    } else {
        builder.body(body)
    }
    .build();

    let workers = config.workers;
    let spooler = Spooler::from_config(config);
    for _ in 0..workers {
        spooler.start();
    }

    spooler.spool(email).await;

    tokio::select! {
        () = spooler.stop() => Ok(()),
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for ctrl-c")?;
            internal!(level = WARN, "Interrupted before delivery finished");
            anyhow::bail!("Interrupted")
        }
    }
}

fn read_body(path: Option<&Path>) -> anyhow::Result<String> {
    if let Some(path) = path {
        return std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read body from {}", path.display()));
    }

    let mut body = String::new();
    std::io::stdin()
        .read_to_string(&mut body)
        .context("Failed to read body from stdin")?;
    Ok(body)
}

/// Find the configuration file using the following precedence:
/// 1. `MAILSPOOL_CONFIG` environment variable
/// 2. ./mailspool.config.ron (current working directory)
/// 3. /etc/mailspool/mailspool.config.ron (system-wide config)
fn find_config_file() -> anyhow::Result<PathBuf> {
    if let Ok(env_path) = std::env::var("MAILSPOOL_CONFIG") {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        anyhow::bail!(
            "MAILSPOOL_CONFIG points to non-existent file: {}",
            path.display()
        );
    }

    let default_paths = [
        PathBuf::from("./mailspool.config.ron"),
        PathBuf::from("/etc/mailspool/mailspool.config.ron"),
    ];

    if let Some(path) = default_paths.iter().find(|path| path.exists()) {
        return Ok(path.clone());
    }

    let paths_tried = default_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    anyhow::bail!(
        "No configuration file found. Tried:\n  - MAILSPOOL_CONFIG environment variable\n{paths_tried}"
    )
}
