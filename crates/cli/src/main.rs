//! Operator CLI for logvault.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use logvault_core::config::AppConfig;
use logvault_core::{StoredLogHeader, WindowRequest};
use logvault_retrieval::{CancellationToken, WindowAssembler};
use std::io::Write;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::io::{AsyncWriteExt, BufWriter};

#[derive(Parser)]
#[command(name = "logvaultctl")]
#[command(about = "Operator CLI for logvault")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct ConfigArgs {
    /// Configuration file (same format as the server's)
    #[arg(long, env = "LOGVAULT_CONFIG", default_value = "config/server.toml")]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the decoded logs of a time window to a file
    Fetch {
        /// Key prefix of the archives (device or token)
        #[arg(long)]
        prefix: String,
        /// RFC 3339 start of the window
        #[arg(long)]
        start_time: String,
        /// RFC 3339 end of the window
        #[arg(long)]
        end_time: String,
        /// Output path
        #[arg(long, required_unless_present = "dry_run")]
        output: Option<PathBuf>,
        /// Print the archive keys covering the window instead of fetching them
        #[arg(long, default_value_t = false)]
        dry_run: bool,
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Print the envelope and body of an uploaded log
    ShowUpload {
        /// Object key of the upload (e.g. inbound/0123456789abcdef)
        key: String,
        #[command(flatten)]
        config: ConfigArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let Cli { command } = Cli::parse();

    match command {
        Commands::Fetch {
            prefix,
            start_time,
            end_time,
            output,
            dry_run,
            config,
        } => {
            handle_fetch_command(&prefix, &start_time, &end_time, output, dry_run, &config).await
        }
        Commands::ShowUpload { key, config } => handle_show_upload_command(&key, &config).await,
    }
}

async fn load_config(path: &Path) -> Result<AppConfig> {
    let mut figment = Figment::new();

    if path.exists() {
        figment = figment.merge(Toml::file(path));
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("LOGVAULT_").split("__"))
        .extract()
        .context("failed to load configuration")?;
    config
        .validate()
        .map_err(anyhow::Error::msg)
        .context("invalid configuration")?;
    Ok(config)
}

fn parse_time(flag: &str, value: &str) -> Result<OffsetDateTime> {
    OffsetDateTime::parse(value, &Rfc3339).with_context(|| format!("invalid {flag}: {value:?}"))
}

async fn handle_fetch_command(
    prefix: &str,
    start_time: &str,
    end_time: &str,
    output: Option<PathBuf>,
    dry_run: bool,
    config_args: &ConfigArgs,
) -> Result<()> {
    let begin = parse_time("start-time", start_time)?;
    let end = parse_time("end-time", end_time)?;
    let window = WindowRequest::new(prefix, begin, end).context("invalid window")?;

    let config = load_config(&config_args.config).await?;
    let storage = logvault_storage::from_config(&config.storage)
        .await
        .context("failed to initialize storage")?;

    let cancel = CancellationToken::new();
    let assembler = WindowAssembler::new(storage, &config.retrieval).with_cancellation(cancel.clone());
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted, stopping...");
            cancel.cancel();
        }
    });

    if dry_run {
        let keys = assembler
            .resolve(&window)
            .await
            .context("failed to list archives")?;
        let mut stdout = std::io::stdout().lock();
        for key in &keys {
            writeln!(stdout, "{key}")?;
        }
        return Ok(());
    }

    let Some(output) = output else {
        anyhow::bail!("--output is required unless --dry-run is given");
    };
    let file = tokio::fs::File::create(&output)
        .await
        .with_context(|| format!("couldn't create {}", output.display()))?;
    let mut writer = BufWriter::new(file);

    // Whatever was decoded before a failure stays in the file.
    let result = assembler.assemble(&window, &mut writer).await;
    writer.flush().await?;
    let report = result.context("retrieval failed")?;

    eprintln!(
        "Wrote {} bytes from {} archives ({} entries) to {}",
        report.bytes_written,
        report.archives,
        report.entries,
        output.display()
    );
    if report.retries > 0 {
        eprintln!("  {} download attempts were retried", report.retries);
    }
    Ok(())
}

async fn handle_show_upload_command(key: &str, config_args: &ConfigArgs) -> Result<()> {
    let config = load_config(&config_args.config).await?;
    let storage = logvault_storage::from_config(&config.storage)
        .await
        .context("failed to initialize storage")?;

    let data = storage
        .get(key)
        .await
        .with_context(|| format!("failed to read {key}"))?;
    let (header, body) = StoredLogHeader::split(&data).context("not an uploaded log")?;

    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "token: {}", header.token)?;
    writeln!(stdout, "tz: {}", header.tz)?;
    writeln!(stdout, "encoding: {}", header.encoding)?;
    writeln!(stdout)?;
    stdout.write_all(body)?;
    Ok(())
}
