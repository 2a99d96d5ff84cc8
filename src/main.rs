/*============================================================
  Synavera Project: Sparkler
  Module: sparkler_core::main
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Entry point for Sparkler. Scans local release artifacts,
    reads the appcast and catalog, and reports (or repairs)
    inconsistencies before a release goes out.

  Security / Safety Notes:
    Operates within user privileges. Executes sign_update and
    openssl, performs HTTP GET requests, and PUTs to the
    catalog only when --repair is given.

  Dependencies:
    clap for CLI parsing, chrono for session stamps.

  Operational Scope:
    Invoked by release engineers or CI before publishing an
    update channel.

  Revision History:
    2026-10-16 COD  Authored Sparkler runtime.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Result-first error handling with deterministic exits
    - Structured logging following Synavera cadence
    - Configurable execution via CLI and config file
============================================================*/

use std::path::PathBuf;
use std::process::ExitCode;

use chrono::Utc;
use clap::{ArgAction, Args, Parser, Subcommand};

use sparkler_core::appcast::AppcastReader;
use sparkler_core::catalog::{CatalogClient, Credentials, WireVersion};
use sparkler_core::config::SparklerConfig;
use sparkler_core::logger::Logger;
use sparkler_core::model::Version;
use sparkler_core::reconcile::{write_report, ReconciliationReport, Reconciler, RepairMode};
use sparkler_core::scanner::LocalScan;
use sparkler_core::signature::ExternalSigner;
use sparkler_core::{Result, SparklerError};

/// Command-line arguments for Sparkler.
#[derive(Debug, Parser)]
#[command(
    name = "sparkler",
    version,
    author = "Synavera Systems",
    about = "Release artifact reconciliation for appcast and catalog feeds"
)]
struct Cli {
    /// Override configuration file path.
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Explicit log file path.
    #[arg(long, value_name = "PATH", global = true)]
    log: Option<PathBuf>,
    /// Write the reconciliation report as JSON.
    #[arg(long, value_name = "PATH", global = true)]
    report: Option<PathBuf>,
    /// Enable verbose logging to stderr.
    #[arg(long, action = ArgAction::SetTrue, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List local artifacts with their computed signatures.
    Scan(LocalArgs),
    /// Print the appcast in catalog JSON form.
    Feed(FeedArgs),
    /// Verify local artifacts and deltas against the appcast.
    VerifyFeed {
        #[command(flatten)]
        feed: FeedArgs,
        /// Working directory holding .zip and .delta files.
        #[arg(long, value_name = "PATH")]
        dir: Option<PathBuf>,
        /// DSA public key used to verify signatures.
        #[arg(long, value_name = "PATH")]
        public_key: Option<PathBuf>,
    },
    /// Compare local artifacts with the catalog, optionally repairing it.
    VerifyCatalog {
        #[command(flatten)]
        local: LocalArgs,
        #[command(flatten)]
        catalog: CatalogArgs,
        /// Write corrected lengths back to the catalog.
        #[arg(long, action = ArgAction::SetTrue)]
        repair: bool,
    },
}

#[derive(Debug, Args)]
struct LocalArgs {
    /// Working directory holding .zip artifacts.
    #[arg(long, value_name = "PATH")]
    dir: Option<PathBuf>,
    /// DSA private key handed to the signing tool.
    #[arg(long, value_name = "PATH")]
    private_key: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct FeedArgs {
    /// Appcast URL.
    #[arg(long = "feed-url", value_name = "URL")]
    url: Option<String>,
}

#[derive(Debug, Args)]
struct CatalogArgs {
    /// Catalog service base URL.
    #[arg(long, value_name = "URL")]
    base_url: Option<String>,
    /// Application name in the catalog.
    #[arg(long, value_name = "APP")]
    app: Option<String>,
    /// Feed (channel) name in the catalog.
    #[arg(long = "catalog-feed", value_name = "FEED")]
    feed: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("[Sparkler] {}", err);
            err.exit_code()
        }
    }
}

async fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = SparklerConfig::load_from_optional_path(cli.config.as_deref())?;

    let session_stamp = Utc::now().format("%Y-%m-%d_%H-%M-%S").to_string();
    let log_path = cli
        .log
        .clone()
        .or_else(|| Some(config.log_dir().join(format!("sparkler_{session_stamp}.log"))));
    let logger = Logger::new(log_path, cli.verbose)?;
    if let (Some(username), Some(password)) = (&config.catalog.username, &config.catalog.password) {
        let credentials = Credentials {
            username: username.clone(),
            password: password.clone(),
        };
        logger.redact(credentials.basic_auth_header());
        logger.redact(password.clone());
    }
    logger.info("INIT", "Sparkler awakening.");

    let signer = ExternalSigner::new(&config.signing);
    let report_path = cli.report.clone().or_else(|| config.report_path.clone());

    let report = match cli.command {
        Command::Scan(local) => {
            let dir = local.dir.unwrap_or_else(|| config.working_directory());
            let private_key = resolve_private_key(local.private_key, &config)?;
            let versions = LocalScan::open(&dir, &private_key, &signer)
                .await?
                .collect()
                .await?;
            logger.info("SCAN", format!("Found {} artifacts in {}", versions.len(), dir.display()));
            print_local_versions(&versions);
            None
        }
        Command::Feed(feed) => {
            let url = resolve_feed_url(feed.url, &config)?;
            let versions = AppcastReader::new(&config.feed)?.fetch_appcast(&url).await?;
            logger.info("FEED", format!("Appcast {url} lists {} versions", versions.len()));
            print_feed(&versions)?;
            None
        }
        Command::VerifyFeed {
            feed,
            dir,
            public_key,
        } => {
            let url = resolve_feed_url(feed.url, &config)?;
            let dir = dir.unwrap_or_else(|| config.working_directory());
            let public_key = public_key.or_else(|| config.signing.public_key.clone());

            let versions = AppcastReader::new(&config.feed)?.fetch_appcast(&url).await?;
            logger.info("FEED", format!("Appcast {url} lists {} versions", versions.len()));
            let report = Reconciler::new(&signer, &logger)
                .verify_against_feed(&url, &versions, &dir, public_key.as_deref())
                .await?;
            Some(report)
        }
        Command::VerifyCatalog {
            local,
            catalog,
            repair,
        } => {
            let dir = local.dir.unwrap_or_else(|| config.working_directory());
            let private_key = resolve_private_key(local.private_key, &config)?;
            let mut catalog_config = config.catalog.clone();
            if let Some(base_url) = catalog.base_url {
                catalog_config.base_url = base_url;
            }
            if let Some(app) = catalog.app {
                catalog_config.app = app;
            }
            if let Some(feed) = catalog.feed {
                catalog_config.feed = feed;
            }
            let mode = if repair {
                RepairMode::Repair
            } else {
                RepairMode::ReportOnly
            };

            let client = CatalogClient::new(&catalog_config)?;
            let label = client.versions_url();
            let report = Reconciler::new(&signer, &logger)
                .verify_against_catalog(&client, &label, &dir, &private_key, mode)
                .await?;
            Some(report)
        }
    };

    let verdict = match report {
        Some(report) => {
            if let Some(path) = &report_path {
                write_report(&report, path)?;
                logger.info("REPORT", format!("Report written to {}", path.display()));
            }
            print_summary(&report);
            report.verdict()
        }
        None => Ok(()),
    };

    logger.info("COMPLETE", "Reconciliation pass finished.");
    logger.finalize()?;
    verdict?;

    Ok(ExitCode::SUCCESS)
}

fn resolve_private_key(cli_value: Option<PathBuf>, config: &SparklerConfig) -> Result<PathBuf> {
    cli_value
        .or_else(|| config.signing.private_key.clone())
        .ok_or_else(|| {
            SparklerError::Config(
                "No private key given (--private-key or [signing] private_key)".into(),
            )
        })
}

fn resolve_feed_url(cli_value: Option<String>, config: &SparklerConfig) -> Result<String> {
    cli_value
        .or_else(|| config.feed.url.clone())
        .ok_or_else(|| {
            SparklerError::Config("No appcast url given (--feed-url or [feed] url)".into())
        })
}

fn print_local_versions(versions: &[Version]) {
    for version in versions {
        println!(
            "{}\t{}\t{}\t{}",
            version.version, version.short_version, version.length, version.signature
        );
    }
}

fn print_feed(versions: &[Version]) -> Result<()> {
    let wire: Vec<WireVersion> = versions.iter().filter_map(WireVersion::from_version).collect();
    let rendered = serde_json::to_string_pretty(&wire)
        .map_err(|err| SparklerError::Serialization(format!("Failed to render feed: {err}")))?;
    println!("{rendered}");
    Ok(())
}

fn print_summary(report: &ReconciliationReport) {
    let metadata = &report.metadata;
    println!(
        "→ {:?} against {}. Ok={} Size={} Signature={} MissingLocal={} Unmatched={} \
         CheckFailed={} Repaired={} RepairFailed={}",
        metadata.flow,
        metadata.source,
        metadata.ok,
        metadata.size_mismatches,
        metadata.signature_mismatches,
        metadata.missing_local,
        metadata.missing_remote_match,
        metadata.check_failures,
        metadata.repaired,
        metadata.repair_failures
    );
}
