//! CLI entry point for confcrawl.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use confcrawl_core::cli::{Cli, Command, ConvertArgs, DownloadArgs, SelectArgs};
use confcrawl_core::services::{FlareSolverrClient, SemanticScholarClient};
use confcrawl_core::{
    AdapterContext, CONFERENCES, ConferenceConfig, Converter, CrawlOptions, CrawlReport,
    HttpTransport, build_adapter, conference_by_key, crawl_conference,
};

/// Exit code when any task ended in `Failed`.
const EXIT_PARTIAL: u8 = 1;

/// Exit code when results were not durably recorded.
const EXIT_FLUSH_FAILED: u8 = 2;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let cli = Cli::parse();

    // Determine log level based on verbose/quiet flags
    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?cli, "CLI arguments parsed");

    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    let code = match cli.command {
        Command::Download(args) => cmd_download(&cli.data_dir, &args, cli.quiet, &cancel).await?,
        Command::Convert(args) => cmd_convert(&cli.data_dir, &args).await?,
        Command::Run(args) => {
            let download_code =
                cmd_download(&cli.data_dir, &args.download, cli.quiet, &cancel).await?;
            let convert_args = ConvertArgs {
                select: args.download.select.clone(),
                workers: args.convert_workers,
                converter: args.converter.clone(),
                force: false,
            };
            let convert_code = cmd_convert(&cli.data_dir, &convert_args).await?;
            download_code.max(convert_code)
        }
        Command::Status => {
            print_status(&cli.data_dir);
            0
        }
    };

    Ok(ExitCode::from(code))
}

fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received - finishing in-flight commits, starting no new tasks");
            cancel.cancel();
        }
    });
}

/// Resolves the conference selection into configs, or reports why not.
fn selected_conferences(select: &SelectArgs) -> Result<Vec<&'static ConferenceConfig>> {
    if select.all {
        return Ok(CONFERENCES.iter().collect());
    }
    let Some(key) = select.conference.as_deref() else {
        anyhow::bail!("specify --conference or --all");
    };
    let Some(conf) = conference_by_key(key) else {
        let known: Vec<_> = CONFERENCES.iter().map(|c| c.key).collect();
        anyhow::bail!("unknown conference {key:?}; known: {}", known.join(", "));
    };
    Ok(vec![conf])
}

async fn cmd_download(
    data_dir: &Path,
    args: &DownloadArgs,
    quiet: bool,
    cancel: &CancellationToken,
) -> Result<u8> {
    let conferences = selected_conferences(&args.select)?;

    let flaresolverr = if args.flaresolverr {
        Some(Arc::new(FlareSolverrClient::new(&args.flaresolverr_url)))
    } else {
        None
    };
    let ctx = AdapterContext {
        flaresolverr,
        semantic_scholar: Some(Arc::new(SemanticScholarClient::new())),
    };

    let fetcher: Arc<dyn confcrawl_core::ContentFetcher> = Arc::new(HttpTransport::new());
    let opts = CrawlOptions {
        data_dir: data_dir.to_path_buf(),
        workers: usize::from(args.workers),
        delay: Duration::from_millis(args.delay),
        max_attempts: u32::from(args.max_attempts),
        format: args.format,
        force: args.force,
        progress: !quiet,
    };

    let mut total = CrawlReport::default();
    for conf in conferences {
        if cancel.is_cancelled() {
            break;
        }
        let Some(adapter) = build_adapter(conf.key, &ctx) else {
            error!(conference = conf.key, "no adapter registered");
            continue;
        };
        let years: Vec<u16> = if args.select.years.is_empty() {
            conf.years.to_vec()
        } else {
            args.select.years.clone()
        };

        info!(conference = conf.name, ?years, "downloading");
        let report =
            crawl_conference(adapter.as_ref(), &years, Arc::clone(&fetcher), &opts, cancel)
                .await?;
        total.any_failed |= report.any_failed;
        total.flush_failed |= report.flush_failed;
        total.stats = total.stats.merged(report.stats);
    }

    info!(
        succeeded = total.stats.succeeded,
        skipped = total.stats.skipped,
        failed = total.stats.failed,
        bytes = total.stats.bytes,
        "download complete"
    );

    if total.flush_failed {
        Ok(EXIT_FLUSH_FAILED)
    } else if total.any_failed {
        Ok(EXIT_PARTIAL)
    } else {
        Ok(0)
    }
}

async fn cmd_convert(data_dir: &Path, args: &ConvertArgs) -> Result<u8> {
    let conferences = selected_conferences(&args.select)?;
    let converter = Converter::new(
        args.converter.as_deref(),
        usize::from(args.workers),
        args.force,
    )?;

    let mut any_failed = false;
    for conf in conferences {
        let years: Vec<u16> = if args.select.years.is_empty() {
            conf.years.to_vec()
        } else {
            args.select.years.clone()
        };
        for year in years {
            let year_dir = data_dir.join(conf.dir_name).join(year.to_string());
            let summary = converter.convert_year(&year_dir).await?;
            any_failed |= summary.failed > 0;
        }
    }

    Ok(u8::from(any_failed))
}

fn print_status(data_dir: &Path) {
    println!("Conference paper status ({})", data_dir.display());
    println!("{}", "-".repeat(50));
    for conf in CONFERENCES {
        println!("\n{}:", conf.name);
        for &year in conf.years {
            let year_dir = data_dir.join(conf.dir_name).join(year.to_string());
            let pdfs = count_files(&year_dir.join("papers"), "pdf");
            let texts = count_files(&year_dir.join("text"), "txt");
            if pdfs == 0 {
                println!("  {year}: (not downloaded)");
            } else {
                println!("  {year}: {pdfs} papers, {texts} converted");
            }
        }
    }
    println!();
}

fn count_files(dir: &Path, extension: &str) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .filter(|e| e.path().extension().is_some_and(|ext| ext == extension))
                .count()
        })
        .unwrap_or(0)
}
