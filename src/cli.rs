//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::{DEFAULT_DELAY_MS, DEFAULT_WORKERS};
use crate::convert::DEFAULT_CONVERT_WORKERS;
use crate::fetch::DEFAULT_MAX_ATTEMPTS;
use crate::metadata::MetadataFormat;

/// Crawl, download, and organize academic conference papers.
#[derive(Parser, Debug)]
#[command(name = "confcrawl")]
#[command(author, version, about)]
pub struct Cli {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Root directory for downloaded data
    #[arg(long, global = true, default_value = ".")]
    pub data_dir: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Discover and download papers
    Download(DownloadArgs),
    /// Convert downloaded PDFs to text
    Convert(ConvertArgs),
    /// Download, then convert
    Run(RunArgs),
    /// Show per-conference download and conversion counts
    Status,
}

/// Conference/year selection shared by the crawling subcommands.
#[derive(Args, Debug, Clone)]
pub struct SelectArgs {
    /// Conference to process (usenix, ndss, ieee_sp, acm_ccs)
    #[arg(short, long)]
    pub conference: Option<String>,

    /// Years to process (defaults to the conference's known years)
    #[arg(short, long, num_args = 1..)]
    pub years: Vec<u16>,

    /// Process every supported conference
    #[arg(long, conflicts_with = "conference")]
    pub all: bool,
}

/// Download-specific flags.
#[derive(Args, Debug, Clone)]
pub struct DownloadArgs {
    #[command(flatten)]
    pub select: SelectArgs,

    /// Maximum concurrent downloads (1-100)
    #[arg(short, long, default_value_t = DEFAULT_WORKERS as u8, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub workers: u8,

    /// Minimum delay between requests to the same host in milliseconds
    /// (0 to disable, max 60000)
    #[arg(short, long, default_value_t = DEFAULT_DELAY_MS, value_parser = clap::value_parser!(u64).range(0..=60000))]
    pub delay: u64,

    /// Maximum attempts per URL (1-10)
    #[arg(short = 'r', long, default_value_t = DEFAULT_MAX_ATTEMPTS as u8, value_parser = clap::value_parser!(u8).range(1..=10))]
    pub max_attempts: u8,

    /// Metadata output format
    #[arg(short, long, value_enum, default_value_t = MetadataFormat::Csv)]
    pub format: MetadataFormat,

    /// Re-download over existing artifacts
    #[arg(long)]
    pub force: bool,

    /// Use a FlareSolverr instance for anti-bot cookie bootstrap
    #[arg(long)]
    pub flaresolverr: bool,

    /// FlareSolverr endpoint
    #[arg(long, default_value = crate::services::flaresolverr::DEFAULT_FLARESOLVERR_URL)]
    pub flaresolverr_url: String,
}

/// Convert-specific flags.
#[derive(Args, Debug, Clone)]
pub struct ConvertArgs {
    #[command(flatten)]
    pub select: SelectArgs,

    /// Maximum concurrent conversions
    #[arg(short, long, default_value_t = DEFAULT_CONVERT_WORKERS as u8, value_parser = clap::value_parser!(u8).range(1..=32))]
    pub workers: u8,

    /// Converter binary to invoke as `<bin> input.pdf output.txt`
    #[arg(long)]
    pub converter: Option<String>,

    /// Re-convert files whose output already exists
    #[arg(long)]
    pub force: bool,
}

/// `run` = download then convert.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub download: DownloadArgs,

    /// Maximum concurrent conversions
    #[arg(long, default_value_t = DEFAULT_CONVERT_WORKERS as u8, value_parser = clap::value_parser!(u8).range(1..=32))]
    pub convert_workers: u8,

    /// Converter binary to invoke as `<bin> input.pdf output.txt`
    #[arg(long)]
    pub converter: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_download_defaults() {
        let cli = parse(&["confcrawl", "download", "-c", "ndss"]);
        let Command::Download(args) = cli.command else {
            panic!("expected download");
        };
        assert_eq!(args.select.conference.as_deref(), Some("ndss"));
        assert!(args.select.years.is_empty());
        assert_eq!(args.workers, 5);
        assert_eq!(args.delay, 1000);
        assert_eq!(args.max_attempts, 5);
        assert_eq!(args.format, MetadataFormat::Csv);
        assert!(!args.force);
    }

    #[test]
    fn test_download_years_list() {
        let cli = parse(&[
            "confcrawl", "download", "-c", "usenix", "-y", "2024", "2023",
        ]);
        let Command::Download(args) = cli.command else {
            panic!("expected download");
        };
        assert_eq!(args.select.years, vec![2024, 2023]);
    }

    #[test]
    fn test_all_conflicts_with_conference() {
        let result = Cli::try_parse_from(["confcrawl", "download", "-c", "ndss", "--all"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_workers_range_enforced() {
        assert!(Cli::try_parse_from(["confcrawl", "download", "--all", "-w", "0"]).is_err());
        assert!(Cli::try_parse_from(["confcrawl", "download", "--all", "-w", "101"]).is_err());
        let cli = parse(&["confcrawl", "download", "--all", "-w", "100"]);
        let Command::Download(args) = cli.command else {
            panic!("expected download");
        };
        assert_eq!(args.workers, 100);
    }

    #[test]
    fn test_delay_zero_allowed() {
        let cli = parse(&["confcrawl", "download", "--all", "-d", "0"]);
        let Command::Download(args) = cli.command else {
            panic!("expected download");
        };
        assert_eq!(args.delay, 0);
    }

    #[test]
    fn test_format_values() {
        for (value, expected) in [
            ("csv", MetadataFormat::Csv),
            ("json", MetadataFormat::Json),
            ("txt", MetadataFormat::Txt),
            ("all", MetadataFormat::All),
        ] {
            let cli = parse(&["confcrawl", "download", "--all", "-f", value]);
            let Command::Download(args) = cli.command else {
                panic!("expected download");
            };
            assert_eq!(args.format, expected, "format {value}");
        }
    }

    #[test]
    fn test_run_combines_download_and_convert() {
        let cli = parse(&[
            "confcrawl",
            "run",
            "-c",
            "ndss",
            "--force",
            "--converter",
            "mytool",
        ]);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert!(args.download.force);
        assert_eq!(args.converter.as_deref(), Some("mytool"));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = parse(&["confcrawl", "status", "-v", "--data-dir", "/tmp/papers"]);
        assert_eq!(cli.verbose, 1);
        assert_eq!(cli.data_dir, PathBuf::from("/tmp/papers"));
    }

    #[test]
    fn test_help_flag() {
        let result = Cli::try_parse_from(["confcrawl", "--help"]);
        assert_eq!(
            result.unwrap_err().kind(),
            clap::error::ErrorKind::DisplayHelp
        );
    }
}
