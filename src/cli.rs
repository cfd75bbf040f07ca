//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use ads_downloader_core::filter::{DatePreset, FilterCriteria, MediaFilter, StatusFilter};
use ads_downloader_core::tree::Rect;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};

/// Find ads in a saved ad-library page and download their media.
#[derive(Parser, Debug)]
#[command(name = "ads-downloader")]
#[command(author, version, about)]
pub struct Cli {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (defaults to $XDG_CONFIG_HOME/ads-downloader/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Settings database; without it settings live in memory for this run
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// List detected ads and their metadata
    Scan(ScanArgs),
    /// Download media of every ad passing the filter
    Download(DownloadArgs),
    /// Print filter statistics as JSON
    Stats(SnapshotArgs),
}

#[derive(Args, Debug, Clone)]
pub struct SnapshotArgs {
    /// Saved HTML page
    pub snapshot: PathBuf,

    /// Viewport size as WIDTHxHEIGHT
    #[arg(long, default_value = "1280x800", value_parser = parse_viewport)]
    pub viewport: Rect,

    /// Also render affordances on ads outside the viewport
    #[arg(long)]
    pub include_offscreen: bool,

    /// Date used when an ad shows no start date (YYYY-MM-DD)
    #[arg(long)]
    pub today: Option<NaiveDate>,
}

#[derive(Args, Debug, Clone)]
pub struct ScanArgs {
    #[command(flatten)]
    pub snapshot: SnapshotArgs,

    #[command(flatten)]
    pub filter: FilterArgs,

    /// Emit one JSON object per ad instead of text
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct DownloadArgs {
    #[command(flatten)]
    pub snapshot: SnapshotArgs,

    #[command(flatten)]
    pub filter: FilterArgs,

    /// Output directory (overrides config and saved preferences)
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Skip pacing delays between transfers
    #[arg(long)]
    pub no_delay: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    /// Keep ads with this media kind
    #[arg(long, value_enum, default_value_t = MediaArg::All)]
    pub media: MediaArg,

    /// Keep ads with this status
    #[arg(long, value_enum, default_value_t = StatusArg::All)]
    pub status: StatusArg,

    /// Case-insensitive brand or account substring
    #[arg(long)]
    pub brand: Option<String>,

    /// Relative date window
    #[arg(long, value_enum, conflicts_with_all = ["since", "until"])]
    pub date_preset: Option<DatePresetArg>,

    /// Earliest start date, inclusive (YYYY-MM-DD)
    #[arg(long)]
    pub since: Option<NaiveDate>,

    /// Latest start date, inclusive (YYYY-MM-DD)
    #[arg(long)]
    pub until: Option<NaiveDate>,
}

impl FilterArgs {
    #[must_use]
    pub fn criteria(&self) -> FilterCriteria {
        let date_filter = match (self.date_preset, self.since, self.until) {
            (Some(preset), _, _) => preset.into(),
            (None, None, None) => DatePreset::All,
            (None, _, _) => DatePreset::Custom,
        };
        FilterCriteria {
            date_filter,
            start_date: self.since,
            end_date: self.until,
            media_filter: self.media.into(),
            status_filter: self.status.into(),
            brand_filter: self.brand.clone().unwrap_or_default(),
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MediaArg {
    #[default]
    All,
    Video,
    Image,
}

impl From<MediaArg> for MediaFilter {
    fn from(value: MediaArg) -> Self {
        match value {
            MediaArg::All => Self::All,
            MediaArg::Video => Self::Video,
            MediaArg::Image => Self::Image,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusArg {
    #[default]
    All,
    Active,
    Inactive,
}

impl From<StatusArg> for StatusFilter {
    fn from(value: StatusArg) -> Self {
        match value {
            StatusArg::All => Self::All,
            StatusArg::Active => Self::Active,
            StatusArg::Inactive => Self::Inactive,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatePresetArg {
    Today,
    Week,
    Month,
    #[value(name = "3months")]
    ThreeMonths,
}

impl From<DatePresetArg> for DatePreset {
    fn from(value: DatePresetArg) -> Self {
        match value {
            DatePresetArg::Today => Self::Today,
            DatePresetArg::Week => Self::Week,
            DatePresetArg::Month => Self::Month,
            DatePresetArg::ThreeMonths => Self::ThreeMonths,
        }
    }
}

fn parse_viewport(raw: &str) -> Result<Rect, String> {
    let (width, height) = raw
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{raw}'"))?;
    let parse = |value: &str| {
        value
            .trim()
            .parse::<u32>()
            .ok()
            .filter(|v| *v > 0)
            .ok_or_else(|| format!("invalid viewport dimension '{value}'"))
    };
    Ok(Rect::new(
        0.0,
        0.0,
        f64::from(parse(width)?),
        f64::from(parse(height)?),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_scan_defaults() {
        let cli = Cli::try_parse_from(["ads-downloader", "scan", "page.html"]).unwrap();
        assert_eq!(cli.verbose, 0);
        assert!(!cli.quiet);
        let CliCommand::Scan(args) = cli.command else {
            panic!("expected scan");
        };
        assert_eq!(args.snapshot.viewport, Rect::new(0.0, 0.0, 1280.0, 800.0));
        assert!(!args.snapshot.include_offscreen);
        assert!(args.filter.criteria().is_neutral());
    }

    #[test]
    fn test_cli_verbose_flag_is_global() {
        let cli = Cli::try_parse_from(["ads-downloader", "stats", "p.html", "-vv"]).unwrap();
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_cli_filter_flags_build_criteria() {
        let cli = Cli::try_parse_from([
            "ads-downloader",
            "download",
            "page.html",
            "--media",
            "video",
            "--status",
            "active",
            "--brand",
            "acme",
            "--since",
            "2024-01-01",
            "-o",
            "out",
        ])
        .unwrap();
        let CliCommand::Download(args) = cli.command else {
            panic!("expected download");
        };
        let criteria = args.filter.criteria();
        assert_eq!(criteria.date_filter, DatePreset::Custom);
        assert_eq!(criteria.media_filter, MediaFilter::Video);
        assert_eq!(criteria.status_filter, StatusFilter::Active);
        assert_eq!(criteria.brand_filter, "acme");
        assert_eq!(args.output_dir, Some(PathBuf::from("out")));
    }

    #[test]
    fn test_cli_date_preset_conflicts_with_since() {
        let result = Cli::try_parse_from([
            "ads-downloader",
            "scan",
            "p.html",
            "--date-preset",
            "week",
            "--since",
            "2024-01-01",
        ]);
        assert_eq!(
            result.unwrap_err().kind(),
            clap::error::ErrorKind::ArgumentConflict
        );
    }

    #[test]
    fn test_cli_three_month_preset_name() {
        let cli =
            Cli::try_parse_from(["ads-downloader", "scan", "p.html", "--date-preset", "3months"])
                .unwrap();
        let CliCommand::Scan(args) = cli.command else {
            panic!("expected scan");
        };
        assert_eq!(args.filter.criteria().date_filter, DatePreset::ThreeMonths);
    }

    #[test]
    fn test_cli_bad_viewport_rejected() {
        let result =
            Cli::try_parse_from(["ads-downloader", "scan", "p.html", "--viewport", "wide"]);
        assert_eq!(
            result.unwrap_err().kind(),
            clap::error::ErrorKind::ValueValidation
        );
    }

    #[test]
    fn test_cli_requires_subcommand() {
        let result = Cli::try_parse_from(["ads-downloader"]);
        assert!(result.is_err());
    }
}
