//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

use litgate_core::gateway::CacheTier;
use litgate_core::upstream::{DEFAULT_MAX_RESULTS, MAX_SEARCH_RESULTS};
use litgate_core::{AbstractMode, ExportFormat, FullTextMode, SortOrder};

/// Rate-limited literature metadata gateway.
///
/// Every command prints a JSON envelope (`success`, `message`, `data`) on
/// stdout; logs go to stderr.
#[derive(Parser, Debug)]
#[command(name = "litgate")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored log output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Pretty-print the JSON envelope
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Cache root directory
    #[arg(long, env = "LITGATE_CACHE_DIR", global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Directory that receives downloaded documents
    #[arg(long, env = "LITGATE_DOWNLOAD_DIR", global = true)]
    pub download_dir: Option<PathBuf>,

    /// Abstract length (short | long)
    #[arg(long, env = "LITGATE_ABSTRACT_MODE", global = true)]
    pub abstract_mode: Option<AbstractMode>,

    /// Full-text mode (disabled | enabled | auto)
    #[arg(long, env = "LITGATE_FULLTEXT_MODE", global = true)]
    pub fulltext_mode: Option<FullTextMode>,

    /// Enable citation export
    #[arg(long, global = true)]
    pub export: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Gateway operations.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Search by free-text query
    Search(SearchArgs),
    /// Fetch metadata for identifiers
    Fetch(IdsArgs),
    /// Fetch metadata plus open-access availability
    FetchFulltext(IdsArgs),
    /// Check open-access availability
    Detect(IdsArgs),
    /// Download one open-access document
    Download(DownloadArgs),
    /// Download several open-access documents, one at a time
    BatchDownload(BatchArgs),
    /// Render citations
    Export(ExportArgs),
    /// Show cache counters and ledger totals
    CacheStatus,
    /// Delete expired cache entries
    CacheClean,
    /// Empty a cache tier
    CacheClear(ClearArgs),
}

#[derive(ClapArgs, Debug)]
pub struct SearchArgs {
    /// Query text
    pub query: String,

    /// Maximum results (1-100)
    #[arg(short = 'n', long, default_value_t = DEFAULT_MAX_RESULTS, value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_SEARCH_RESULTS)))]
    pub max_results: u32,

    /// Only publications from the last N days
    #[arg(long)]
    pub days_back: Option<u32>,

    /// Ordering (relevance | pub_date | author | journal)
    #[arg(long, default_value = "relevance")]
    pub sort: SortOrder,
}

#[derive(ClapArgs, Debug)]
pub struct IdsArgs {
    /// Identifiers
    #[arg(required = true)]
    pub ids: Vec<String>,
}

#[derive(ClapArgs, Debug)]
pub struct DownloadArgs {
    /// Identifier
    pub id: String,

    /// Download again even if a copy is cached
    #[arg(long)]
    pub force: bool,
}

#[derive(ClapArgs, Debug)]
pub struct BatchArgs {
    /// Identifiers (at most 10)
    #[arg(required = true)]
    pub ids: Vec<String>,

    /// Download again even if copies are cached
    #[arg(long)]
    pub force: bool,
}

#[derive(ClapArgs, Debug)]
pub struct ExportArgs {
    /// Identifiers
    #[arg(required = true)]
    pub ids: Vec<String>,

    /// Citation format (ris | bibtex | plain)
    #[arg(short, long, default_value = "ris")]
    pub format: ExportFormat,
}

#[derive(ClapArgs, Debug)]
pub struct ClearArgs {
    /// Tier (memory | records | fulltext | exports | all)
    #[arg(default_value = "all")]
    pub tier: CacheTier,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_search_defaults() {
        let args = Args::try_parse_from(["litgate", "search", "crispr"]).unwrap();
        let Command::Search(search) = args.command else {
            panic!("expected search");
        };
        assert_eq!(search.query, "crispr");
        assert_eq!(search.max_results, 10);
        assert_eq!(search.sort, SortOrder::Relevance);
        assert!(search.days_back.is_none());
    }

    #[test]
    fn test_cli_verbose_flag_is_global() {
        let args = Args::try_parse_from(["litgate", "cache-status", "-vv"]).unwrap();
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn test_cli_max_results_over_cap_rejected() {
        let err = Args::try_parse_from(["litgate", "search", "x", "-n", "101"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_fetch_requires_ids() {
        let err = Args::try_parse_from(["litgate", "fetch"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_cli_export_format_and_modes() {
        let args = Args::try_parse_from([
            "litgate",
            "--fulltext-mode",
            "auto",
            "--export",
            "export",
            "1",
            "2",
            "-f",
            "bibtex",
        ])
        .unwrap();
        assert_eq!(args.fulltext_mode, Some(FullTextMode::Auto));
        assert!(args.export);
        let Command::Export(export) = args.command else {
            panic!("expected export");
        };
        assert_eq!(export.ids, vec!["1", "2"]);
        assert_eq!(export.format, ExportFormat::Bibtex);
    }

    #[test]
    fn test_cli_cache_clear_tier() {
        let args = Args::try_parse_from(["litgate", "cache-clear"]).unwrap();
        let Command::CacheClear(clear) = args.command else {
            panic!("expected cache-clear");
        };
        assert_eq!(clear.tier, CacheTier::All);

        let err = Args::try_parse_from(["litgate", "cache-clear", "disk"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_unknown_subcommand_rejected() {
        let err = Args::try_parse_from(["litgate", "frobnicate"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidSubcommand);
    }
}
