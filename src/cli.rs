//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

use harvester_core::fetch::{DEFAULT_CACHE_DIR, DEFAULT_MAX_ATTEMPTS};

/// Default question flow endpoint of the public archive.
pub const DEFAULT_BASE_URL: &str = "https://www.ap-siken.com/apkakomon.php";

/// Harvest exam past-questions into the seed JSON corpus.
///
/// The harvester walks each selected exam session's question flow,
/// extracts the questions, and accumulates them into a deduplicated,
/// resumable seed file.
#[derive(Parser, Debug)]
#[command(name = "harvester")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Path to the output seed JSON file
    #[arg(long)]
    pub out: PathBuf,

    /// Session selection: "all" or comma-separated labels (e.g. "令和7年春期,令和6年春期")
    #[arg(long, default_value = "all")]
    pub sessions: String,

    /// List available sessions discovered on the site and exit
    #[arg(long)]
    pub list_sessions: bool,

    /// Resume from the existing output file; skip already-scraped questions
    #[arg(long)]
    pub resume: bool,

    /// Replace same-id questions instead of skipping them
    #[arg(long)]
    pub prefer_new: bool,

    /// Maximum question number attempted per session
    #[arg(long, default_value_t = 80, value_parser = clap::value_parser!(u32).range(1..=400))]
    pub max_qno: u32,

    /// Disable the HTTP response cache (still throttles and retries)
    #[arg(long)]
    pub no_cache: bool,

    /// Directory for cached raw responses
    #[arg(long, default_value = DEFAULT_CACHE_DIR)]
    pub cache_dir: PathBuf,

    /// Seconds between requests (minimum spacing)
    #[arg(long, default_value_t = 1.0)]
    pub throttle: f64,

    /// Maximum attempts per request for transient failures (1-10)
    #[arg(short = 'r', long, default_value_t = DEFAULT_MAX_ATTEMPTS, value_parser = clap::value_parser!(u32).range(1..=10))]
    pub max_retries: u32,

    /// Disable saving request/response snapshots per step
    #[arg(long)]
    pub no_debug_pages: bool,

    /// Directory for debug page snapshots
    #[arg(long, default_value = "debug_pages")]
    pub debug_dir: PathBuf,

    /// Question flow endpoint (override for mirrors/testing)
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from([&["harvester", "--out", "seed.json"], args].concat())
            .expect("args parse")
    }

    #[test]
    fn test_cli_defaults() {
        let args = parse(&[]);
        assert_eq!(args.sessions, "all");
        assert_eq!(args.max_qno, 80);
        assert!(!args.no_cache);
        assert!(!args.resume);
        assert!(!args.prefer_new);
        assert!((args.throttle - 1.0).abs() < f64::EPSILON);
        assert_eq!(args.max_retries, 5);
        assert_eq!(args.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_cli_out_is_required() {
        let result = Args::try_parse_from(["harvester"]);
        assert!(result.is_err());
        assert_eq!(
            result.unwrap_err().kind(),
            clap::error::ErrorKind::MissingRequiredArgument
        );
    }

    #[test]
    fn test_cli_session_selection() {
        let args = parse(&["--sessions", "令和7年春期,令和6年春期"]);
        assert_eq!(args.sessions, "令和7年春期,令和6年春期");
    }

    #[test]
    fn test_cli_cache_and_snapshot_toggles() {
        let args = parse(&["--no-cache", "--no-debug-pages"]);
        assert!(args.no_cache);
        assert!(args.no_debug_pages);
    }

    #[test]
    fn test_cli_max_qno_zero_rejected() {
        let result = Args::try_parse_from(["harvester", "--out", "s.json", "--max-qno", "0"]);
        assert!(result.is_err());
        assert_eq!(
            result.unwrap_err().kind(),
            clap::error::ErrorKind::ValueValidation
        );
    }

    #[test]
    fn test_cli_max_retries_range() {
        let args = parse(&["-r", "3"]);
        assert_eq!(args.max_retries, 3);

        let result = Args::try_parse_from(["harvester", "--out", "s.json", "-r", "11"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_verbose_and_quiet() {
        let args = parse(&["-vv"]);
        assert_eq!(args.verbose, 2);

        let args = parse(&["-q"]);
        assert!(args.quiet);
    }
}
