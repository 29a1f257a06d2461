//! CLI entry point for the harvester tool.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use harvester_core::{
    ExamPageExtractor, FetchClient, FetchConfig, PageSnapshots, QuestionStore, RetryPolicy, Seed,
    SessionMeta, SessionWalker, WalkConfig, discover_sessions,
};
use tracing::{debug, info, warn};

mod cli;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Determine log level based on verbose/quiet flags
    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");
    info!("Harvester starting");

    let client = FetchClient::new(FetchConfig {
        cache_enabled: !args.no_cache,
        cache_dir: args.cache_dir.clone(),
        throttle: Duration::from_secs_f64(args.throttle.max(0.0)),
        retry: RetryPolicy::with_max_attempts(args.max_retries),
        ..FetchConfig::default()
    })?;

    let discovered = discover_sessions(&client, &args.base_url)
        .await
        .context("failed to discover sessions from the landing page")?;

    if args.list_sessions {
        info!(count = discovered.len(), "Discovered sessions");
        for session in &discovered {
            info!(
                label = %session.label,
                code = %session.times_code,
                year = session.year,
                "session"
            );
        }
        return Ok(());
    }

    let selected = resolve_sessions(&args.sessions, discovered)?;
    info!(sessions = selected.len(), "Session selection resolved");

    let mut store = QuestionStore::with_prefer_new(args.prefer_new);
    if args.resume && args.out.exists() {
        info!(path = %args.out.display(), "Resuming from existing output");
        let seed = Seed::read(&args.out).context("failed to load existing seed for resume")?;
        store.load_existing(seed);
    }

    let extractor = ExamPageExtractor::new();
    let snapshots = PageSnapshots::new(args.debug_dir.clone(), !args.no_debug_pages);
    let walker = SessionWalker::new(
        &client,
        &extractor,
        &snapshots,
        WalkConfig::with_max_steps(args.max_qno),
    );

    // Sessions are walked strictly one after another: the store and the
    // throttle clock are shared, and the site keys its flow to one sid at
    // a time.
    for session in &selected {
        info!(session = %session.label, year = session.year, "==> walking session");
        let report = walker.walk(session, &mut store).await?;
        store.record_source_session(&session.label);
        if report.steps_abandoned > 0 {
            warn!(
                session = %session.label,
                abandoned = report.steps_abandoned,
                "some steps were abandoned after retries"
            );
        }
    }

    store
        .persist(&args.out)
        .context("failed to write seed output")?;

    let stats = store.stats();
    info!(total = stats.total, path = %args.out.display(), "Harvest complete");
    for (year, count) in &stats.per_year {
        info!(year, count, "per-year");
    }
    for (category, count) in &stats.per_category {
        info!(category = %category, count, "per-category");
    }

    Ok(())
}

/// Resolves the `--sessions` selection against the discovered list.
///
/// "all" keeps every discovered session; otherwise the comma-separated
/// labels must all exist (unknown labels abort before any crawling).
fn resolve_sessions(selection: &str, discovered: Vec<SessionMeta>) -> Result<Vec<SessionMeta>> {
    if selection.eq_ignore_ascii_case("all") {
        if discovered.is_empty() {
            bail!("no sessions discovered on the landing page");
        }
        return Ok(discovered);
    }

    let labels: Vec<&str> = selection
        .split(',')
        .map(str::trim)
        .filter(|label| !label.is_empty())
        .collect();

    let missing: Vec<&str> = labels
        .iter()
        .copied()
        .filter(|label| !discovered.iter().any(|s| &s.label == label))
        .collect();
    if !missing.is_empty() {
        bail!("unknown sessions: {}", missing.join(", "));
    }

    Ok(labels
        .into_iter()
        .filter_map(|label| discovered.iter().find(|s| s.label == label).cloned())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(label: &str) -> SessionMeta {
        SessionMeta {
            label: label.to_string(),
            year: 2025,
            times_code: "07".to_string(),
            base_url: "https://example.com".to_string(),
        }
    }

    #[test]
    fn test_resolve_all_keeps_discovered_order() {
        let discovered = vec![meta("a"), meta("b")];
        let resolved = resolve_sessions("all", discovered.clone()).unwrap();
        assert_eq!(resolved, discovered);
    }

    #[test]
    fn test_resolve_by_label_follows_selection_order() {
        let discovered = vec![meta("a"), meta("b"), meta("c")];
        let resolved = resolve_sessions("c, a", discovered).unwrap();
        let labels: Vec<_> = resolved.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, vec!["c", "a"]);
    }

    #[test]
    fn test_resolve_unknown_label_fails() {
        let result = resolve_sessions("nope", vec![meta("a")]);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("nope"));
    }

    #[test]
    fn test_resolve_all_with_nothing_discovered_fails() {
        assert!(resolve_sessions("all", Vec::new()).is_err());
    }
}
