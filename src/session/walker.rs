//! Session walker: drives one exam session through its question flow.
//!
//! # State machine
//!
//! ```text
//! STARTING -> STEPPING -> { ADVANCING, STALLED } -> STEPPING | DONE
//! ```
//!
//! STARTING fetches the landing page and extracts the site-issued session
//! id (fatal when absent). Each STEPPING iteration posts the step form and
//! classifies the response by the step marker naming the next one-based
//! question number: present means ADVANCING (extract records, capture the
//! next carry set), absent means STALLED (bounded retry with a fixed
//! pause, then abandon the step and move on). The walk always runs the
//! configured number of steps; the site never signals an early end.

use std::sync::LazyLock;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use regex::Regex;
use tracing::{debug, info, instrument, warn};

use crate::extract::QuestionExtractor;
use crate::fetch::{FetchClient, FetchRequest};
use crate::snapshot::{PageSnapshots, SnapshotKind};
use crate::store::{QuestionStore, UNKNOWN_ANSWER, stable_question_id};

use super::{CarrySet, SessionError, SessionMeta};

/// Attempts per step before it is abandoned (including the first).
const STALL_ATTEMPTS: u32 = 3;

/// Fixed pause between stall retries.
const STALL_PAUSE: Duration = Duration::from_secs(1);

/// Session id hidden-input pattern on the start page.
#[allow(clippy::expect_used)]
static SID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"name="sid" value="([a-f0-9]+)""#).expect("static pattern compiles")
});

/// Question-number marker as rendered on an advanced page.
#[allow(clippy::expect_used)]
static MARKER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"第(\d+)問").expect("static pattern compiles"));

/// Tuning knobs for one walk.
#[derive(Debug, Clone)]
pub struct WalkConfig {
    /// Steps attempted per session (question numbers `0..max_steps`).
    pub max_steps: u32,
    /// Attempts per step before abandoning it.
    pub stall_attempts: u32,
    /// Pause between stall retries.
    pub stall_pause: Duration,
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self {
            max_steps: 80,
            stall_attempts: STALL_ATTEMPTS,
            stall_pause: STALL_PAUSE,
        }
    }
}

impl WalkConfig {
    /// Creates a config with the given step cap and default retry tuning.
    #[must_use]
    pub fn with_max_steps(max_steps: u32) -> Self {
        Self {
            max_steps,
            ..Self::default()
        }
    }
}

/// Per-session outcome counts.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WalkReport {
    /// Steps whose response carried the expected marker.
    pub steps_advanced: usize,
    /// Steps abandoned after the stall-retry budget.
    pub steps_abandoned: usize,
    /// Records accepted by the store.
    pub records_accepted: usize,
    /// Records the store rejected (duplicates or invalid).
    pub records_skipped: usize,
}

/// Drives exam sessions through their sequential question flow.
///
/// Steps are strictly sequential: the carry set read by step N+1 is
/// exactly the one produced by step N's response, so no step is issued
/// before the previous response is fully processed.
pub struct SessionWalker<'a> {
    client: &'a FetchClient,
    extractor: &'a dyn QuestionExtractor,
    snapshots: &'a PageSnapshots,
    config: WalkConfig,
}

impl<'a> SessionWalker<'a> {
    /// Creates a walker over the given collaborators.
    #[must_use]
    pub fn new(
        client: &'a FetchClient,
        extractor: &'a dyn QuestionExtractor,
        snapshots: &'a PageSnapshots,
        config: WalkConfig,
    ) -> Self {
        Self {
            client,
            extractor,
            snapshots,
            config,
        }
    }

    /// Walks one session, emitting accepted records into `store`.
    ///
    /// Stalled steps are retried then abandoned without aborting the
    /// session; fetch failures inside a step count against the same stall
    /// budget. Only a missing session id (or an unfetchable start page)
    /// is fatal.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::MissingSid`] when the start page carries no
    /// session id, or [`SessionError::Fetch`] when it cannot be fetched.
    #[instrument(skip(self, store), fields(session = %meta.label, year = meta.year))]
    pub async fn walk(
        &self,
        meta: &SessionMeta,
        store: &mut QuestionStore,
    ) -> Result<WalkReport, SessionError> {
        // STARTING: the sid is a hard precondition, not retryable here.
        let start_page = self.client.fetch(FetchRequest::get(&meta.base_url)).await?;
        let sid = extract_sid(start_page.as_text().unwrap_or_default()).ok_or_else(|| {
            SessionError::MissingSid {
                label: meta.label.clone(),
            }
        })?;

        // Fixed for the whole session, captured once.
        let start_time = unix_seconds().to_string();
        info!(sid = %sid, start_time = %start_time, "session started");

        let mut carry = CarrySet::initial();
        let mut report = WalkReport::default();

        for qno in 0..self.config.max_steps {
            let cache_key = format!("{sid}-{qno}");
            let mut advanced = false;

            for attempt in 1..=self.config.stall_attempts {
                let request = FetchRequest::post(&meta.base_url)
                    .form(build_step_form(
                        &meta.times_code,
                        &sid,
                        qno,
                        &start_time,
                        &carry,
                    ))
                    .header("Referer", &meta.base_url)
                    .cache_key(&cache_key);

                let exchange = match self.client.fetch_exchange(request).await {
                    Ok(exchange) => exchange,
                    Err(error) => {
                        warn!(qno, attempt, error = %error, "step fetch failed");
                        self.pause_before_retry(attempt).await;
                        continue;
                    }
                };

                if let Some(body) = &exchange.request_body {
                    self.snapshots
                        .save(&meta.label, qno, SnapshotKind::Request, body);
                }

                let html = exchange.content.as_text().unwrap_or_default().to_string();
                self.snapshots
                    .save(&meta.label, qno, SnapshotKind::Response, &html);

                debug!(
                    qno,
                    attempt,
                    status = exchange.status,
                    len = html.len(),
                    page_no = page_number(&html),
                    "step response"
                );

                if !marker_present(&html, qno) {
                    // Still the config page: drop the cached body so the
                    // retry (or a later rerun) goes back to the network.
                    self.snapshots
                        .save(&meta.label, qno, SnapshotKind::Stalled, &html);
                    if let Err(error) = self.client.invalidate(&cache_key) {
                        warn!(qno, error = %error, "failed to invalidate stalled cache entry");
                    }
                    self.pause_before_retry(attempt).await;
                    continue;
                }

                self.handle_advancing(&html, qno, meta, store, &mut report);
                carry = CarrySet::from_page(&html).for_next_step();
                advanced = true;
                break;
            }

            if advanced {
                report.steps_advanced += 1;
            } else {
                // Best-effort recovery: move on with the carry set unchanged.
                warn!(
                    qno,
                    attempts = self.config.stall_attempts,
                    "step abandoned, continuing with previous carry tokens"
                );
                report.steps_abandoned += 1;
            }
        }

        info!(
            advanced = report.steps_advanced,
            abandoned = report.steps_abandoned,
            accepted = report.records_accepted,
            "session walk done"
        );
        Ok(report)
    }

    /// Extracts records off an advanced page and hands them to the store.
    fn handle_advancing(
        &self,
        html: &str,
        qno: u32,
        meta: &SessionMeta,
        store: &mut QuestionStore,
        report: &mut WalkReport,
    ) {
        let questions = self.extractor.extract(html, meta);
        if questions.is_empty() {
            // Soft failure: the page advanced but yielded nothing usable.
            warn!(qno, "extractor returned no questions");
            self.snapshots
                .save(&meta.label, qno, SnapshotKind::EmptyExtraction, html);
            return;
        }

        for mut question in questions {
            if question.id_str().is_none() {
                let sequence = store.next_sequence(meta.year);
                question.id = Some(stable_question_id(meta.year, sequence));
            }
            if question.answer_index == UNKNOWN_ANSWER {
                warn!(qno, id = ?question.id, "missing answer, keeping -1 sentinel");
            }
            if store.add(question) {
                report.records_accepted += 1;
            } else {
                report.records_skipped += 1;
            }
        }
    }

    /// Sleeps the fixed stall pause, except after the final attempt.
    async fn pause_before_retry(&self, attempt: u32) {
        if attempt < self.config.stall_attempts {
            tokio::time::sleep(self.config.stall_pause).await;
        }
    }
}

/// Extracts the site-issued session id from the start page.
#[must_use]
pub fn extract_sid(html: &str) -> Option<String> {
    SID_PATTERN
        .captures(html)
        .map(|captures| captures[1].to_string())
}

/// Returns whether the page advanced to the given zero-based step.
///
/// The marker names the one-based question number the page displays.
fn marker_present(html: &str, qno: u32) -> bool {
    html.contains(&format!("第{}問", qno + 1))
}

/// Returns whichever question number the page displays, for diagnostics.
fn page_number(html: &str) -> Option<u32> {
    MARKER_PATTERN
        .captures(html)
        .and_then(|captures| captures[1].parse().ok())
}

/// Builds the step's form body: session selector block, flow position,
/// and the carry tokens, in the exact field order the site expects.
#[must_use]
pub fn build_step_form(
    times_code: &str,
    sid: &str,
    qno: u32,
    start_time: &str,
    carry: &CarrySet,
) -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = Vec::with_capacity(40);
    let mut push = |key: &str, value: &str| pairs.push((key.to_string(), value.to_string()));

    push("times[]", times_code);
    // Fields interleave with their category ranges as per the captured payload.
    push("fields[]", "te_all");
    for category in 1..=13 {
        push("categories[]", &category.to_string());
    }
    push("fields[]", "ma_all");
    for category in 14..=16 {
        push("categories[]", &category.to_string());
    }
    push("fields[]", "st_all");
    for category in 17..=23 {
        push("categories[]", &category.to_string());
    }
    push("options[]", "timesFilter");
    push("moshi", "mix_all");
    push("moshi_cnt", "40");
    push("addition", "0");
    push("mode", "1");
    push("qno", &qno.to_string());
    push("sid", sid);
    push(
        "result",
        if carry.result.is_empty() {
            "-1"
        } else {
            carry.result.as_str()
        },
    );
    push("checkflag", "-1");
    push("startTime", start_time);
    push("_q", &carry.q);
    push("_r", &carry.r);
    push("_c", &carry.c);

    pairs
}

fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn value_of<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
        pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    // ==================== Form Layout Tests ====================

    #[test]
    fn test_form_starts_with_session_selector() {
        let form = build_step_form("07", "abc123", 0, "1700000000", &CarrySet::initial());
        assert_eq!(form[0], ("times[]".to_string(), "07".to_string()));
    }

    #[test]
    fn test_form_interleaves_fields_with_category_ranges() {
        let form = build_step_form("07", "abc123", 0, "1700000000", &CarrySet::initial());
        let keys: Vec<&str> = form.iter().map(|(k, _)| k.as_str()).collect();

        let fields: Vec<usize> = keys
            .iter()
            .enumerate()
            .filter(|(_, k)| **k == "fields[]")
            .map(|(i, _)| i)
            .collect();
        assert_eq!(fields.len(), 3);
        // 13 technology categories between the first and second field marker.
        assert_eq!(fields[1] - fields[0], 14);
        // 3 management categories between the second and third.
        assert_eq!(fields[2] - fields[1], 4);

        let categories = keys.iter().filter(|k| **k == "categories[]").count();
        assert_eq!(categories, 23);
    }

    #[test]
    fn test_form_carries_flow_position_and_tokens() {
        let carry = CarrySet {
            q: "Q".to_string(),
            r: "R".to_string(),
            c: "C".to_string(),
            result: "0".to_string(),
        };
        let form = build_step_form("07", "abc123", 5, "1700000000", &carry);

        assert_eq!(value_of(&form, "qno"), Some("5"));
        assert_eq!(value_of(&form, "sid"), Some("abc123"));
        assert_eq!(value_of(&form, "startTime"), Some("1700000000"));
        assert_eq!(value_of(&form, "result"), Some("0"));
        assert_eq!(value_of(&form, "checkflag"), Some("-1"));
        assert_eq!(value_of(&form, "_q"), Some("Q"));
        assert_eq!(value_of(&form, "_r"), Some("R"));
        assert_eq!(value_of(&form, "_c"), Some("C"));
    }

    #[test]
    fn test_form_empty_result_falls_back_to_minus_one() {
        let carry = CarrySet {
            q: String::new(),
            r: String::new(),
            c: String::new(),
            result: String::new(),
        };
        let form = build_step_form("07", "abc123", 0, "1700000000", &carry);
        assert_eq!(value_of(&form, "result"), Some("-1"));
    }

    // ==================== Marker Tests ====================

    #[test]
    fn test_extract_sid_finds_hex_token() {
        let html = r#"<form><input type="hidden" name="sid" value="deadbeef01"></form>"#;
        assert_eq!(extract_sid(html).as_deref(), Some("deadbeef01"));
    }

    #[test]
    fn test_extract_sid_absent() {
        assert_eq!(extract_sid("<html>no session here</html>"), None);
    }

    #[test]
    fn test_marker_is_one_based() {
        assert!(marker_present("<h3>第1問</h3>", 0));
        assert!(!marker_present("<h3>第1問</h3>", 1));
        assert!(marker_present("<h3>第12問</h3>", 11));
    }

    #[test]
    fn test_page_number_reports_displayed_question() {
        assert_eq!(page_number("<h3>第7問</h3>"), Some(7));
        assert_eq!(page_number("settings page"), None);
    }
}
