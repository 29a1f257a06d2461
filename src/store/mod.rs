//! Question store: validation, dedup, sequence counters, persistence, merge.
//!
//! The store owns the in-memory working set of accepted questions for one
//! run and is the sole writer of the persisted seed file for that run.
//!
//! # Overview
//!
//! The store system consists of:
//! - [`Question`] - Individual record with a single validation gatekeeper
//! - [`QuestionStore`] - Deduplicating working set with per-year counters
//! - [`Seed`] - The persisted corpus format
//! - [`merge_seed_files`] - Repairing merge of two seed files
//! - [`StoreError`] - Operation error types
//!
//! # Example
//!
//! ```
//! use harvester_core::store::{QuestionStore, stable_question_id};
//!
//! let mut store = QuestionStore::new();
//! let seq = store.next_sequence(2024);
//! let id = stable_question_id(2024, seq);
//! assert_eq!(id, "ap-2024-q001");
//! ```

mod error;
mod merge;
mod question;
mod seed;

pub use error::{MISSING_ID, StoreError};
pub use merge::{MergeReport, merge_seed_files};
pub use question::{
    Question, UNKNOWN_ANSWER, content_fingerprint, stable_question_id, validate_question,
};
pub use seed::{SEED_VERSION, Seed, SeedDocument, write_seed_atomic};

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use chrono::{SecondsFormat, Utc};
use tracing::{debug, info, instrument, warn};

/// Aggregate counts for the end-of-run summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    /// Total accepted questions.
    pub total: usize,
    /// Question count per exam year.
    pub per_year: BTreeMap<i32, usize>,
    /// Question count per category.
    pub per_category: BTreeMap<String, usize>,
}

/// Deduplicating working set of questions.
///
/// Dedup happens along two independent axes: by id (re-scraping the same
/// step twice) and by content fingerprint (the extractor assigning
/// divergent ids to the same question). Records loaded from an existing
/// seed are never dropped retroactively; their fingerprints only guard
/// subsequent adds.
#[derive(Debug)]
pub struct QuestionStore {
    /// Replace same-id records instead of skipping them.
    prefer_new: bool,

    /// Seed metadata carried from a loaded corpus.
    version: u32,
    generated_at: Option<String>,
    source_sessions: Option<Vec<String>>,

    /// Output order: loaded ids first (original order), then insertion order.
    order: Vec<String>,
    by_id: HashMap<String, Question>,

    /// Content fingerprints guarding adds.
    content_seen: HashSet<String>,

    /// Per-year sequence counters for synthesized ids.
    sequences: HashMap<i32, u32>,

    added: usize,
    replaced: usize,
    skipped: usize,
}

impl Default for QuestionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl QuestionStore {
    /// Creates an empty store that skips duplicate ids.
    #[must_use]
    pub fn new() -> Self {
        Self {
            prefer_new: false,
            version: SEED_VERSION,
            generated_at: None,
            source_sessions: None,
            order: Vec::new(),
            by_id: HashMap::new(),
            content_seen: HashSet::new(),
            sequences: HashMap::new(),
            added: 0,
            replaced: 0,
            skipped: 0,
        }
    }

    /// Creates an empty store with the given id-collision policy.
    #[must_use]
    pub fn with_prefer_new(prefer_new: bool) -> Self {
        Self {
            prefer_new,
            ..Self::new()
        }
    }

    /// Seeds the working set from a previously persisted corpus.
    ///
    /// Record order is preserved so rerun output diffs stay stable.
    /// Loaded records are not content-deduped against each other; their
    /// fingerprints are only registered to guard later adds. Records
    /// without an id cannot be indexed and are dropped with a warning.
    #[instrument(skip(self, seed), fields(questions = seed.questions.len()))]
    pub fn load_existing(&mut self, seed: Seed) {
        self.version = seed.version;
        self.generated_at = seed.generated_at;
        self.source_sessions = seed.source_sessions;

        for question in seed.questions {
            let Some(id) = question.id_str().map(str::to_string) else {
                warn!("dropping existing question without id");
                continue;
            };
            self.content_seen.insert(content_fingerprint(&question));
            if self.by_id.insert(id.clone(), question).is_none() {
                self.order.push(id);
            }
        }

        info!(loaded = self.order.len(), "resumed from existing seed");
    }

    /// Adds a candidate question, returning whether it was accepted.
    ///
    /// Invalid candidates are rejected with a warning. Valid candidates are
    /// rejected when their id already exists (unless `prefer_new`, which
    /// replaces in place) or when their content fingerprint has been seen.
    pub fn add(&mut self, question: Question) -> bool {
        if let Err(error) = validate_question(&question) {
            warn!(error = %error, "rejecting invalid question");
            self.skipped += 1;
            return false;
        }
        let Some(id) = question.id_str().map(str::to_string) else {
            // Unreachable: validation requires an id.
            self.skipped += 1;
            return false;
        };

        let fingerprint = content_fingerprint(&question);

        if self.by_id.contains_key(&id) {
            if self.prefer_new {
                self.by_id.insert(id.clone(), question);
                self.content_seen.insert(fingerprint);
                self.replaced += 1;
                debug!(id, "replaced existing question");
                return true;
            }
            debug!(id, "skipping duplicate id");
            self.skipped += 1;
            return false;
        }

        if self.content_seen.contains(&fingerprint) {
            debug!(id, "skipping duplicate content");
            self.skipped += 1;
            return false;
        }

        self.content_seen.insert(fingerprint);
        self.order.push(id.clone());
        self.by_id.insert(id, question);
        self.added += 1;
        true
    }

    /// Returns all questions: loaded records first in their original order,
    /// then newly added records in insertion order.
    #[must_use]
    pub fn all_questions(&self) -> Vec<&Question> {
        self.order
            .iter()
            .filter_map(|id| self.by_id.get(id))
            .collect()
    }

    /// Returns the next sequence number for a year, starting at 1.
    ///
    /// Counters are independent per year and scoped to this store instance.
    pub fn next_sequence(&mut self, year: i32) -> u32 {
        let counter = self.sequences.entry(year).or_insert(0);
        *counter += 1;
        *counter
    }

    /// Records a session label into the seed's `sourceSessions` metadata.
    pub fn record_source_session(&mut self, label: &str) {
        let sessions = self.source_sessions.get_or_insert_with(Vec::new);
        if !sessions.iter().any(|s| s == label) {
            sessions.push(label.to_string());
        }
    }

    /// Number of questions accepted as new by [`add`](Self::add).
    #[must_use]
    pub fn added(&self) -> usize {
        self.added
    }

    /// Number of questions that replaced a same-id record.
    #[must_use]
    pub fn replaced(&self) -> usize {
        self.replaced
    }

    /// Number of rejected candidates (invalid or duplicate).
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Builds the seed snapshot of the current working set.
    #[must_use]
    pub fn to_seed(&self) -> Seed {
        Seed {
            version: self.version,
            questions: self.all_questions().into_iter().cloned().collect(),
            generated_at: self.generated_at.clone(),
            source_sessions: self.source_sessions.clone(),
        }
    }

    /// Validates every record and writes the seed atomically.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] if any record violates an
    /// invariant (nothing is written), or [`StoreError::Write`] on IO
    /// failures. Persistence must never write invalid data.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub fn persist(&self, path: &Path) -> Result<(), StoreError> {
        let mut seed = self.to_seed();
        for question in &seed.questions {
            validate_question(question)?;
        }
        seed.generated_at = Some(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true));
        write_seed_atomic(path, &seed)
    }

    /// Computes total / per-year / per-category counts.
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        let mut per_year: BTreeMap<i32, usize> = BTreeMap::new();
        let mut per_category: BTreeMap<String, usize> = BTreeMap::new();
        for question in self.by_id.values() {
            *per_year.entry(question.year).or_default() += 1;
            *per_category.entry(question.category.clone()).or_default() += 1;
        }
        StoreStats {
            total: self.by_id.len(),
            per_year,
            per_category,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::question::tests::sample_question;
    use super::*;

    // ==================== Dedup Tests ====================

    #[test]
    fn test_add_accepts_valid_question() {
        let mut store = QuestionStore::new();
        assert!(store.add(sample_question("ap-2024-q001", 2024)));
        assert_eq!(store.all_questions().len(), 1);
        assert_eq!(store.added(), 1);
    }

    #[test]
    fn test_add_same_record_twice_is_idempotent() {
        let mut store = QuestionStore::new();
        let q = sample_question("ap-2024-q001", 2024);

        assert!(store.add(q.clone()));
        assert!(!store.add(q.clone()));

        let all = store.all_questions();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0], &q);
        assert_eq!(store.skipped(), 1);
    }

    #[test]
    fn test_add_rejects_same_content_under_different_id() {
        let mut store = QuestionStore::new();
        let a = sample_question("ap-2024-q001", 2024);
        let mut b = a.clone();
        b.id = Some("ap-2024-q777".to_string());

        assert!(store.add(a));
        assert!(!store.add(b));
        assert_eq!(store.all_questions().len(), 1);
    }

    #[test]
    fn test_prefer_new_replaces_in_place() {
        let mut store = QuestionStore::with_prefer_new(true);
        let mut first = sample_question("ap-2024-q001", 2024);
        first.answer_index = 1;
        let mut second = sample_question("ap-2024-q001", 2024);
        second.answer_index = 2;

        assert!(store.add(first));
        assert!(store.add(second));

        let all = store.all_questions();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].answer_index, 2);
        assert_eq!(store.replaced(), 1);
    }

    #[test]
    fn test_without_prefer_new_first_write_wins() {
        let mut store = QuestionStore::new();
        let mut first = sample_question("ap-2024-q001", 2024);
        first.answer_index = 1;
        let mut second = sample_question("ap-2024-q001", 2024);
        second.answer_index = 2;

        assert!(store.add(first));
        assert!(!store.add(second));
        assert_eq!(store.all_questions()[0].answer_index, 1);
    }

    #[test]
    fn test_add_rejects_invalid_question() {
        let mut store = QuestionStore::new();
        let mut q = sample_question("ap-2024-q001", 2024);
        q.choices = Vec::new();
        assert!(!store.add(q));
        assert!(store.all_questions().is_empty());
        assert_eq!(store.skipped(), 1);
    }

    // ==================== Ordering Tests ====================

    #[test]
    fn test_existing_records_come_first() {
        let mut store = QuestionStore::new();
        let mut seed = Seed::empty();
        seed.questions = vec![
            sample_question("ap-2023-q002", 2023),
            sample_question("ap-2023-q001", 2023),
        ];
        store.load_existing(seed);

        store.add(sample_question("ap-2024-q001", 2024));

        let ids: Vec<_> = store
            .all_questions()
            .iter()
            .map(|q| q.id.clone().unwrap())
            .collect();
        assert_eq!(ids, vec!["ap-2023-q002", "ap-2023-q001", "ap-2024-q001"]);
    }

    #[test]
    fn test_load_existing_does_not_retroactively_content_dedup() {
        let a = sample_question("ap-2023-q001", 2023);
        let mut b = a.clone();
        b.id = Some("ap-2023-q099".to_string());

        let mut seed = Seed::empty();
        seed.questions = vec![a.clone(), b];

        let mut store = QuestionStore::new();
        store.load_existing(seed);
        // Both loaded duplicates survive.
        assert_eq!(store.all_questions().len(), 2);

        // But a new add with the same content is caught.
        let mut c = a;
        c.id = Some("ap-2024-q500".to_string());
        assert!(!store.add(c));
    }

    // ==================== Sequence Tests ====================

    #[test]
    fn test_sequences_start_at_one_and_increase() {
        let mut store = QuestionStore::new();
        assert_eq!(store.next_sequence(2024), 1);
        assert_eq!(store.next_sequence(2024), 2);
        assert_eq!(store.next_sequence(2024), 3);
    }

    #[test]
    fn test_sequences_are_independent_per_year() {
        let mut store = QuestionStore::new();
        assert_eq!(store.next_sequence(2024), 1);
        assert_eq!(store.next_sequence(2025), 1);
        assert_eq!(store.next_sequence(2024), 2);
    }

    #[test]
    fn test_sequences_are_instance_scoped() {
        let mut a = QuestionStore::new();
        let mut b = QuestionStore::new();
        a.next_sequence(2024);
        assert_eq!(b.next_sequence(2024), 1);
    }

    // ==================== Persistence Tests ====================

    #[test]
    fn test_persist_stamps_generated_at() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("seed.json");
        let mut store = QuestionStore::new();
        store.add(sample_question("ap-2024-q001", 2024));
        store.persist(&path).unwrap();

        let loaded = Seed::read(&path).unwrap();
        assert_eq!(loaded.questions.len(), 1);
        assert!(loaded.generated_at.is_some());
    }

    #[test]
    fn test_persist_refuses_invalid_loaded_record() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("seed.json");

        // A loaded record can carry an invariant violation; persist is the
        // backstop that refuses to write it.
        let mut bad = sample_question("ap-2023-q001", 2023);
        bad.answer_index = 99;
        let mut seed = Seed::empty();
        seed.questions = vec![bad];

        let mut store = QuestionStore::new();
        store.load_existing(seed);

        assert!(matches!(
            store.persist(&path),
            Err(StoreError::Validation { .. })
        ));
        assert!(!path.exists());
    }

    // ==================== Stats Tests ====================

    #[test]
    fn test_stats_counts_by_year_and_category() {
        let mut store = QuestionStore::new();
        store.add(sample_question("ap-2024-q001", 2024));
        store.add(sample_question("ap-2024-q002", 2024));
        store.add(sample_question("ap-2023-q001", 2023));

        let stats = store.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.per_year.get(&2024), Some(&2));
        assert_eq!(stats.per_year.get(&2023), Some(&1));
        assert_eq!(stats.per_category.get("network"), Some(&3));
    }

    #[test]
    fn test_record_source_session_dedups_labels() {
        let mut store = QuestionStore::new();
        store.record_source_session("2025春");
        store.record_source_session("2025春");
        store.record_source_session("2024春");
        assert_eq!(
            store.to_seed().source_sessions,
            Some(vec!["2025春".to_string(), "2024春".to_string()])
        );
    }
}
