//! Question record type, validation, and content fingerprinting.
//!
//! A [`Question`] starts life as a loosely filled candidate from the
//! extractor and becomes an accepted record only by passing
//! [`validate_question`], the single gatekeeper enforcing the record
//! invariants. Field names on the wire match the seed JSON format the
//! quiz app consumes.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::error::StoreError;

/// Sentinel `answerIndex` meaning "unknown/missing answer".
pub const UNKNOWN_ANSWER: i32 = -1;

/// One past-question record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    /// Stable identity, unique within a seed. None on a fresh candidate
    /// whose page did not reveal a question number.
    pub id: Option<String>,

    /// Classification string (breadcrumb joined, or "unknown").
    pub category: String,

    /// Ordered classification labels, possibly empty.
    #[serde(default)]
    pub category_path: Vec<String>,

    /// Exam year; partitions id sequence numbering.
    pub year: i32,

    /// The prompt; None when extraction failed.
    pub text: Option<String>,

    /// Ordered answer choices. Must be non-empty with no blank entries.
    pub choices: Vec<String>,

    /// Zero-based index into `choices`, or [`UNKNOWN_ANSWER`].
    pub answer_index: i32,

    /// Explanation text, may be empty.
    pub explanation: String,

    /// Provenance URL.
    pub source_url: String,
}

impl Question {
    /// Returns the id as a str when present and non-blank.
    #[must_use]
    pub fn id_str(&self) -> Option<&str> {
        self.id.as_deref().map(str::trim).filter(|id| !id.is_empty())
    }
}

/// Builds the stable id for a synthesized question: `ap-{year}-q{seq:03}`.
#[must_use]
pub fn stable_question_id(year: i32, sequence: u32) -> String {
    format!("ap-{year}-q{sequence:03}")
}

/// Validates the record invariants.
///
/// Used on every `add` (reject, log, continue) and on every record before
/// persistence (fatal there).
///
/// # Errors
///
/// Returns [`StoreError::Validation`] when:
/// - the id is missing or blank,
/// - `choices` is empty or contains a blank entry,
/// - `answer_index` is neither [`UNKNOWN_ANSWER`] nor a valid index.
pub fn validate_question(question: &Question) -> Result<(), StoreError> {
    let id = question.id_str();
    if id.is_none() {
        return Err(StoreError::validation(None, "id is required"));
    }

    if question.choices.is_empty() {
        return Err(StoreError::validation(id, "choices must be non-empty"));
    }
    if question.choices.iter().any(|choice| choice.trim().is_empty()) {
        return Err(StoreError::validation(
            id,
            "choices contain empty/whitespace entries",
        ));
    }

    let len = i32::try_from(question.choices.len()).unwrap_or(i32::MAX);
    if question.answer_index != UNKNOWN_ANSWER
        && !(0..len).contains(&question.answer_index)
    {
        return Err(StoreError::validation(
            id,
            format!(
                "answerIndex {} out of range for {} choices",
                question.answer_index,
                question.choices.len()
            ),
        ));
    }

    Ok(())
}

/// Derives the content fingerprint used for duplicate detection.
///
/// SHA-256 over the whitespace-normalized prompt and choices. Two records
/// with different ids but the same normalized text and choices collide
/// here, catching the extractor assigning divergent ids to what is
/// semantically the same question.
#[must_use]
pub fn content_fingerprint(question: &Question) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize(question.text.as_deref().unwrap_or_default()).as_bytes());
    for choice in &question.choices {
        hasher.update([0x1f]);
        hasher.update(normalize(choice).as_bytes());
    }
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Collapses runs of whitespace to single spaces and trims the ends.
fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
