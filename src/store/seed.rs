//! Seed corpus file format: reading, shape-tolerant loading, atomic writes.
//!
//! The seed JSON (`version` / `questions` / optional `generatedAt` /
//! optional `sourceSessions`) is the sole durable interface of the
//! harvester; the quiz app consumes exactly this shape.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::Error as _;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::{MISSING_ID, StoreError};
use super::question::{Question, validate_question};

/// Current seed format version.
pub const SEED_VERSION: u32 = 1;

/// A fully typed seed corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Seed {
    /// Format version.
    pub version: u32,
    /// All records, existing-first then newly-added.
    pub questions: Vec<Question>,
    /// Generation timestamp (RFC 3339) when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<String>,
    /// Labels of the sessions that contributed records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_sessions: Option<Vec<String>>,
}

impl Seed {
    /// Creates an empty seed at the current version.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            version: SEED_VERSION,
            questions: Vec::new(),
            generated_at: None,
            source_sessions: None,
        }
    }

    /// Reads a seed, requiring every record to deserialize structurally.
    ///
    /// Record invariants are NOT checked here; semantically invalid records
    /// flow through and are caught by the persistence-time validation (or
    /// by [`merge_seed_files`](super::merge_seed_files)' repair pass).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Read`]/[`StoreError::Parse`] on IO or JSON
    /// failures, and [`StoreError::Validation`] for a record that does not
    /// deserialize into the expected shape.
    pub fn read(path: &Path) -> Result<Self, StoreError> {
        let document = SeedDocument::read(path)?;
        let mut questions = Vec::with_capacity(document.questions.len());
        for raw in document.questions {
            let id = raw_question_id(&raw);
            let question: Question = serde_json::from_value(raw)
                .map_err(|error| StoreError::validation(Some(&id), error.to_string()))?;
            questions.push(question);
        }
        Ok(Self {
            version: document.version,
            questions,
            generated_at: document.generated_at,
            source_sessions: document.source_sessions,
        })
    }

    /// Reads a seed and validates every record's invariants (strict).
    ///
    /// # Errors
    ///
    /// As [`read`](Self::read), plus [`StoreError::Validation`] for the
    /// first record violating an invariant.
    pub fn read_validated(path: &Path) -> Result<Self, StoreError> {
        let seed = Self::read(path)?;
        for question in &seed.questions {
            validate_question(question)?;
        }
        Ok(seed)
    }
}

/// Shape-tolerant view of a seed file, used by the merge repair pass.
///
/// Malformed metadata is dropped rather than rejected: a non-integer
/// `version` falls back to [`SEED_VERSION`], non-string `generatedAt` and
/// non-string-list `sourceSessions` become None, and a non-list
/// `questions` becomes empty. Individual question values are kept raw for
/// per-record repair.
#[derive(Debug)]
pub struct SeedDocument {
    /// Format version (defaulted when missing or malformed).
    pub version: u32,
    /// Raw question values, not yet deserialized.
    pub questions: Vec<serde_json::Value>,
    /// Generation timestamp when present and well-formed.
    pub generated_at: Option<String>,
    /// Source session labels when present and well-formed.
    pub source_sessions: Option<Vec<String>>,
}

impl SeedDocument {
    /// Reads and shape-normalizes a seed file.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Read`] on IO failures and
    /// [`StoreError::Parse`] when the file is not a JSON object.
    pub fn read(path: &Path) -> Result<Self, StoreError> {
        let bytes = fs::read(path).map_err(|source| StoreError::read(path, source))?;
        let value: serde_json::Value =
            serde_json::from_slice(&bytes).map_err(|source| StoreError::parse(path, source))?;

        let serde_json::Value::Object(map) = value else {
            return Err(StoreError::parse(
                path,
                serde_json::Error::custom("seed JSON must be an object"),
            ));
        };

        let version = map
            .get("version")
            .and_then(serde_json::Value::as_u64)
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(SEED_VERSION);

        let questions = map
            .get("questions")
            .and_then(serde_json::Value::as_array)
            .cloned()
            .unwrap_or_default();

        let generated_at = map
            .get("generatedAt")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string);

        let source_sessions = map
            .get("sourceSessions")
            .and_then(serde_json::Value::as_array)
            .and_then(|values| {
                values
                    .iter()
                    .map(|v| v.as_str().map(str::to_string))
                    .collect::<Option<Vec<String>>>()
            });

        debug!(
            path = %path.display(),
            version,
            questions = questions.len(),
            "loaded seed document"
        );

        Ok(Self {
            version,
            questions,
            generated_at,
            source_sessions,
        })
    }
}

/// Extracts the id from a raw question value for diagnostics.
pub(super) fn raw_question_id(raw: &serde_json::Value) -> String {
    raw.get("id")
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .unwrap_or(MISSING_ID)
        .to_string()
}

/// Writes a seed atomically: temp file in the same directory, then rename.
///
/// A crash or concurrent reader never observes a partially written seed.
/// Parent directories are created as needed.
///
/// # Errors
///
/// Returns [`StoreError::Write`] if serialization, the temp write, or the
/// rename fails.
pub fn write_seed_atomic(path: &Path, seed: &Seed) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|source| StoreError::write(parent, source))?;
        }
    }

    let mut body = serde_json::to_string_pretty(seed).map_err(|source| StoreError::Write {
        path: path.to_path_buf(),
        source: std::io::Error::other(source),
    })?;
    body.push('\n');

    let tmp = tmp_path(path);
    fs::write(&tmp, body).map_err(|source| StoreError::write(&tmp, source))?;

    if let Err(source) = fs::rename(&tmp, path) {
        // Leave no orphaned temp file behind on a failed rename.
        let _ = fs::remove_file(&tmp);
        return Err(StoreError::write(path, source));
    }

    debug!(path = %path.display(), questions = seed.questions.len(), "seed written");
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}
