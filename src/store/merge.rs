//! Merging two seed files with repair of the existing side.
//!
//! The existing seed may have been written by an older or looser producer,
//! so it is repaired record by record (invalid records dropped and
//! reported) rather than rejected wholesale. The incoming seed comes from
//! a single trusted producer run and is validated strictly.

use std::collections::HashMap;
use std::path::Path;

use tracing::{info, instrument, warn};

use super::error::StoreError;
use super::question::{Question, validate_question};
use super::seed::{Seed, SeedDocument, raw_question_id, write_seed_atomic};

/// Outcome of a seed merge.
#[derive(Debug)]
pub struct MergeReport {
    /// Incoming records added under a new id.
    pub added: usize,
    /// Incoming records that replaced an existing id (`prefer_new` only).
    pub replaced: usize,
    /// Ids of invalid existing records dropped during repair.
    pub dropped_ids: Vec<String>,
    /// The merged seed as written.
    pub merged: Seed,
}

/// Merges `incoming_path` into `existing_path`, writing the result
/// atomically to `out_path`.
///
/// The existing seed is repaired (missing file treated as empty); the
/// incoming seed must be fully valid. Id collisions are resolved by
/// `prefer_new`. Existing record order is preserved, with new records
/// appended in incoming order.
///
/// # Errors
///
/// Returns [`StoreError`] when the incoming seed cannot be read or fails
/// validation, or when the merged seed cannot be written.
#[instrument(skip_all, fields(
    existing = %existing_path.display(),
    incoming = %incoming_path.display(),
    out = %out_path.display(),
))]
pub fn merge_seed_files(
    existing_path: &Path,
    incoming_path: &Path,
    out_path: &Path,
    prefer_new: bool,
) -> Result<MergeReport, StoreError> {
    let (existing, dropped_ids) = if existing_path.exists() {
        let document = SeedDocument::read(existing_path)?;
        repair_document(document)
    } else {
        (Seed::empty(), Vec::new())
    };

    if !dropped_ids.is_empty() {
        warn!(
            dropped = dropped_ids.len(),
            ids = %dropped_ids.join(", "),
            "dropped invalid existing questions"
        );
    }

    let incoming = Seed::read_validated(incoming_path)?;

    let (questions, added, replaced) =
        merge_questions(existing.questions, incoming.questions, prefer_new);

    let merged = Seed {
        version: existing.version.max(incoming.version),
        questions,
        generated_at: incoming.generated_at.or(existing.generated_at),
        source_sessions: incoming
            .source_sessions
            .or(existing.source_sessions)
            .or_else(|| Some(Vec::new())),
    };

    for question in &merged.questions {
        validate_question(question)?;
    }

    write_seed_atomic(out_path, &merged)?;

    info!(added, replaced, total = merged.questions.len(), "merge complete");

    Ok(MergeReport {
        added,
        replaced,
        dropped_ids,
        merged,
    })
}

/// Repairs a raw seed document: keeps records that deserialize and pass
/// validation, collecting the ids (or placeholders) of the rest.
fn repair_document(document: SeedDocument) -> (Seed, Vec<String>) {
    let mut questions = Vec::with_capacity(document.questions.len());
    let mut dropped_ids = Vec::new();

    for raw in document.questions {
        let id = raw_question_id(&raw);
        match serde_json::from_value::<Question>(raw) {
            Ok(question) if validate_question(&question).is_ok() => questions.push(question),
            _ => dropped_ids.push(id),
        }
    }

    (
        Seed {
            version: document.version,
            questions,
            generated_at: document.generated_at,
            source_sessions: document.source_sessions,
        },
        dropped_ids,
    )
}

/// Merges by id: existing order preserved, collisions resolved in place,
/// new records appended in incoming order.
fn merge_questions(
    existing: Vec<Question>,
    incoming: Vec<Question>,
    prefer_new: bool,
) -> (Vec<Question>, usize, usize) {
    let mut merged = existing;
    let mut index: HashMap<String, usize> = merged
        .iter()
        .enumerate()
        .filter_map(|(pos, q)| q.id_str().map(|id| (id.to_string(), pos)))
        .collect();

    let mut added = 0;
    let mut replaced = 0;

    for question in incoming {
        let Some(id) = question.id_str().map(str::to_string) else {
            continue; // Unreachable: incoming is validated.
        };
        if let Some(&pos) = index.get(&id) {
            if prefer_new {
                merged[pos] = question;
                replaced += 1;
            }
        } else {
            index.insert(id, merged.len());
            merged.push(question);
            added += 1;
        }
    }

    (merged, added, replaced)
}
