//! Integration tests for seed merging and persistence.

use std::fs;
use std::path::Path;

use harvester_core::store::{
    MergeReport, Question, Seed, StoreError, merge_seed_files, write_seed_atomic,
};
use tempfile::TempDir;

fn question(id: &str, year: i32, answer_index: i32) -> Question {
    Question {
        id: Some(id.to_string()),
        category: "network".to_string(),
        category_path: vec!["network".to_string()],
        year,
        text: Some(format!("prompt for {id}")),
        choices: vec!["a".to_string(), "b".to_string(), "c".to_string()],
        answer_index,
        explanation: String::new(),
        source_url: "https://example.com".to_string(),
    }
}

fn write_seed(path: &Path, questions: Vec<Question>) {
    let seed = Seed {
        questions,
        ..Seed::empty()
    };
    write_seed_atomic(path, &seed).expect("failed to write seed fixture");
}

fn merge(dir: &TempDir, prefer_new: bool) -> Result<MergeReport, StoreError> {
    merge_seed_files(
        &dir.path().join("existing.json"),
        &dir.path().join("incoming.json"),
        &dir.path().join("merged.json"),
        prefer_new,
    )
}

#[test]
fn test_merging_a_seed_with_itself_changes_nothing() {
    let dir = TempDir::new().expect("failed to create temp dir");
    let questions = vec![question("x", 2024, 1), question("y", 2024, 0)];
    write_seed(&dir.path().join("existing.json"), questions.clone());
    write_seed(&dir.path().join("incoming.json"), questions.clone());

    let report = merge(&dir, false).expect("merge");

    assert_eq!(report.added, 0);
    assert_eq!(report.replaced, 0);
    assert!(report.dropped_ids.is_empty());
    assert_eq!(report.merged.questions, questions);
}

#[test]
fn test_merge_precedence_follows_prefer_new() {
    let dir = TempDir::new().expect("failed to create temp dir");
    write_seed(&dir.path().join("existing.json"), vec![question("x", 2024, 1)]);
    write_seed(&dir.path().join("incoming.json"), vec![question("x", 2024, 2)]);

    let report = merge(&dir, true).expect("merge with prefer_new");
    assert_eq!(report.replaced, 1);
    assert_eq!(report.merged.questions[0].answer_index, 2);

    let report = merge(&dir, false).expect("merge without prefer_new");
    assert_eq!(report.replaced, 0);
    assert_eq!(report.merged.questions[0].answer_index, 1);
}

#[test]
fn test_merge_appends_new_records_after_existing() {
    let dir = TempDir::new().expect("failed to create temp dir");
    write_seed(&dir.path().join("existing.json"), vec![question("a", 2023, 0)]);
    write_seed(
        &dir.path().join("incoming.json"),
        vec![question("b", 2024, 0), question("c", 2024, 0)],
    );

    let report = merge(&dir, false).expect("merge");
    assert_eq!(report.added, 2);
    let ids: Vec<_> = report
        .merged
        .questions
        .iter()
        .map(|q| q.id.clone().expect("merged records carry ids"))
        .collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
}

#[test]
fn test_merge_repairs_invalid_existing_records() {
    let dir = TempDir::new().expect("failed to create temp dir");

    // Hand-written existing seed from an older producer: one good record,
    // one with an out-of-range answer, one with no choices at all.
    fs::write(
        dir.path().join("existing.json"),
        r#"{
            "version": 1,
            "questions": [
                {"id": "good", "category": "c", "categoryPath": [], "year": 2023,
                 "text": "t", "choices": ["a", "b"], "answerIndex": 0,
                 "explanation": "", "sourceUrl": ""},
                {"id": "bad-answer", "category": "c", "categoryPath": [], "year": 2023,
                 "text": "t", "choices": ["a", "b"], "answerIndex": 5,
                 "explanation": "", "sourceUrl": ""},
                {"category": "no id or choices"}
            ]
        }"#,
    )
    .expect("failed to write fixture");
    write_seed(&dir.path().join("incoming.json"), vec![question("x", 2024, 0)]);

    let report = merge(&dir, false).expect("merge proceeds despite bad records");

    assert_eq!(
        report.dropped_ids,
        vec!["bad-answer".to_string(), "<missing id>".to_string()]
    );
    let ids: Vec<_> = report
        .merged
        .questions
        .iter()
        .map(|q| q.id.clone().expect("merged records carry ids"))
        .collect();
    assert_eq!(ids, vec!["good", "x"]);
}

#[test]
fn test_merge_missing_existing_file_treated_as_empty() {
    let dir = TempDir::new().expect("failed to create temp dir");
    write_seed(&dir.path().join("incoming.json"), vec![question("x", 2024, 0)]);

    let report = merge(&dir, false).expect("merge");
    assert_eq!(report.added, 1);
    assert_eq!(report.merged.questions.len(), 1);
}

#[test]
fn test_merge_invalid_incoming_is_fatal() {
    let dir = TempDir::new().expect("failed to create temp dir");
    write_seed(&dir.path().join("existing.json"), vec![question("a", 2023, 0)]);

    let mut bad = question("x", 2024, 0);
    bad.choices = Vec::new();
    // Bypass validation by serializing directly.
    let seed = Seed {
        questions: vec![bad],
        ..Seed::empty()
    };
    fs::write(
        dir.path().join("incoming.json"),
        serde_json::to_string(&seed).expect("serialize"),
    )
    .expect("failed to write fixture");

    let result = merge(&dir, false);
    assert!(matches!(result, Err(StoreError::Validation { .. })));
    assert!(!dir.path().join("merged.json").exists());
}

#[test]
fn test_merge_output_is_written_atomically() {
    let dir = TempDir::new().expect("failed to create temp dir");
    write_seed(&dir.path().join("existing.json"), vec![question("a", 2023, 0)]);
    write_seed(&dir.path().join("incoming.json"), vec![question("b", 2024, 0)]);

    merge(&dir, false).expect("merge");

    let leftovers: Vec<String> = fs::read_dir(dir.path())
        .expect("read dir")
        .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty(), "temp files left behind: {leftovers:?}");

    let merged = Seed::read(&dir.path().join("merged.json")).expect("read merged");
    assert_eq!(merged.questions.len(), 2);
}

#[test]
fn test_merge_carries_metadata_preferring_incoming() {
    let dir = TempDir::new().expect("failed to create temp dir");

    let existing = Seed {
        questions: vec![question("a", 2023, 0)],
        generated_at: Some("2025-01-01T00:00:00Z".to_string()),
        source_sessions: Some(vec!["old".to_string()]),
        ..Seed::empty()
    };
    write_seed_atomic(&dir.path().join("existing.json"), &existing).expect("write");

    let incoming = Seed {
        questions: vec![question("b", 2024, 0)],
        generated_at: Some("2026-08-01T00:00:00Z".to_string()),
        source_sessions: None,
        ..Seed::empty()
    };
    write_seed_atomic(&dir.path().join("incoming.json"), &incoming).expect("write");

    let report = merge(&dir, false).expect("merge");
    assert_eq!(
        report.merged.generated_at.as_deref(),
        Some("2026-08-01T00:00:00Z")
    );
    // Incoming has no session list, so the existing one survives.
    assert_eq!(
        report.merged.source_sessions,
        Some(vec!["old".to_string()])
    );
}
