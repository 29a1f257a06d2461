//! Markup extraction boundary: question pages and session discovery.
//!
//! The walker treats extraction as an opaque function from page content to
//! candidate records; [`QuestionExtractor`] is that seam. Extractors are
//! resilient by contract: missing fields become empty/None values, never
//! panics, and the store's validation is the final guard on whatever they
//! produce.

mod page;
mod sessions;

pub use page::ExamPageExtractor;
pub use sessions::{discover_sessions, era_to_gregorian, parse_sessions};

use crate::session::SessionMeta;
use crate::store::Question;

/// Turns one page's content into zero or more candidate questions.
///
/// Implementations must always populate the `choices` field structurally
/// (possibly with blank entries for the validator to reject) and must not
/// fail on malformed markup: a page that yields nothing returns an empty
/// vector.
pub trait QuestionExtractor {
    /// Extracts candidate questions from `html` for the given session.
    fn extract(&self, html: &str, session: &SessionMeta) -> Vec<Question>;
}
