//! Concrete extractor for the archive's question page markup.

use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::session::SessionMeta;
use crate::store::{Question, UNKNOWN_ANSWER, stable_question_id};

use super::QuestionExtractor;

/// Separator used when joining the classification breadcrumb.
const CATEGORY_SEPARATOR: &str = " » ";

/// Extractor for the archive's rendered question pages.
///
/// Selectors are compiled once at construction; all of them are static
/// strings mirroring the page structure the site has used for years.
pub struct ExamPageExtractor {
    question_body: Selector,
    question_text: Selector,
    choices: [Selector; 4],
    answer_char: Selector,
    explanation: Selector,
    og_url: Selector,
    hidden_q: Selector,
    heading: Selector,
}

impl ExamPageExtractor {
    /// Creates the extractor.
    ///
    /// # Panics
    ///
    /// Panics if one of the static selectors fails to parse. This should
    /// never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        let parse = |s: &str| Selector::parse(s).expect("static selector parses");
        Self {
            question_body: parse(".selectList"),
            question_text: parse("h3.qno + div"),
            choices: [
                parse("#select_a"),
                parse("#select_i"),
                parse("#select_u"),
                parse("#select_e"),
            ],
            answer_char: parse("#answerChar"),
            explanation: parse("#kaisetsu"),
            og_url: parse(r#"meta[property="og:url"]"#),
            hidden_q: parse(r#"input[name="_q"]"#),
            heading: parse("h3"),
        }
    }

    /// Builds the classification breadcrumb from the 分類 heading's
    /// following block, split on the `»` separators the site renders.
    fn category_path(&self, document: &Html) -> Vec<String> {
        let Some(heading) = document
            .select(&self.heading)
            .find(|h3| h3.text().any(|t| t.contains("分類")))
        else {
            return Vec::new();
        };
        let Some(block) = heading
            .next_siblings()
            .filter_map(ElementRef::wrap)
            .find(|el| el.value().name() == "div")
        else {
            return Vec::new();
        };

        collapse_text(&block)
            .replace('＞', "»")
            .split('»')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Recovers the question number from the `_q` hidden token when its
    /// last underscore-separated segment is numeric.
    fn question_number(&self, document: &Html) -> Option<u32> {
        let value = document
            .select(&self.hidden_q)
            .next()?
            .value()
            .attr("value")?;
        value.rsplit('_').next()?.parse().ok()
    }
}

impl Default for ExamPageExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl QuestionExtractor for ExamPageExtractor {
    fn extract(&self, html: &str, session: &SessionMeta) -> Vec<Question> {
        let document = Html::parse_document(html);

        if document.select(&self.question_body).next().is_none() {
            debug!("page carries no question body");
            return Vec::new();
        }

        let text = document
            .select(&self.question_text)
            .next()
            .map(|el| collapse_text(&el));

        // Always four structural entries; blanks are the validator's call.
        let choices: Vec<String> = self
            .choices
            .iter()
            .map(|selector| {
                document
                    .select(selector)
                    .next()
                    .map(|el| collapse_text(&el))
                    .unwrap_or_default()
            })
            .collect();

        let answer_index = document
            .select(&self.answer_char)
            .next()
            .map_or(UNKNOWN_ANSWER, |el| {
                answer_char_index(collapse_text(&el).as_str())
            });

        let explanation = document
            .select(&self.explanation)
            .next()
            .map(|el| collapse_text(&el))
            .unwrap_or_default();

        let source_url = document
            .select(&self.og_url)
            .next()
            .and_then(|el| el.value().attr("content"))
            .map_or_else(|| session.base_url.clone(), str::to_string);

        let category_path = self.category_path(&document);
        let category = if category_path.is_empty() {
            "unknown".to_string()
        } else {
            category_path.join(CATEGORY_SEPARATOR)
        };

        let id = self
            .question_number(&document)
            .map(|number| stable_question_id(session.year, number));

        vec![Question {
            id,
            category,
            category_path,
            year: session.year,
            text,
            choices,
            answer_index,
            explanation,
            source_url,
        }]
    }
}

/// Maps the rendered answer character to its choice index.
fn answer_char_index(answer: &str) -> i32 {
    match answer {
        "ア" => 0,
        "イ" => 1,
        "ウ" => 2,
        "エ" => 3,
        _ => UNKNOWN_ANSWER,
    }
}

/// Joins an element's text nodes with single spaces, collapsed and trimmed.
fn collapse_text(element: &ElementRef) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
