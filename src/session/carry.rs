//! The hidden-token carry set relayed between consecutive steps.
//!
//! Each question page embeds three opaque echo tokens (`_q`, `_r`, `_c`)
//! and a `result` flag as hidden inputs. The server expects them replayed
//! verbatim in the next step's request. The set is an immutable value
//! replaced wholesale after each successful step; a failed step never
//! half-updates it.

use scraper::{Html, Selector};

/// The `result` value that keeps the flow advancing.
pub const RESULT_CONTINUE: &str = "0";

/// The `result` value a page reports when none is present.
const RESULT_MISSING: &str = "-1";

/// Hidden tokens carried from one step's response into the next request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarrySet {
    /// Opaque `_q` echo token.
    pub q: String,
    /// Opaque `_r` echo token.
    pub r: String,
    /// Opaque `_c` echo token.
    pub c: String,
    /// Result flag; forced to [`RESULT_CONTINUE`] before reuse.
    pub result: String,
}

impl CarrySet {
    /// The empty carry set used on a session's first step.
    #[must_use]
    pub fn initial() -> Self {
        Self {
            q: String::new(),
            r: String::new(),
            c: String::new(),
            result: RESULT_CONTINUE.to_string(),
        }
    }

    /// Reads the carry tokens off a question page.
    ///
    /// Missing inputs fall back to empty tokens and a missing `result`
    /// to `"-1"`, mirroring what the site itself renders on bare pages.
    #[must_use]
    pub fn from_page(html: &str) -> Self {
        let document = Html::parse_document(html);
        Self {
            q: hidden_input_value(&document, "_q").unwrap_or_default(),
            r: hidden_input_value(&document, "_r").unwrap_or_default(),
            c: hidden_input_value(&document, "_c").unwrap_or_default(),
            result: hidden_input_value(&document, "result")
                .unwrap_or_else(|| RESULT_MISSING.to_string()),
        }
    }

    /// Returns the set to replay on the next step, with `result` forced
    /// back to [`RESULT_CONTINUE`].
    #[must_use]
    pub fn for_next_step(mut self) -> Self {
        self.result = RESULT_CONTINUE.to_string();
        self
    }
}

/// Returns the `value` attribute of `input[name=...]`, if present.
fn hidden_input_value(document: &Html, name: &str) -> Option<String> {
    let selector = Selector::parse(&format!(r#"input[name="{name}"]"#)).ok()?;
    document
        .select(&selector)
        .next()?
        .value()
        .attr("value")
        .map(str::to_string)
}
