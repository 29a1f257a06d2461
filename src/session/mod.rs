//! Per-session step walker for the archive's hidden-token form flow.
//!
//! The archive exposes crawl state only through hidden form tokens echoed
//! between consecutive POST requests. This module models that relay
//! explicitly: a [`CarrySet`] value captured from each successful step's
//! response and replayed wholesale into the next step's request, driven by
//! the [`SessionWalker`] state machine.
//!
//! # Overview
//!
//! - [`SessionMeta`] - One discovered exam session (label, year, code)
//! - [`CarrySet`] - The hidden-token bundle relayed between steps
//! - [`SessionWalker`] - Drives one session through its question flow
//! - [`SessionError`] - Session-fatal failures

mod carry;
mod walker;

pub use carry::{CarrySet, RESULT_CONTINUE};
pub use walker::{SessionWalker, WalkConfig, WalkReport, build_step_form};

use thiserror::Error;

use crate::fetch::FetchError;

/// One exam session discovered on the archive's landing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionMeta {
    /// Human-readable session label (e.g. "令和7年春期").
    pub label: String,
    /// Gregorian exam year; partitions question numbering.
    pub year: i32,
    /// The site's opaque session selector code (`times[]` value).
    pub times_code: String,
    /// URL of the question flow endpoint.
    pub base_url: String,
}

/// Failures that abort a session walk.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The start page did not carry a session id. Hard precondition: the
    /// flow cannot be driven without one.
    #[error("session id not found on start page for {label}")]
    MissingSid {
        /// Label of the session whose start page was missing the id.
        label: String,
    },

    /// The start page itself could not be fetched.
    #[error(transparent)]
    Fetch(#[from] FetchError),
}
