//! Error taxonomy for the resolution pipeline
//!
//! Failures fall into three caller-visible classes:
//! - transport errors (all retry attempts failed at the network layer)
//! - HTTP status errors (retries exhausted on a non-success status; carries the
//!   status code and response body for diagnostics)
//! - extraction errors (the configured address extractor failed to compile or
//!   evaluate)
//!
//! Two conditions are deliberately *not* errors: a backend response whose
//! extractor yields an empty address is "no record found" and surfaces as an
//! empty string, and TTL extraction failures are recovered locally with a
//! default TTL and a warning log.

use reqwest::StatusCode;
use thiserror::Error;

/// Failure of a single lookup through [`crate::resolver::Resolver::query`].
///
/// Callers are expected to treat any of these as "treat as miss, fall through
/// to the next resolution step" rather than as a fatal condition.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Every attempt failed at the network layer (connect error, timeout).
    #[error("transport error after {attempts} attempts: {source}")]
    Transport {
        /// Number of attempts made before giving up
        attempts: u32,
        /// The error from the final attempt
        source: reqwest::Error,
    },

    /// Every attempt returned a status outside the [200, 400) success band.
    #[error("HTTP status {status} after {attempts} attempts: {body}")]
    Status {
        /// Status code of the final attempt
        status: StatusCode,
        /// Response body of the final attempt, kept for diagnostics
        body: String,
        /// Number of attempts made before giving up
        attempts: u32,
    },

    /// The address extractor failed to compile or evaluate.
    #[error("address extraction failed: {0}")]
    Extraction(#[from] ExtractError),
}

/// Failure compiling or evaluating an extraction program.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The program source did not parse.
    #[error("parse error at byte {pos}: {message}")]
    Parse { pos: usize, message: String },

    /// The program parsed but could not be evaluated against the response body.
    #[error("evaluation error: {message}")]
    Eval { message: String },
}

/// Invalid resolver configuration, reported once at configuration time.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("base URL is required")]
    MissingUrl,

    #[error("invalid HTTP method: {0}")]
    InvalidMethod(String),

    #[error("unknown configuration option: {0}")]
    UnknownOption(String),
}
