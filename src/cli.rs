//! Command-line interface for the fetchdns resolver
//!
//! The CLI mirrors the configuration option set one-to-one: every flag maps
//! onto a [`crate::config::FetchConfig`] field, and the two subcommands cover
//! interactive single lookups and batched lookups from a key file.
//!
//! Results are emitted as JSON: pretty-printed for `single`, one object per
//! line for `batch`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Main command-line interface structure for fetchdns
#[derive(Parser)]
#[command(
    name = "fetchdns",
    about = "Resolve names to addresses via a configurable HTTP backend, with TTL caching",
    version
)]
pub struct Cli {
    /// Command to execute (single lookup or batch processing)
    #[command(subcommand)]
    pub command: Commands,

    /// Base URL of the HTTP address backend
    #[arg(short, long)]
    pub url: String,

    /// HTTP method for backend requests
    #[arg(short, long, default_value = "GET")]
    pub method: String,

    /// Query-string template appended to the URL; `{key}` is replaced with
    /// the lookup key (e.g. "name={key}")
    #[arg(short, long)]
    pub query: Option<String>,

    /// Request body template; `{key}` is replaced with the lookup key
    #[arg(short, long)]
    pub body: Option<String>,

    /// Extra request header as "Name: Value"; repeatable
    #[arg(short = 'H', long = "header")]
    pub headers: Vec<String>,

    /// Program extracting the address from the response body
    /// (e.g. "fromJSON(body).ip_address"); omit to use the body verbatim
    #[arg(long)]
    pub analyze_ip: Option<String>,

    /// Program extracting the TTL in seconds from the response body;
    /// omit to cache for 60 seconds
    #[arg(long)]
    pub analyze_ttl: Option<String>,

    /// Per-attempt HTTP request timeout in milliseconds
    #[arg(short, long, default_value = "5000")]
    pub timeout_ms: u64,

    /// Maximum concurrent lookups in batch mode
    #[arg(short, long, default_value = "16")]
    pub concurrent_requests: usize,
}

/// Available subcommands for the fetchdns CLI
#[derive(Subcommand)]
pub enum Commands {
    /// Resolve a single lookup key
    Single {
        /// Key (host name) to resolve
        #[arg(short, long)]
        key: String,
    },
    /// Resolve keys read from a file, one per line
    ///
    /// Empty lines and lines starting with '#' are skipped. Results are
    /// written as JSON lines to stdout or to the output file.
    Batch {
        /// Input file containing lookup keys (one per line)
        #[arg(short, long)]
        input_file: PathBuf,

        /// Output file for results (JSON lines); stdout if omitted
        #[arg(short, long)]
        output_file: Option<PathBuf>,
    },
}
