// fetchdns: HTTP-backed address resolution with TTL caching
// Exposes the fetch-cache-extract engine as a library

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod request;
pub mod resolver;
