//! imap-query-mcp: IMAP search MCP server over stdio
//!
//! Exposes three read-only tools to an MCP client: list folders, search a
//! folder with a small query language, and fetch one raw message.
//!
//! # Architecture
//!
//! - [`main`]: Process entry point with env loading and stdio serving
//! - [`config`]: Environment and command-line configuration
//! - [`errors`]: Application error model with MCP error mapping
//! - [`query`]: Query language lexer, parser, validator and compiler
//! - [`connection`]: Transport trait the core operations run against
//! - [`imap`]: IMAP session over TLS with timeout-bounded commands
//! - [`mailbox`]: Search executor, folder lister and message fetcher
//! - [`headers`]: Envelope header decoding for search results
//! - [`message_id`]: Message identifier parsing
//! - [`models`]: Input/output DTOs and schema-bearing types
//! - [`server`]: MCP tool handlers with validation and session ownership

mod config;
mod connection;
mod errors;
mod headers;
mod imap;
mod mailbox;
mod message_id;
mod models;
mod query;
mod server;

use clap::Parser;
use config::{Cli, ServerConfig};
use rmcp::ServiceExt;
use rmcp::transport::stdio;
use tracing_subscriber::EnvFilter;

/// Application entry point
///
/// Initializes tracing from environment, loads config, and serves the MCP
/// server over stdio. Logs go to stderr; stdout carries MCP frames.
///
/// # Environment Variables
///
/// See [`ServerConfig::load`] for full configuration options.
///
/// # Example
///
/// ```no_run
/// IMAP_HOST=imap.example.com \
/// IMAP_USER=user@example.com \
/// IMAP_PASSWORD=secret \
/// cargo run
/// ```
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = ServerConfig::load(Cli::parse())?;
    tracing::info!(host = %config.host, port = config.port, "starting IMAP query MCP server");
    let service = server::MailQueryServer::new(config).serve(stdio()).await?;
    service.waiting().await?;
    Ok(())
}
