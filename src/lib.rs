pub mod cache;
pub mod channel;
pub mod config;
pub mod environment;
pub mod error;
pub mod header;
pub mod interactive;
pub mod models;
pub mod path;
pub mod remote;
pub mod storage;
pub mod tos;

pub use error::{Error, Result};
pub use tos::TosClient;

/// Initialize the tracing subscriber for logging
/// Logs go to stderr so command output on stdout stays clean
pub fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "conda_tos=warn".into());

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}
