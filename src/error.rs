use derive_more::Display;
use std::path::Path;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display)]
pub enum Error {
    #[display("I/O error ({path}): {error}")]
    Io { error: std::io::Error, path: String },

    #[display("No Terms of Service for {channel}.")]
    Missing { channel: String },

    #[display("Invalid Terms of Service for {channel}: {reason}")]
    Invalid { channel: String, reason: String },

    #[display("Unable to read/write path ({path}) for {channel}. Please check permissions.")]
    PermissionDenied { path: String, channel: String },

    #[display(
        "Terms of Service rejected for the following channels:\n{}\n\n\
         Remove channels with rejected Terms of Service before proceeding:\n    \
         ‣ remove CHANNEL from the `channels` configuration\n\n\
         To accept the Terms of Service for a given channel, run the following:\n    \
         ‣ conda-tos accept --override-channels --channel CHANNEL",
        bullet(channels)
    )]
    Rejected { channels: Vec<String> },

    #[display(
        "Terms of Service not accepted for the following channels:\n{}\n\n\
         To accept the Terms of Service for a given channel, run the following:\n    \
         ‣ conda-tos accept --override-channels --channel CHANNEL",
        bullet(channels)
    )]
    NonInteractive { channels: Vec<String> },

    #[display("Invalid channel ({channel}): {reason}")]
    InvalidChannel { channel: String, reason: String },

    #[display("Serialization failed: {msg}")]
    Serialization { msg: String },

    #[display("HTTP client error: {msg}")]
    Http { msg: String },

    #[display("Configuration error: {msg}")]
    Config { msg: String },
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io { error, .. } => Some(error),
            _ => None,
        }
    }
}

impl Error {
    /// True for the "no ToS for this channel" condition.
    pub fn is_missing(&self) -> bool {
        matches!(self, Error::Missing { .. })
    }
}

fn bullet(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("    • {item}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Attach the offending path to an I/O error
pub trait ResultIoExt<T> {
    fn map_io_err(self, path: impl AsRef<Path>) -> Result<T>;
}

impl<T> ResultIoExt<T> for std::result::Result<T, std::io::Error> {
    fn map_io_err(self, path: impl AsRef<Path>) -> Result<T> {
        self.map_err(|error| Error::Io {
            error,
            path: path.as_ref().display().to_string(),
        })
    }
}
