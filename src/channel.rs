//! Channel identity and multichannel expansion.

use crate::config::ChannelConfig;
use crate::error::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Platform subdirectories stripped from the end of channel URLs
const KNOWN_SUBDIRS: &[&str] = &[
    "noarch",
    "emscripten-wasm32",
    "freebsd-64",
    "linux-32",
    "linux-64",
    "linux-aarch64",
    "linux-armv6l",
    "linux-armv7l",
    "linux-ppc64",
    "linux-ppc64le",
    "linux-riscv64",
    "linux-s390x",
    "osx-64",
    "osx-arm64",
    "wasi-wasm32",
    "win-32",
    "win-64",
    "win-arm64",
    "zos-z",
];

/// A single package repository, identified by its base URL
#[derive(Debug, Clone)]
pub struct Channel {
    scheme: String,
    location: String,
    name: String,
}

impl Channel {
    /// Parse a channel URL (or local path) into a channel.
    ///
    /// Credentials, `/t/<token>` segments, trailing slashes and a trailing
    /// platform subdirectory are dropped.
    pub fn from_url(url: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidChannel {
            channel: url.to_string(),
            reason: reason.to_string(),
        };

        let (scheme, rest) = url
            .split_once("://")
            .ok_or_else(|| invalid("missing URL scheme"))?;
        if scheme.is_empty() {
            return Err(invalid("missing URL scheme"));
        }

        // drop credentials
        let rest = match rest.split_once('/') {
            Some((authority, path)) => {
                let host = authority.rsplit_once('@').map_or(authority, |(_, h)| h);
                format!("{host}/{path}")
            }
            None => rest.rsplit_once('@').map_or(rest, |(_, h)| h).to_string(),
        };

        let mut segments: Vec<&str> = Vec::new();
        let mut parts = rest.split('/').filter(|s| !s.is_empty()).peekable();
        while let Some(segment) = parts.next() {
            // anaconda.org tokens: /t/<token>/
            if segment == "t" && !segments.is_empty() && parts.peek().is_some() {
                parts.next();
                continue;
            }
            segments.push(segment);
        }
        if segments.len() > 1 && segments.last().is_some_and(|s| KNOWN_SUBDIRS.contains(s)) {
            segments.pop();
        }

        let Some((name, location)) = segments.split_last() else {
            return Err(invalid("missing host"));
        };
        let (location, name) = if location.is_empty() && scheme != "file" {
            (name.to_string(), String::new())
        } else {
            (location.join("/"), name.to_string())
        };
        // file URLs keep their leading slash
        let location = if scheme == "file" {
            format!("/{location}")
        } else {
            location
        };

        Ok(Self {
            scheme: scheme.to_lowercase(),
            location,
            name,
        })
    }

    /// Location part (host and path without the channel name)
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Channel name (last path segment)
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_url(&self) -> String {
        let location = self.location.trim_end_matches('/');
        if self.name.is_empty() {
            format!("{}://{}", self.scheme, location)
        } else {
            format!("{}://{}/{}", self.scheme, location, self.name)
        }
    }
}

impl PartialEq for Channel {
    fn eq(&self, other: &Self) -> bool {
        self.base_url() == other.base_url()
    }
}

impl Eq for Channel {}

impl Hash for Channel {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.base_url().hash(state);
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base_url())
    }
}

/// How channel references are resolved: the alias for bare names and the
/// multichannel table
#[derive(Debug, Clone)]
pub struct ChannelContext {
    channel_alias: String,
    multichannels: HashMap<String, Vec<String>>,
}

impl ChannelContext {
    pub fn new(config: &ChannelConfig) -> Self {
        Self {
            channel_alias: config.channel_alias.trim_end_matches('/').to_string(),
            multichannels: config.multichannels.clone(),
        }
    }

    pub fn is_multichannel(&self, reference: &str) -> bool {
        self.multichannels.contains_key(reference)
    }

    /// Resolve a reference that must name exactly one channel
    pub fn single(&self, reference: &str) -> Result<Channel> {
        if self.is_multichannel(reference) {
            return Err(Error::InvalidChannel {
                channel: reference.to_string(),
                reason: "a multichannel has no base URL, expand it first".to_string(),
            });
        }
        Channel::from_url(&self.to_url(reference))
    }

    /// Expand one reference into its underlying channels
    pub fn expand(&self, reference: &str) -> Result<Vec<Channel>> {
        match self.multichannels.get(reference) {
            Some(urls) => urls.iter().map(|url| self.single(url)).collect(),
            None => Ok(vec![self.single(reference)?]),
        }
    }

    fn to_url(&self, reference: &str) -> String {
        let reference = reference.trim();
        if reference.contains("://") {
            reference.to_string()
        } else if is_path(reference) {
            format!("file://{}", reference.replace('\\', "/"))
        } else {
            format!("{}/{}", self.channel_alias, reference.trim_matches('/'))
        }
    }
}

fn is_path(reference: &str) -> bool {
    reference.starts_with('/')
        || reference.starts_with("./")
        || reference.starts_with("..")
        || reference.chars().nth(1) == Some(':')
}

/// Expand references into unique channels, keeping first-seen order.
///
/// References that cannot be parsed are skipped with a warning.
pub fn expand_channels<I, S>(context: &ChannelContext, references: I) -> Vec<Channel>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut channels = Vec::new();
    for reference in references {
        let reference = reference.as_ref();
        let expanded = match context.expand(reference) {
            Ok(expanded) => expanded,
            Err(e) => {
                tracing::warn!(channel = reference, error = %e, "Skipping channel");
                continue;
            }
        };
        for channel in expanded {
            if seen.insert(channel.base_url()) {
                channels.push(channel);
            }
        }
    }
    channels
}
