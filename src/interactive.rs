//! Gate run before channel operations: every active channel with a ToS must
//! be accepted before work may proceed.

use crate::channel::Channel;
use crate::error::{Error, Result};
use crate::models::{MetadataRecord, RemoteMetadata};
use crate::remote::RemoteSource;
use crate::tos::TosClient;
use std::path::Path;
use std::time::Duration;

/// Asks the user to decide on a ToS
pub trait Prompt {
    /// False when nobody can answer (e.g. stdin is not a terminal)
    fn is_interactive(&self) -> bool;

    /// Returns `true` to accept, `false` to reject
    fn ask(&mut self, channel: &Channel, metadata: &RemoteMetadata) -> Result<bool>;
}

/// How a pending ToS got decided
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecidedBy {
    /// `tos.auto_accept` is set
    Config,
    /// Implicit acceptance in CI
    Ci,
    User,
}

#[derive(Debug)]
pub struct GateDecision {
    pub channel: Channel,
    pub record: MetadataRecord,
    pub decided_by: DecidedBy,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GateOptions {
    pub auto_accept: bool,
    pub ci: bool,
}

/// Resolve every pending ToS for `channels`.
///
/// Fails with `Rejected` if any channel is (or ends up) rejected and with
/// `NonInteractive` when a prompt is needed but nobody can answer it.
pub fn gate<R, P>(
    client: &TosClient<R>,
    channels: &[Channel],
    tos_root: impl AsRef<Path>,
    cache_timeout: Option<Duration>,
    options: GateOptions,
    prompt: &mut P,
) -> Result<Vec<GateDecision>>
where
    R: RemoteSource,
    P: Prompt + ?Sized,
{
    let tos_root = tos_root.as_ref();
    let gathered = client.gather(channels, tos_root, cache_timeout)?;

    if !gathered.rejected.is_empty() {
        return Err(rejected(&gathered.rejected));
    }

    let needs_prompt = !options.auto_accept && !options.ci;
    if needs_prompt && !gathered.pending.is_empty() && !prompt.is_interactive() {
        return Err(Error::NonInteractive {
            channels: gathered
                .pending
                .iter()
                .map(|(channel, _)| channel.base_url())
                .collect(),
        });
    }

    let mut decisions = Vec::with_capacity(gathered.pending.len());
    let mut rejections = Vec::new();

    for (channel, pending) in gathered.pending {
        let (accepted, decided_by) = if options.auto_accept {
            tracing::info!(channel = %channel, "Accepting ToS per configuration");
            (true, DecidedBy::Config)
        } else if options.ci {
            tracing::warn!(
                channel = %channel,
                version = %pending.version(),
                "Implicitly accepting ToS in CI"
            );
            (true, DecidedBy::Ci)
        } else {
            (prompt.ask(&channel, pending.current())?, DecidedBy::User)
        };

        if !accepted {
            rejections.push(channel.clone());
        }
        let record = client.record_decision(&channel, tos_root, &pending, accepted)?;
        decisions.push(GateDecision {
            channel,
            record,
            decided_by,
        });
    }

    if !rejections.is_empty() {
        return Err(rejected(&rejections));
    }
    Ok(decisions)
}

fn rejected(channels: &[Channel]) -> Error {
    Error::Rejected {
        channels: channels.iter().map(Channel::base_url).collect(),
    }
}
