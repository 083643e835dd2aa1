//! Value of the acceptance header sent along with channel requests.

use crate::channel::Channel;
use crate::path::SearchPath;
use crate::storage;

pub const ACCEPTANCE_HEADER: &str = "Anaconda-ToS-Accept";

/// Header value summarizing local decisions for `channels`.
///
/// In CI the value is `CI=true`. Otherwise one
/// `base_url=version=accepted|rejected=timestamp` entry per decided channel,
/// joined by `;`. Channels without a usable local record are left out.
pub fn acceptance_header(channels: &[Channel], search_path: &SearchPath, ci: bool) -> String {
    if ci {
        return "CI=true".to_string();
    }

    channels
        .iter()
        .filter_map(|channel| {
            let record = storage::read_latest(channel, search_path).ok()?;
            let decision = record.decision()?;
            let state = if decision.accepted {
                "accepted"
            } else {
                "rejected"
            };
            Some(format!(
                "{}={}={}={}",
                channel.base_url(),
                record.version(),
                state,
                decision.timestamp.timestamp()
            ))
        })
        .collect::<Vec<_>>()
        .join(";")
}
