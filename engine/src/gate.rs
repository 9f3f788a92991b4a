//! Access Gate
//!
//! Decides which channels may use the bot. An empty allow-list allows every
//! channel.

use sdk::types::ChannelId;
use std::collections::HashSet;

#[derive(Debug, Clone, Default)]
pub struct AccessGate {
    allowed: HashSet<ChannelId>,
}

impl AccessGate {
    /// Gate restricted to `channels`. Blank entries are ignored, so a list
    /// made only of blanks allows everything.
    pub fn new<I, S>(channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allowed = channels
            .into_iter()
            .map(|c| c.as_ref().trim().to_string())
            .filter(|c| !c.is_empty())
            .map(ChannelId::from)
            .collect();

        Self { allowed }
    }

    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn is_allowed(&self, channel: &ChannelId) -> bool {
        self.allowed.is_empty() || self.allowed.contains(channel)
    }

    /// True when no allow-list is configured.
    pub fn is_open(&self) -> bool {
        self.allowed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.allowed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty()
    }
}
