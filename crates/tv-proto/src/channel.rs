use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::ChannelListError;

/// One playable channel.  `name` and `url` are always present; `id` only
/// when the roster came from the backend listing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Channel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub url: String,
    /// Per-channel user-agent override, forwarded to the relay on proxied
    /// requests only.
    #[serde(
        default,
        rename = "userAgent",
        alias = "user_agent",
        skip_serializing_if = "Option::is_none"
    )]
    pub user_agent: Option<String>,
}

impl Channel {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            ..Self::default()
        }
    }

    /// True when switching from `self` to `other` would play the same stream.
    pub fn same_stream(&self, other: &Channel) -> bool {
        self.url == other.url && self.user_agent == other.user_agent
    }
}

/// Ordered channel roster.  Position is the navigation index (0-based here,
/// 1-based on screen).  Ids, when present, are unique.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ChannelList {
    channels: Vec<Channel>,
}

impl ChannelList {
    pub fn new(channels: Vec<Channel>) -> Result<Self, ChannelListError> {
        let mut seen = HashSet::new();
        for channel in &channels {
            if channel.name.trim().is_empty() || channel.url.trim().is_empty() {
                return Err(ChannelListError::MissingField {
                    name: channel.name.clone(),
                });
            }
            if let Some(id) = &channel.id {
                if !seen.insert(id.as_str()) {
                    return Err(ChannelListError::DuplicateId(id.clone()));
                }
            }
        }
        Ok(Self { channels })
    }

    /// A roster holding a single direct stream.  Used when a playlist
    /// document parses to nothing and is assumed to be a stream itself.
    pub fn single(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            channels: vec![Channel::new(name, url)],
        }
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Channel> {
        self.channels.get(idx)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Channel> {
        self.channels.iter()
    }

    pub fn position_by_id(&self, id: &str) -> Option<usize> {
        self.channels
            .iter()
            .position(|c| c.id.as_deref() == Some(id))
    }

    pub fn position_by_url(&self, url: &str) -> Option<usize> {
        self.channels.iter().position(|c| c.url == url)
    }

    /// Find `channel` in this list: by id when it has one, otherwise by URL.
    pub fn locate(&self, channel: &Channel) -> Option<usize> {
        match &channel.id {
            Some(id) => self.position_by_id(id),
            None => self.position_by_url(&channel.url),
        }
    }

    /// Wrap-around successor of `idx`.  `None` on an empty list.
    pub fn next_index(&self, idx: usize) -> Option<usize> {
        if self.channels.is_empty() {
            return None;
        }
        Some((idx + 1) % self.channels.len())
    }

    /// Wrap-around predecessor of `idx`.  `None` on an empty list.
    pub fn prev_index(&self, idx: usize) -> Option<usize> {
        let len = self.channels.len();
        if len == 0 {
            return None;
        }
        Some((idx % len + len - 1) % len)
    }
}

impl<'a> IntoIterator for &'a ChannelList {
    type Item = &'a Channel;
    type IntoIter = std::slice::Iter<'a, Channel>;

    fn into_iter(self) -> Self::IntoIter {
        self.channels.iter()
    }
}
