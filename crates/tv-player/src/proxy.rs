//! Routing of channel URLs through the path-prefix relay.

use tv_proto::channel::Channel;
use tv_proto::config::ProxyConfig;

use crate::engine::StreamSource;

#[derive(Debug, Clone, PartialEq)]
pub struct ProxyRoute {
    base: String,
    user_agent_header: String,
}

impl ProxyRoute {
    pub fn new(base: impl Into<String>, user_agent_header: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            user_agent_header: user_agent_header.into(),
        }
    }

    pub fn from_config(config: &ProxyConfig) -> Self {
        Self::new(config.base.clone(), config.user_agent_header.clone())
    }

    /// No relay: URLs are used as-is and no override header is ever sent.
    pub fn direct() -> Self {
        Self::new("", "")
    }

    pub fn is_enabled(&self) -> bool {
        !self.base.is_empty()
    }

    pub fn is_routed(&self, url: &str) -> bool {
        self.is_enabled() && url.starts_with(&self.base)
    }

    /// Rewrite `url` to go through the relay unless it already does.
    pub fn route(&self, url: &str) -> String {
        if !self.is_enabled() || self.is_routed(url) {
            url.to_string()
        } else {
            format!("{}{}", self.base, url)
        }
    }

    /// Headers for a proxied request to `channel`.  Only the user-agent
    /// override, and only when the request actually goes via the relay.
    pub fn request_headers(&self, channel: &Channel) -> Vec<(String, String)> {
        match (&channel.user_agent, self.is_enabled()) {
            (Some(agent), true) if !self.user_agent_header.is_empty() => {
                vec![(self.user_agent_header.clone(), agent.clone())]
            }
            _ => Vec::new(),
        }
    }

    pub fn source_for(&self, channel: &Channel) -> StreamSource {
        StreamSource {
            url: self.route(&channel.url),
            headers: self.request_headers(channel),
        }
    }
}
