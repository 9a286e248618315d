//! Background reachability checks for every channel but the active one.
//!
//! Each probe is a single GET through the relay.  Redirects are not
//! followed: a 3xx answer is opaque and counts as reachable, the same as
//! any 2xx.  Results come back to the core as `ProbeFinished` events tagged
//! with the round they belong to.

use std::time::Duration;

use reqwest::redirect;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use tv_proto::channel::ChannelList;
use tv_proto::protocol::{AvailabilityStatus, ProbeFailure};

use crate::core::PlayerEvent;
use crate::proxy::ProxyRoute;

#[derive(Clone)]
pub struct Prober {
    client: reqwest::Client,
    route: ProxyRoute,
}

impl Prober {
    pub fn new(route: ProxyRoute, timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(redirect::Policy::none())
            .build()?;
        Ok(Self { client, route })
    }

    /// Start probing every channel except `skip`.  Returns how many probes
    /// were launched; exactly that many `ProbeFinished` events will follow.
    pub fn probe_all(
        &self,
        round: u64,
        channels: &ChannelList,
        skip: Option<usize>,
        tx: &mpsc::Sender<PlayerEvent>,
    ) -> usize {
        let mut launched = 0;
        for (index, channel) in channels.iter().enumerate() {
            if Some(index) == skip {
                continue;
            }
            let target = self.route.route(&channel.url);
            let headers = self.route.request_headers(channel);
            let client = self.client.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let (status, failure) = probe(&client, &target, &headers).await;
                let _ = tx
                    .send(PlayerEvent::ProbeFinished {
                        round,
                        index,
                        status,
                        failure,
                    })
                    .await;
            });
            launched += 1;
        }
        debug!("probe round {}: {} channels", round, launched);
        launched
    }
}

pub async fn probe(
    client: &reqwest::Client,
    target: &str,
    headers: &[(String, String)],
) -> (AvailabilityStatus, Option<ProbeFailure>) {
    let mut request = client.get(target);
    for (name, value) in headers {
        request = request.header(name.as_str(), value.as_str());
    }

    match request.send().await {
        Ok(response) => {
            let status = response.status();
            if status.is_success() || status.is_redirection() {
                (AvailabilityStatus::Online, None)
            } else {
                let failure = ProbeFailure {
                    target: target.to_string(),
                    status: Some(status.as_u16()),
                    reason: status
                        .canonical_reason()
                        .unwrap_or("unexpected status")
                        .to_string(),
                };
                warn!("probe {} answered {}", target, status);
                (AvailabilityStatus::Offline, Some(failure))
            }
        }
        Err(e) => {
            warn!("probe {} failed: {}", target, e);
            (
                AvailabilityStatus::Offline,
                Some(ProbeFailure {
                    target: target.to_string(),
                    status: None,
                    reason: e.to_string(),
                }),
            )
        }
    }
}
