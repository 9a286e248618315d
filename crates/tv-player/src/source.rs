//! Channel roster sources: an extended-M3U playlist or the backend listing
//! endpoint.

use std::time::Duration;

use tracing::{debug, info, warn};
use tv_proto::channel::{Channel, ChannelList};
use tv_proto::config::SourceConfig;
use tv_proto::error::FetchError;
use tv_proto::m3u::parse_m3u;

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelSource {
    /// Playlist document at a URL or local path.  A document that parses to
    /// nothing is taken to be a stream and becomes a single channel.
    Playlist { url: String, fallback_name: String },
    /// JSON array of channel records.
    Api { url: String },
}

/// A freshly fetched roster.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedList {
    pub list: ChannelList,
    /// The playlist parsed to nothing and the single-channel fallback was used.
    pub fallback: bool,
}

pub fn build_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder().timeout(timeout).build()
}

impl ChannelSource {
    pub fn from_config(config: &SourceConfig) -> Self {
        match &config.api_url {
            Some(url) if !url.is_empty() => ChannelSource::Api { url: url.clone() },
            _ => ChannelSource::Playlist {
                url: config.playlist_url.clone(),
                fallback_name: config.fallback_name.clone(),
            },
        }
    }

    pub fn url(&self) -> &str {
        match self {
            ChannelSource::Playlist { url, .. } | ChannelSource::Api { url } => url,
        }
    }

    pub async fn fetch(&self, client: &reqwest::Client) -> Result<FetchedList, FetchError> {
        match self {
            ChannelSource::Playlist { url, fallback_name } => {
                let text = if is_remote(url) {
                    get_text(client, url).await?
                } else {
                    tokio::fs::read_to_string(url)
                        .await
                        .map_err(|e| FetchError::Network {
                            url: url.clone(),
                            reason: e.to_string(),
                        })?
                };
                playlist_from_text(&text, url, fallback_name)
            }
            ChannelSource::Api { url } => {
                let text = get_text(client, url).await?;
                let channels: Vec<Channel> =
                    serde_json::from_str(&text).map_err(|e| FetchError::Malformed {
                        url: url.clone(),
                        reason: e.to_string(),
                    })?;
                let list = ChannelList::new(channels).map_err(|e| FetchError::Malformed {
                    url: url.clone(),
                    reason: e.to_string(),
                })?;
                info!("loaded {} channels from {}", list.len(), url);
                Ok(FetchedList {
                    list,
                    fallback: false,
                })
            }
        }
    }
}

fn is_remote(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

async fn get_text(client: &reqwest::Client, url: &str) -> Result<String, FetchError> {
    let network = |e: reqwest::Error| FetchError::Network {
        url: url.to_string(),
        reason: e.to_string(),
    };
    let response = client.get(url).send().await.map_err(network)?;
    if !response.status().is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status: response.status().as_u16(),
        });
    }
    response.text().await.map_err(network)
}

fn playlist_from_text(
    text: &str,
    url: &str,
    fallback_name: &str,
) -> Result<FetchedList, FetchError> {
    let channels = parse_m3u(text);
    if channels.is_empty() {
        warn!("{} holds no channel entries, playing it as a single stream", url);
        return Ok(FetchedList {
            list: ChannelList::single(fallback_name, url),
            fallback: true,
        });
    }
    debug!("parsed {} playlist entries from {}", channels.len(), url);
    let list = ChannelList::new(channels).map_err(|e| FetchError::Malformed {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    info!("loaded {} channels from {}", list.len(), url);
    Ok(FetchedList {
        list,
        fallback: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_takes_precedence() {
        let mut config = SourceConfig::default();
        assert!(matches!(
            ChannelSource::from_config(&config),
            ChannelSource::Playlist { .. }
        ));
        config.api_url = Some("http://127.0.0.1:8081/api/channels".into());
        assert_eq!(
            ChannelSource::from_config(&config),
            ChannelSource::Api {
                url: "http://127.0.0.1:8081/api/channels".into()
            }
        );
    }

    #[test]
    fn test_empty_playlist_becomes_single_channel() {
        let fetched =
            playlist_from_text("#EXTM3U\n", "http://x/live.m3u8", "Live").unwrap();
        assert!(fetched.fallback);
        assert_eq!(fetched.list.len(), 1);
        let only = fetched.list.get(0).unwrap();
        assert_eq!(only.name, "Live");
        assert_eq!(only.url, "http://x/live.m3u8");
    }

    #[tokio::test]
    async fn test_local_playlist_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("list.m3u");
        std::fs::write(
            &path,
            "#EXTM3U\n#EXTINF:-1,One\nhttp://x/1\n#EXTINF:-1,Two\nhttp://x/2\n",
        )
        .unwrap();
        let source = ChannelSource::Playlist {
            url: path.display().to_string(),
            fallback_name: "Live".into(),
        };
        let client = build_client(Duration::from_secs(1)).unwrap();
        let fetched = source.fetch(&client).await.unwrap();
        assert_eq!(fetched.list.len(), 2);
        assert!(!fetched.fallback);
    }

    #[tokio::test]
    async fn test_missing_local_file_is_an_error() {
        let source = ChannelSource::Playlist {
            url: "/definitely/not/here.m3u".into(),
            fallback_name: "Live".into(),
        };
        let client = build_client(Duration::from_secs(1)).unwrap();
        assert!(matches!(
            source.fetch(&client).await,
            Err(FetchError::Network { .. })
        ));
    }
}
