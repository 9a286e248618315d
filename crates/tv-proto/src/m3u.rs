//! Extended-M3U channel playlist parser.
//!
//! Pure text → `Vec<Channel>`.  An `#EXTINF` line captures a pending display
//! name; the next line starting with `http` is paired with it and the pending
//! name is cleared.  Everything else is ignored.  An empty result means "not
//! a playlist", which callers handle by treating the document URL as a single
//! direct stream.

use std::sync::OnceLock;

use regex::Regex;

use crate::channel::Channel;

const EXTINF: &str = "#EXTINF";
const EXTVLCOPT_UA: &str = "#extvlcopt:http-user-agent=";

#[derive(Debug, Default)]
struct Pending {
    name: String,
    user_agent: Option<String>,
}

fn inline_user_agent_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)(?:^|\s)(?:http-)?user-agent="([^"]+)""#).expect("static regex")
    })
}

pub fn parse_m3u(content: &str) -> Vec<Channel> {
    let mut channels: Vec<Channel> = Vec::new();
    let mut pending: Option<Pending> = None;
    // Index of the channel emitted by the previous URL line, so a trailing
    // #EXTVLCOPT can still attach to it.
    let mut last_emitted: Option<usize> = None;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if line.starts_with(EXTINF) {
            last_emitted = None;
            if let Some(name) = display_name(line) {
                pending = Some(Pending {
                    name,
                    user_agent: inline_user_agent(line),
                });
            }
            continue;
        }

        if let Some(agent) = vlcopt_user_agent(line) {
            if let Some(p) = pending.as_mut() {
                p.user_agent = Some(agent);
            } else if let Some(ch) = last_emitted.and_then(|i| channels.get_mut(i)) {
                if ch.user_agent.is_none() {
                    ch.user_agent = Some(agent);
                }
            }
            continue;
        }

        if is_stream_uri(line) {
            if let Some(p) = pending.take() {
                channels.push(Channel {
                    id: None,
                    name: p.name,
                    url: line.to_string(),
                    user_agent: p.user_agent,
                });
                last_emitted = Some(channels.len() - 1);
            }
        }
    }

    channels
}

fn is_stream_uri(line: &str) -> bool {
    line.starts_with("http")
}

/// Text after the first comma that is not inside a quoted attribute value.
/// The name itself may contain commas.
fn display_name(extinf: &str) -> Option<String> {
    let mut in_quotes = false;
    let split_at = extinf.char_indices().find_map(|(i, c)| match c {
        '"' => {
            in_quotes = !in_quotes;
            None
        }
        ',' if !in_quotes => Some(i),
        _ => None,
    })?;
    let name = extinf[split_at + 1..].trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

fn inline_user_agent(extinf: &str) -> Option<String> {
    inline_user_agent_re()
        .captures(extinf)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn vlcopt_user_agent(line: &str) -> Option<String> {
    let prefix = line.get(..EXTVLCOPT_UA.len())?;
    if !prefix.eq_ignore_ascii_case(EXTVLCOPT_UA) {
        return None;
    }
    let value = line[EXTVLCOPT_UA.len()..].trim().trim_matches('"').trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_channels_in_order() {
        let text = "#EXTINF:-1,Channel A\nhttp://x/a.m3u8\n#EXTINF:-1,Channel B\nhttp://x/b.m3u8";
        let channels = parse_m3u(text);
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[0].name, "Channel A");
        assert_eq!(channels[0].url, "http://x/a.m3u8");
        assert_eq!(channels[1].name, "Channel B");
        assert_eq!(channels[1].url, "http://x/b.m3u8");
        assert!(channels.iter().all(|c| c.id.is_none()));
    }

    #[test]
    fn test_no_http_lines_is_empty() {
        let text = "#EXTM3U\n#EXTINF:-1,Lonely\nrtmp://x/stream\n# comment";
        assert!(parse_m3u(text).is_empty());
        assert!(parse_m3u("").is_empty());
    }

    #[test]
    fn test_url_without_name_is_skipped() {
        let text = "http://x/orphan.m3u8\n#EXTINF:-1,Named\nhttps://x/named.m3u8";
        let channels = parse_m3u(text);
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].name, "Named");
    }

    #[test]
    fn test_pending_name_consumed_once() {
        let text = "#EXTINF:-1,Only\nhttp://x/1\nhttp://x/2";
        let channels = parse_m3u(text);
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].url, "http://x/1");
    }

    #[test]
    fn test_crlf_and_quoted_commas() {
        let text = "#EXTM3U\r\n#EXTINF:-1 tvg-id=\"n1\" group-title=\"News, World\",World News\r\nhttp://x/news.m3u8\r\n";
        let channels = parse_m3u(text);
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].name, "World News");
        assert_eq!(channels[0].url, "http://x/news.m3u8");
    }

    #[test]
    fn test_name_keeps_its_own_commas() {
        let text = concat!(
            "#EXTINF:-1,Channel A, HD\n",
            "http://x/a.m3u8\n",
            "#EXTINF:-1 group-title=\"News, Local\",Metro, Late Edition\n",
            "http://x/b.m3u8\n",
        );
        let channels = parse_m3u(text);
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[0].name, "Channel A, HD");
        assert_eq!(channels[1].name, "Metro, Late Edition");
    }

    #[test]
    fn test_scheme_prefix_is_case_sensitive() {
        let text = "#EXTINF:-1,Loud\nHTTP://x/loud.m3u8\n#EXTINF:-1,Quiet\nhttps://x/quiet.m3u8";
        let channels = parse_m3u(text);
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].name, "Quiet");
    }

    #[test]
    fn test_user_agent_sources() {
        let text = concat!(
            "#EXTINF:-1 user-agent=\"Inline/1.0\",First\n",
            "http://x/1.m3u8\n",
            "#EXTINF:-1,Second\n",
            "#EXTVLCOPT:http-user-agent=\"Before/2.0\"\n",
            "http://x/2.m3u8\n",
            "#EXTINF:-1,Third\n",
            "http://x/3.m3u8\n",
            "#EXTVLCOPT:http-user-agent=After/3.0\n",
        );
        let channels = parse_m3u(text);
        assert_eq!(channels.len(), 3);
        assert_eq!(channels[0].user_agent.as_deref(), Some("Inline/1.0"));
        assert_eq!(channels[1].user_agent.as_deref(), Some("Before/2.0"));
        assert_eq!(channels[2].user_agent.as_deref(), Some("After/3.0"));
    }

    #[test]
    fn test_empty_display_name_keeps_previous_pending() {
        let text = "#EXTINF:-1,Kept\n#EXTINF:-1,\nhttp://x/k.m3u8";
        let channels = parse_m3u(text);
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].name, "Kept");
    }
}
