//! Stable entry ids derived from source URLs.
//!
//! Re-ingesting the same URL must always land on the same id so that a
//! second run upserts instead of duplicating.

use crate::error::{IngestError, Result};
use chrono::{DateTime, NaiveDate};
use regex::Regex;
use std::sync::OnceLock;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedId {
    pub id: String,
    /// Key under `urls` for the canonical link (`video`, `code`, `tweet`, `misc`).
    pub link_kind: &'static str,
    pub link: String,
}

fn video_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{6,}$").expect("valid video id regex"))
}

/// Pull the video id out of the usual YouTube URL shapes.
pub fn youtube_video_id(url: &Url) -> Option<String> {
    let host = url.host_str()?.trim_start_matches("www.").trim_start_matches("m.");
    let candidate = match host {
        "youtu.be" => url.path_segments()?.next().map(str::to_string),
        "youtube.com" | "music.youtube.com" => {
            let segments: Vec<&str> = url.path_segments()?.filter(|s| !s.is_empty()).collect();
            match segments.as_slice() {
                ["watch"] => url
                    .query_pairs()
                    .find(|(k, _)| k == "v")
                    .map(|(_, v)| v.into_owned()),
                ["shorts", id, ..] | ["embed", id, ..] | ["live", id, ..] => Some(id.to_string()),
                _ => None,
            }
        }
        _ => None,
    }?;
    video_id_re().is_match(&candidate).then_some(candidate)
}

pub fn youtube_entry_id(video_id: &str) -> String {
    format!("yt-{}", video_id)
}

/// Derive the entry id and canonical link for `raw`.
pub fn derive_entry_id(raw: &str) -> Result<DerivedId> {
    let url = Url::parse(raw.trim())
        .map_err(|e| IngestError::InvalidSource(format!("{}: {}", raw, e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(IngestError::InvalidSource(format!(
            "{}: unsupported scheme {}",
            raw,
            url.scheme()
        )));
    }
    let host = url
        .host_str()
        .ok_or_else(|| IngestError::InvalidSource(format!("{}: missing host", raw)))?
        .to_lowercase();
    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|p| !p.is_empty()).collect())
        .unwrap_or_default();

    if let Some(video_id) = youtube_video_id(&url) {
        return Ok(DerivedId {
            id: youtube_entry_id(&video_id),
            link_kind: "video",
            link: format!("https://www.youtube.com/watch?v={}", video_id),
        });
    }

    let bare_host = host.trim_start_matches("www.").trim_start_matches("mobile.");
    if bare_host == "github.com" && segments.len() >= 2 {
        let (owner, repo) = (segments[0], segments[1].trim_end_matches(".git"));
        return Ok(DerivedId {
            id: format!("gh-{}-{}-{}", bare_host.replace('.', "-"), owner, repo),
            link_kind: "code",
            link: format!("https://github.com/{}/{}", owner, repo),
        });
    }

    if matches!(bare_host, "twitter.com" | "x.com") {
        if let Some(pos) = segments.iter().position(|s| *s == "status") {
            if let Some(status) = segments.get(pos + 1) {
                if !status.is_empty() && status.chars().all(|c| c.is_ascii_digit()) {
                    return Ok(DerivedId {
                        id: status.to_string(),
                        link_kind: "tweet",
                        link: format!("https://twitter.com/i/web/status/{}", status),
                    });
                }
            }
        }
    }

    let slug = if segments.is_empty() {
        "root".to_string()
    } else {
        segments.join("-")
    };
    Ok(DerivedId {
        id: format!("link-{}-{}", host.replace('.', "-"), slug),
        link_kind: "misc",
        link: raw.trim().to_string(),
    })
}

/// Normalize a publish date to `YYYY-MM-DD`, falling back to `today`.
pub fn normalize_date(raw: Option<&str>, today: NaiveDate) -> String {
    raw.and_then(parse_date)
        .unwrap_or_else(|| today.format("%Y-%m-%d").to_string())
}

/// `YYYY-MM-DD` for dates, RFC 3339 and RFC 2822 timestamps, and `YYYYMMDD`.
pub fn parse_date(raw: &str) -> Option<String> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }
    if let Some(prefix) = value.get(..10) {
        if NaiveDate::parse_from_str(prefix, "%Y-%m-%d").is_ok() {
            return Some(prefix.to_string());
        }
    }
    if value.len() == 8 && value.bytes().all(|b| b.is_ascii_digit()) {
        let dashed = format!("{}-{}-{}", &value[..4], &value[4..6], &value[6..]);
        if NaiveDate::parse_from_str(&dashed, "%Y-%m-%d").is_ok() {
            return Some(dashed);
        }
    }
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|dt| dt.date_naive().format("%Y-%m-%d").to_string())
}

/// Parse a stored `createdAt` for ordering. `None` sorts last.
pub fn parse_created_at(value: &str) -> Option<NaiveDate> {
    let prefix = value.trim().get(..10)?;
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
    }

    #[test]
    fn test_youtube_shapes_share_an_id() {
        for raw in [
            "https://www.youtube.com/watch?v=7dm776rZz-s",
            "https://youtube.com/watch?v=7dm776rZz-s&t=42s",
            "https://youtu.be/7dm776rZz-s",
            "https://www.youtube.com/shorts/7dm776rZz-s",
            "https://m.youtube.com/watch?v=7dm776rZz-s",
        ] {
            let derived = derive_entry_id(raw).unwrap();
            assert_eq!(derived.id, "yt-7dm776rZz-s", "{}", raw);
            assert_eq!(derived.link_kind, "video");
        }
    }

    #[test]
    fn test_github_repo() {
        let derived = derive_entry_id("https://github.com/mrdoob/three.js/tree/dev/src").unwrap();
        assert_eq!(derived.id, "gh-github-com-mrdoob-three.js");
        assert_eq!(derived.link, "https://github.com/mrdoob/three.js");
        assert_eq!(derived.link_kind, "code");
    }

    #[test]
    fn test_github_profile_is_plain_link() {
        let derived = derive_entry_id("https://github.com/mrdoob").unwrap();
        assert_eq!(derived.id, "link-github-com-mrdoob");
        assert_eq!(derived.link_kind, "misc");
    }

    #[test]
    fn test_github_lookalike_hosts_are_plain_links() {
        let gist = derive_entry_id("https://gist.github.com/someone/abc123").unwrap();
        assert_eq!(gist.link_kind, "misc");
        assert_eq!(gist.id, "link-gist-github-com-someone-abc123");
        let other = derive_entry_id("https://notgithub.com/owner/repo").unwrap();
        assert_eq!(other.link_kind, "misc");
        assert_eq!(
            derive_entry_id("https://www.github.com/mrdoob/three.js").unwrap().link_kind,
            "code"
        );
    }

    #[test]
    fn test_tweet_status() {
        let derived = derive_entry_id("https://x.com/someone/status/1789012345678901234").unwrap();
        assert_eq!(derived.id, "1789012345678901234");
        assert_eq!(derived.link_kind, "tweet");
    }

    #[test]
    fn test_other_links() {
        assert_eq!(
            derive_entry_id("https://threejs-journey.com/lessons/shaders").unwrap().id,
            "link-threejs-journey-com-lessons-shaders"
        );
        assert_eq!(
            derive_entry_id("https://example.com/").unwrap().id,
            "link-example-com-root"
        );
    }

    #[test]
    fn test_derivation_is_stable() {
        let a = derive_entry_id("https://example.com/a/b").unwrap();
        let b = derive_entry_id("https://example.com/a/b").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid_sources_rejected() {
        assert!(derive_entry_id("not a url").is_err());
        assert!(derive_entry_id("ftp://example.com/file").is_err());
    }

    #[test]
    fn test_normalize_date() {
        assert_eq!(normalize_date(Some("2024-11-05"), today()), "2024-11-05");
        assert_eq!(normalize_date(Some("2024-11-05T18:30:00Z"), today()), "2024-11-05");
        assert_eq!(normalize_date(Some("20241105"), today()), "2024-11-05");
        assert_eq!(
            normalize_date(Some("Tue, 05 Nov 2024 18:30:00 +0000"), today()),
            "2024-11-05"
        );
        assert_eq!(normalize_date(Some("someday"), today()), "2025-03-01");
        assert_eq!(normalize_date(None, today()), "2025-03-01");
    }

    #[test]
    fn test_parse_created_at() {
        assert!(parse_created_at("2024-01-02").is_some());
        assert!(parse_created_at("2024-01-02T00:00:00Z").is_some());
        assert!(parse_created_at("").is_none());
        assert!(parse_created_at("yesterday").is_none());
    }
}
