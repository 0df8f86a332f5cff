//! Web-video transcripts: a YouTube URL in, a Markdown transcript out.
//!
//! Videos skip triage entirely. [`fetch_transcript`] asks a
//! [`TranscriptSource`] for the published caption tracks, picks one by
//! language preference (manual captions before auto-generated ones), and
//! falls back to direct per-language fetches when the listing fails.
//! [`YouTubeWebSource`] is the production source; tests inject fakes.

use crate::error::TranscriptError;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Caption languages tried in order.
pub const PREFERRED_LANGUAGES: &[&str] = &["pt", "pt-BR", "en", "en-US"];

/// Language groups for direct fetches, with the label each one reports.
const DIRECT_GROUPS: &[(&[&str], &str)] = &[
    (&["pt", "pt-BR"], "PT"),
    (&["en", "en-US"], "EN"),
    (&[], "Default"),
];

static YOUTUBE_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(https?://)?(www\.)?(youtube|youtu|youtube-nocookie)\.(com|be)/(watch\?v=|embed/|v/|.+\?v=)?([^&=%\?]{11})",
    )
    .unwrap()
});

static VIDEO_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:v=|/)([0-9A-Za-z_-]{11})").unwrap());

/// Whether `input` looks like a YouTube video URL.
pub fn is_youtube_url(input: &str) -> bool {
    YOUTUBE_URL.is_match(input.trim())
}

/// The 11-character video ID carried by a YouTube URL.
pub fn extract_video_id(url: &str) -> Option<String> {
    VIDEO_ID
        .captures(url.trim())
        .map(|c| c[1].to_string())
}

/// One caption track published for a video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptTrack {
    pub language_code: String,
    /// Auto-generated (speech recognition) rather than uploaded captions.
    pub generated: bool,
    /// Where the track's content can be fetched.
    pub url: String,
}

/// Somewhere caption tracks can be listed and fetched.
///
/// Fetch methods return the caption snippets in playback order.
#[async_trait]
pub trait TranscriptSource: Send + Sync {
    async fn list(&self, video_id: &str) -> Result<Vec<TranscriptTrack>, TranscriptError>;

    async fn fetch(
        &self,
        video_id: &str,
        track: &TranscriptTrack,
    ) -> Result<Vec<String>, TranscriptError>;

    /// Fetch without a listing, trying `languages` in order. An empty slice
    /// means the source's default language.
    async fn fetch_direct(
        &self,
        video_id: &str,
        languages: &[&str],
    ) -> Result<Vec<String>, TranscriptError>;
}

/// A fetched transcript ready for rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    pub video_id: String,
    /// Which route produced the text, e.g. `Nativo (pt)`.
    pub info: String,
    pub text: String,
}

impl Transcript {
    /// Markdown document for `url`.
    pub fn to_markdown(&self, url: &str) -> String {
        format!(
            "# Transcrição YouTube\n**URL:** {url}\n**Video ID:** {}\n**Info:** {}\n\n---\n\n{}",
            self.video_id, self.info, self.text
        )
    }
}

/// Flatten snippets into one paragraph.
pub fn join_snippets(snippets: &[String]) -> String {
    snippets
        .iter()
        .map(|s| s.replace('\n', " "))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Pick a track: preferred languages in order, manual captions first.
pub fn select_track(tracks: &[TranscriptTrack]) -> Option<(&TranscriptTrack, bool)> {
    for generated in [false, true] {
        for lang in PREFERRED_LANGUAGES {
            if let Some(track) = tracks
                .iter()
                .find(|t| t.generated == generated && t.language_code == *lang)
            {
                return Some((track, true));
            }
        }
    }
    tracks.first().map(|t| (t, false))
}

async fn bounded<T, F>(limit: Duration, fut: F) -> Result<T, TranscriptError>
where
    F: Future<Output = Result<T, TranscriptError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(TranscriptError::Timeout(limit.as_secs())),
    }
}

async fn from_listing(
    source: &dyn TranscriptSource,
    video_id: &str,
    limit: Duration,
) -> Result<(String, String), TranscriptError> {
    let tracks = bounded(limit, source.list(video_id)).await?;
    let (track, preferred) = select_track(&tracks)
        .ok_or_else(|| TranscriptError::NotFound("video has no caption tracks".into()))?;
    debug!(
        "Video {}: using track {} (generated: {})",
        video_id, track.language_code, track.generated
    );
    let snippets = bounded(limit, source.fetch(video_id, track)).await?;
    let info = if preferred {
        format!("Nativo ({})", track.language_code)
    } else {
        format!("Nativo - Fallback ({})", track.language_code)
    };
    Ok((join_snippets(&snippets), info))
}

async fn from_direct(
    source: &dyn TranscriptSource,
    video_id: &str,
    limit: Duration,
) -> Result<(String, String), TranscriptError> {
    let mut last = TranscriptError::NotFound("no direct fetch attempted".into());
    for (languages, label) in DIRECT_GROUPS {
        match bounded(limit, source.fetch_direct(video_id, languages)).await {
            Ok(snippets) => {
                return Ok((
                    join_snippets(&snippets),
                    format!("Nativo ({label}) - Fetch Direto"),
                ))
            }
            Err(e) => {
                debug!("Video {}: direct fetch ({}) failed: {}", video_id, label, e);
                last = e;
            }
        }
    }
    Err(last)
}

/// Fetch the transcript of the video at `url`.
///
/// Every source call is bounded by `limit`. An empty transcript is an error.
pub async fn fetch_transcript(
    source: &dyn TranscriptSource,
    url: &str,
    limit: Duration,
) -> Result<Transcript, TranscriptError> {
    let video_id =
        extract_video_id(url).ok_or_else(|| TranscriptError::InvalidUrl(url.to_string()))?;
    info!("Fetching transcript for video {}", video_id);

    let (text, info) = match from_listing(source, &video_id, limit).await {
        Ok(found) => found,
        Err(e) => {
            warn!("Video {}: track listing failed ({}), trying direct fetch", video_id, e);
            from_direct(source, &video_id, limit).await?
        }
    };

    if text.trim().is_empty() {
        return Err(TranscriptError::NotFound("transcript is empty".into()));
    }
    Ok(Transcript {
        video_id,
        info,
        text,
    })
}

// ── YouTube web source ───────────────────────────────────────────────────────

const WATCH_URL: &str = "https://www.youtube.com/watch";
const TIMEDTEXT_URL: &str = "https://www.youtube.com/api/timedtext";

/// Reads caption tracks from the public watch page and the timedtext API.
pub struct YouTubeWebSource {
    client: reqwest::Client,
}

impl YouTubeWebSource {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self { client }
    }

    async fn get_text(&self, url: &str) -> Result<String, TranscriptError> {
        let response = self
            .client
            .get(url)
            .header("Accept-Language", "pt-BR,pt;q=0.9,en;q=0.8")
            .send()
            .await
            .map_err(|e| TranscriptError::Request(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(TranscriptError::Request(format!("HTTP {status} for {url}")));
        }
        response
            .text()
            .await
            .map_err(|e| TranscriptError::Request(format!("reading response: {e}")))
    }
}

#[async_trait]
impl TranscriptSource for YouTubeWebSource {
    async fn list(&self, video_id: &str) -> Result<Vec<TranscriptTrack>, TranscriptError> {
        let page = self.get_text(&format!("{WATCH_URL}?v={video_id}")).await?;
        parse_caption_tracks(&page)
    }

    async fn fetch(
        &self,
        _video_id: &str,
        track: &TranscriptTrack,
    ) -> Result<Vec<String>, TranscriptError> {
        let body = self.get_text(&track.url).await?;
        Ok(parse_timedtext(&body))
    }

    async fn fetch_direct(
        &self,
        video_id: &str,
        languages: &[&str],
    ) -> Result<Vec<String>, TranscriptError> {
        let languages = if languages.is_empty() { &["en"][..] } else { languages };
        for lang in languages {
            let url = format!("{TIMEDTEXT_URL}?v={video_id}&lang={lang}");
            let snippets = parse_timedtext(&self.get_text(&url).await?);
            if !snippets.is_empty() {
                return Ok(snippets);
            }
        }
        Err(TranscriptError::NotFound(format!(
            "no captions in {}",
            languages.join(", ")
        )))
    }
}

#[derive(Deserialize)]
struct RawTrack {
    #[serde(rename = "baseUrl")]
    base_url: String,
    #[serde(rename = "languageCode")]
    language_code: String,
    #[serde(default)]
    kind: Option<String>,
}

/// Caption tracks embedded in a watch page's player response.
pub fn parse_caption_tracks(page: &str) -> Result<Vec<TranscriptTrack>, TranscriptError> {
    const MARKER: &str = "\"captionTracks\":";
    let start = page
        .find(MARKER)
        .ok_or_else(|| TranscriptError::NotFound("transcripts are disabled".into()))?;
    let rest = &page[start + MARKER.len()..];

    let raw: Vec<RawTrack> = serde_json::Deserializer::from_str(rest)
        .into_iter::<Vec<RawTrack>>()
        .next()
        .ok_or_else(|| TranscriptError::Request("caption track list is truncated".into()))?
        .map_err(|e| TranscriptError::Request(format!("caption track list: {e}")))?;

    Ok(raw
        .into_iter()
        .map(|t| TranscriptTrack {
            generated: t.kind.as_deref() == Some("asr"),
            language_code: t.language_code,
            url: t.base_url,
        })
        .collect())
}

static TEXT_ELEMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<text\b[^>]*>(.*?)</text>").unwrap());
static NUMERIC_ENTITY: Lazy<Regex> = Lazy::new(|| Regex::new(r"&#(x?[0-9A-Fa-f]+);").unwrap());

/// Snippets of a timedtext XML body, entities decoded, blanks dropped.
pub fn parse_timedtext(body: &str) -> Vec<String> {
    TEXT_ELEMENT
        .captures_iter(body)
        .map(|c| unescape(&unescape(&c[1])))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn unescape(s: &str) -> String {
    let s = NUMERIC_ENTITY.replace_all(s, |c: &regex::Captures| {
        let code = &c[1];
        let value = match code.strip_prefix('x') {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => code.parse().ok(),
        };
        value
            .and_then(char::from_u32)
            .map(|ch| ch.to_string())
            .unwrap_or_else(|| c[0].to_string())
    });
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(lang: &str, generated: bool) -> TranscriptTrack {
        TranscriptTrack {
            language_code: lang.into(),
            generated,
            url: format!("https://captions.test/{lang}"),
        }
    }

    #[test]
    fn recognises_youtube_urls() {
        assert!(is_youtube_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ"));
        assert!(is_youtube_url("youtu.be/dQw4w9WgXcQ"));
        assert!(is_youtube_url("https://www.youtube-nocookie.com/embed/dQw4w9WgXcQ"));
        assert!(!is_youtube_url("https://vimeo.com/123456789"));
        assert!(!is_youtube_url("/data/in/youtube.pdf"));
    }

    #[test]
    fn extracts_video_ids() {
        assert_eq!(
            extract_video_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=42").as_deref(),
            Some("dQw4w9WgXcQ")
        );
        assert_eq!(
            extract_video_id("https://youtu.be/dQw4w9WgXcQ").as_deref(),
            Some("dQw4w9WgXcQ")
        );
        assert_eq!(extract_video_id("https://www.youtube.com/"), None);
    }

    #[test]
    fn manual_preferred_language_wins() {
        let tracks = vec![track("fr", false), track("en", true), track("en", false)];
        let (chosen, preferred) = select_track(&tracks).unwrap();
        assert_eq!(chosen, &tracks[2]);
        assert!(preferred);
    }

    #[test]
    fn language_order_beats_listing_order() {
        let tracks = vec![track("en", false), track("pt-BR", false)];
        assert_eq!(select_track(&tracks).unwrap().0.language_code, "pt-BR");
    }

    #[test]
    fn generated_preferred_beats_manual_other_language() {
        let tracks = vec![track("de", false), track("pt", true)];
        let (chosen, preferred) = select_track(&tracks).unwrap();
        assert_eq!(chosen.language_code, "pt");
        assert!(preferred);
    }

    #[test]
    fn unknown_languages_fall_back_to_first_track() {
        let tracks = vec![track("ja", true), track("de", false)];
        let (chosen, preferred) = select_track(&tracks).unwrap();
        assert_eq!(chosen.language_code, "ja");
        assert!(!preferred);
        assert!(select_track(&[]).is_none());
    }

    #[test]
    fn snippets_flatten_to_one_paragraph() {
        let snippets = vec!["olá\nmundo".to_string(), "tudo bem".to_string()];
        assert_eq!(join_snippets(&snippets), "olá mundo tudo bem");
    }

    #[test]
    fn markdown_layout() {
        let t = Transcript {
            video_id: "dQw4w9WgXcQ".into(),
            info: "Nativo (pt)".into(),
            text: "olá".into(),
        };
        assert_eq!(
            t.to_markdown("https://youtu.be/dQw4w9WgXcQ"),
            "# Transcrição YouTube\n**URL:** https://youtu.be/dQw4w9WgXcQ\n\
             **Video ID:** dQw4w9WgXcQ\n**Info:** Nativo (pt)\n\n---\n\nolá"
        );
    }

    #[test]
    fn parses_caption_tracks_from_watch_page() {
        let page = r#"var ytInitialPlayerResponse = {"captions":{"playerCaptionsTracklistRenderer":{"captionTracks":[{"baseUrl":"https://www.youtube.com/api/timedtext?v=x&lang=pt","languageCode":"pt","kind":"asr"},{"baseUrl":"https://www.youtube.com/api/timedtext?v=x&lang=en","languageCode":"en"}],"audioTracks":[]}}};"#;
        let tracks = parse_caption_tracks(page).unwrap();
        assert_eq!(tracks.len(), 2);
        assert!(tracks[0].generated);
        assert_eq!(tracks[0].url, "https://www.youtube.com/api/timedtext?v=x&lang=pt");
        assert!(!tracks[1].generated);
        assert_eq!(tracks[1].language_code, "en");
    }

    #[test]
    fn page_without_captions_is_not_found() {
        assert!(matches!(
            parse_caption_tracks("<html></html>"),
            Err(TranscriptError::NotFound(_))
        ));
    }

    #[test]
    fn timedtext_entities_are_decoded() {
        let body = r#"<?xml version="1.0"?><transcript><text start="0" dur="1.5">it&amp;#39;s &quot;fine&quot;</text><text start="2">  </text><text start="3">a &lt; b
c</text></transcript>"#;
        assert_eq!(parse_timedtext(body), vec!["it's \"fine\"", "a < b\nc"]);
    }
}
