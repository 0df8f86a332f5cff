//! Input format detection by file extension.
//!
//! Video URLs are recognised before any extension is looked at; they are
//! routed to the transcript extractor.
//!
//! Only PDF is ambiguous: it may carry a text layer or be a stack of scanned
//! images, so it goes through triage. Every other supported family is handed
//! straight to the structured converter.

use crate::pipeline::transcript::is_youtube_url;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Broad document family, derived from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentFormat {
    Pdf,
    WordProcessor,
    Spreadsheet,
    Presentation,
    Image,
    Audio,
    Archive,
    Markup,
    /// A video page URL (YouTube), transcribed from its captions.
    WebVideo,
    Unsupported,
}

impl DocumentFormat {
    /// Detect the format of a command-line input: a video URL first, then the
    /// file extension.
    pub fn from_input(input: &Path) -> Self {
        if input.to_str().is_some_and(is_youtube_url) {
            return Self::WebVideo;
        }
        Self::from_path(input)
    }

    /// Detect the format of `path` from its extension (case-insensitive).
    pub fn from_path(path: &Path) -> Self {
        let ext = extension_of(path);
        Self::from_extension(&ext)
    }

    /// Map a bare extension (without the dot) to a format.
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Self::Pdf,
            "docx" | "doc" | "odt" | "rtf" => Self::WordProcessor,
            "xlsx" | "xls" | "ods" | "csv" => Self::Spreadsheet,
            "pptx" | "ppt" | "odp" => Self::Presentation,
            "png" | "jpg" | "jpeg" | "gif" | "bmp" | "tif" | "tiff" | "webp" => Self::Image,
            "mp3" | "wav" | "m4a" | "ogg" | "flac" => Self::Audio,
            "zip" | "epub" | "msg" => Self::Archive,
            "html" | "htm" | "xml" | "json" | "txt" | "md" => Self::Markup,
            _ => Self::Unsupported,
        }
    }

    /// Whether this format goes through the classifier before extraction.
    pub fn needs_triage(self) -> bool {
        self == Self::Pdf
    }

    /// Whether the input names a remote resource rather than a local file.
    pub fn is_remote(self) -> bool {
        self == Self::WebVideo
    }

    pub fn is_supported(self) -> bool {
        self != Self::Unsupported
    }
}

/// Lower-cased extension of `path`, or an empty string.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pdf_needs_triage() {
        let f = DocumentFormat::from_path(Path::new("/tmp/Contrato.PDF"));
        assert_eq!(f, DocumentFormat::Pdf);
        assert!(f.needs_triage());
    }

    #[test]
    fn office_formats_go_straight_to_structured() {
        for name in ["a.docx", "b.xls", "c.pptx", "d.odt", "e.csv"] {
            let f = DocumentFormat::from_path(Path::new(name));
            assert!(f.is_supported(), "{name}");
            assert!(!f.needs_triage(), "{name}");
        }
    }

    #[test]
    fn media_and_markup_are_supported() {
        assert_eq!(DocumentFormat::from_extension("JPG"), DocumentFormat::Image);
        assert_eq!(DocumentFormat::from_extension("mp3"), DocumentFormat::Audio);
        assert_eq!(DocumentFormat::from_extension("epub"), DocumentFormat::Archive);
        assert_eq!(DocumentFormat::from_extension("html"), DocumentFormat::Markup);
    }

    #[test]
    fn unknown_and_missing_extensions_are_unsupported() {
        assert_eq!(DocumentFormat::from_path(Path::new("x.xyz")), DocumentFormat::Unsupported);
        assert_eq!(DocumentFormat::from_path(Path::new("Makefile")), DocumentFormat::Unsupported);
        assert_eq!(extension_of(Path::new("Makefile")), "");
    }

    #[test]
    fn video_urls_route_before_extensions() {
        let url = Path::new("https://www.youtube.com/watch?v=dQw4w9WgXcQ");
        assert_eq!(DocumentFormat::from_input(url), DocumentFormat::WebVideo);
        assert!(DocumentFormat::WebVideo.is_remote());
        // A URL-ish extension does not win over the URL match.
        let tricky = Path::new("youtu.be/dQw4w9WgXcQ.pdf");
        assert_eq!(DocumentFormat::from_input(tricky), DocumentFormat::WebVideo);
        assert_eq!(
            DocumentFormat::from_input(Path::new("/data/in/video.pdf")),
            DocumentFormat::Pdf
        );
    }
}
