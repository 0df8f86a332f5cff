//! Response parsing and cleanup for cloud page output.
//!
//! Response grammar, applied to the trimmed reply:
//!
//! ```text
//! response := [open-fence] body [close-fence]
//! open-fence  := "```markdown" (any case) | "```" followed by end of line
//! close-fence := "```" at the very end
//! ```
//!
//! Whatever remains after the fences is the page body. An empty body is a
//! page-scoped failure, reported as `None` by [`parse_response`].
//!
//! After parsing, a few deterministic rules tidy the body without touching
//! content: line endings, invisible characters, runs of blank lines.

use once_cell::sync::Lazy;
use regex::Regex;

/// Strip response fences and clean the body. `None` if nothing is left.
pub fn parse_response(raw: &str) -> Option<String> {
    let body = strip_fences(raw);
    let s = normalise_line_endings(body);
    let s = remove_invisible_chars(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    let s = s.trim();
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

// ── Rule 1: Strip fences ─────────────────────────────────────────────────────

const FENCE: &str = "```";
const MARKDOWN_FENCE: &str = "```markdown";

fn strip_fences(raw: &str) -> &str {
    let mut s = raw.trim();

    if s.len() >= MARKDOWN_FENCE.len()
        && s.is_char_boundary(MARKDOWN_FENCE.len())
        && s[..MARKDOWN_FENCE.len()].eq_ignore_ascii_case(MARKDOWN_FENCE)
    {
        s = s[MARKDOWN_FENCE.len()..].trim();
    } else if let Some(rest) = s.strip_prefix(FENCE) {
        // Bare fence only when nothing else sits on the opening line.
        if rest.starts_with('\n') || rest.starts_with("\r\n") || rest.is_empty() {
            s = rest.trim();
        }
    }

    if let Some(rest) = s.strip_suffix(FENCE) {
        s = rest.trim();
    }
    s
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Remove invisible Unicode ─────────────────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        ['\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}'],
        "",
    )
}

// ── Rule 4: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 5: Collapse excessive blank lines ───────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n\n").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_markdown_fence_any_case() {
        assert_eq!(parse_response("```markdown\n# Título\ntexto\n```").unwrap(), "# Título\ntexto");
        assert_eq!(parse_response("```MarkDown\n# A\n```").unwrap(), "# A");
    }

    #[test]
    fn strips_bare_fence() {
        assert_eq!(parse_response("```\n# Hello\n```").unwrap(), "# Hello");
    }

    #[test]
    fn leaves_other_code_fences_alone() {
        let raw = "```python\nprint(1)\n```";
        // Language tag other than markdown: opening line kept, closing fence stripped.
        assert_eq!(parse_response(raw).unwrap(), "```python\nprint(1)");
    }

    #[test]
    fn unfenced_passthrough() {
        assert_eq!(parse_response("  # Hello\nWorld  \n").unwrap(), "# Hello\nWorld");
    }

    #[test]
    fn empty_after_stripping_is_none() {
        assert_eq!(parse_response("```markdown\n```"), None);
        assert_eq!(parse_response("   \n"), None);
        assert_eq!(parse_response("\u{200B}"), None);
    }

    #[test]
    fn cleanup_rules() {
        let out = parse_response("a\r\n\r\n\r\n\r\n\r\nb\u{00AD}c").unwrap();
        assert_eq!(out, "a\n\n\nbc");
    }
}
