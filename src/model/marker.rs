//! Inline markers embedded in normalized body text.
//!
//! The normalizer replaces emoji and resolved inline images with bracketed
//! markers so the body stays plain text through quote stripping. The
//! assembler splits marked text back into typed [`Inline`] runs.
//!
//! ```text
//! [[emoji:1f600]]          one glyph, codepoints in lowercase hex joined by '-'
//! [[image:3fa1c0de.png]]   a resolved inline image file
//! ```
//!
//! Bracket pairs already present in the message are escaped with
//! [`escape_literal`] before any marker is inserted, so only markers the
//! normalizer wrote are ever split out.

use serde::{Deserialize, Serialize};

const OPEN: &str = "[[";
const CLOSE: &str = "]]";

/// Placed after a literal `[` that is followed by another `[`.
const ESCAPE: char = '\u{E000}';
const ESCAPED_BRACKET: &str = "[\u{E000}";

/// A run of body content inside a paragraph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inline {
    Text { text: String },
    Emoji { codepoints: String },
    Image { file_name: String },
}

/// Marker text for an emoji glyph.
pub fn emoji_marker(codepoints: &str) -> String {
    format!("{OPEN}emoji:{codepoints}{CLOSE}")
}

/// Marker text for a resolved inline image.
pub fn image_marker(file_name: &str) -> String {
    format!("{OPEN}image:{file_name}{CLOSE}")
}

/// Break up every literal `[[` in message text so it cannot read as a marker.
pub fn escape_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        out.push(c);
        if c == '[' && chars.peek() == Some(&'[') {
            out.push(ESCAPE);
        }
    }
    out
}

/// Split text containing markers into inline runs.
///
/// Anything that looks like a marker but is not a known kind stays text.
pub fn split_inlines(text: &str) -> Vec<Inline> {
    let mut runs = Vec::new();
    let mut pending = String::new();
    let mut remaining = text;

    while let Some(start) = remaining.find(OPEN) {
        let after = &remaining[start + OPEN.len()..];
        let Some(end) = after.find(CLOSE) else {
            break;
        };
        let inner = &after[..end];

        let marker = if let Some(cp) = inner.strip_prefix("emoji:") {
            is_codepoint_list(cp).then(|| Inline::Emoji {
                codepoints: cp.to_string(),
            })
        } else {
            inner
                .strip_prefix("image:")
                .filter(|f| !f.is_empty() && !f.contains(['/', '\\']))
                .map(|f| Inline::Image {
                    file_name: f.to_string(),
                })
        };

        match marker {
            Some(inline) => {
                pending.push_str(&remaining[..start]);
                flush_text(&mut runs, &mut pending);
                runs.push(inline);
                remaining = &after[end + CLOSE.len()..];
            }
            None => {
                pending.push_str(&remaining[..=start]);
                remaining = &remaining[start + 1..];
            }
        }
    }

    pending.push_str(remaining);
    flush_text(&mut runs, &mut pending);
    runs
}

fn flush_text(runs: &mut Vec<Inline>, pending: &mut String) {
    if !pending.is_empty() {
        let text = std::mem::take(pending).replace(ESCAPED_BRACKET, "[");
        runs.push(Inline::Text { text });
    }
}

fn is_codepoint_list(s: &str) -> bool {
    !s.is_empty()
        && s.split('-')
            .all(|p| !p.is_empty() && p.len() <= 6 && p.chars().all(|c| c.is_ascii_hexdigit()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_mixed_text() {
        let text = format!("Hi {} look {}!", emoji_marker("1f600"), image_marker("ab.png"));
        let runs = split_inlines(&text);
        assert_eq!(
            runs,
            vec![
                Inline::Text { text: "Hi ".into() },
                Inline::Emoji { codepoints: "1f600".into() },
                Inline::Text { text: " look ".into() },
                Inline::Image { file_name: "ab.png".into() },
                Inline::Text { text: "!".into() },
            ]
        );
    }

    #[test]
    fn test_unknown_marker_stays_text() {
        let runs = split_inlines("see [[wiki:Page]] and [[emoji:zz]]");
        assert_eq!(
            runs,
            vec![Inline::Text {
                text: "see [[wiki:Page]] and [[emoji:zz]]".into()
            }]
        );
    }

    #[test]
    fn test_image_marker_rejects_paths() {
        let runs = split_inlines("[[image:../etc/passwd]]");
        assert!(matches!(runs.as_slice(), [Inline::Text { .. }]));
    }

    #[test]
    fn test_escaped_literal_marker_stays_text() {
        let text = escape_literal("write [[image:x.png]] or [[emoji:1f600]] here");
        assert!(!text.contains(OPEN));
        assert_eq!(
            split_inlines(&text),
            vec![Inline::Text {
                text: "write [[image:x.png]] or [[emoji:1f600]] here".into()
            }]
        );
    }

    #[test]
    fn test_escape_handles_bracket_runs() {
        let text = escape_literal("[[[image:x.png]]]");
        assert!(!text.contains(OPEN));
        assert_eq!(
            split_inlines(&text),
            vec![Inline::Text {
                text: "[[[image:x.png]]]".into()
            }]
        );
    }

    #[test]
    fn test_marker_after_literal_bracket() {
        let text = format!("{}{}]", escape_literal("["), emoji_marker("1f604"));
        assert_eq!(
            split_inlines(&text),
            vec![
                Inline::Text { text: "[".into() },
                Inline::Emoji { codepoints: "1f604".into() },
                Inline::Text { text: "]".into() },
            ]
        );

        let text = format!("{}{}", escape_literal("[["), emoji_marker("1f604"));
        assert_eq!(
            split_inlines(&text),
            vec![
                Inline::Text { text: "[[".into() },
                Inline::Emoji { codepoints: "1f604".into() },
            ]
        );
    }

    #[test]
    fn test_unterminated_marker() {
        let runs = split_inlines("tail [[emoji:1f600");
        assert_eq!(
            runs,
            vec![Inline::Text {
                text: "tail [[emoji:1f600".into()
            }]
        );
    }
}
