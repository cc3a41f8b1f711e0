//! MIME body selection, inline image extraction and HTML-to-text conversion.

use mail_parser::{MessageParser, MimeHeaders, PartType};
use tracing::debug;

use crate::error::MessageIssue;
use crate::parser::mbox::find_header_end;

/// Body text and embedded images pulled out of one message.
#[derive(Debug, Default)]
pub struct ExtractedBody {
    /// Plain text; HTML-only messages are converted.
    pub text: String,
    /// Image parts carrying a Content-ID.
    pub images: Vec<ImagePart>,
    pub issue: Option<MessageIssue>,
}

/// An image part as found in the message, not yet named or resolved.
#[derive(Debug, Clone)]
pub struct ImagePart {
    pub content_id: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// Extract the body of a raw message (headers + body, no `From ` line).
///
/// Prefers the first `text/plain` part; when the message only has HTML the
/// HTML is converted with [`html_to_text`]. `charset_hint` is the top-level
/// `Content-Type` charset, used when `mail-parser` cannot parse the message.
pub fn extract_body(raw_message: &[u8], charset_hint: Option<&str>) -> ExtractedBody {
    let Some(msg) = MessageParser::default().parse(raw_message) else {
        debug!("mail-parser rejected message, decoding body by hand");
        let body_start = find_header_end(raw_message)
            .map(|pos| skip_blank_separator(raw_message, pos))
            .unwrap_or(raw_message.len());
        let (text, issue) = decode_fallback_body(&raw_message[body_start..], charset_hint);
        return ExtractedBody {
            text,
            images: Vec::new(),
            issue,
        };
    };

    let part = msg.text_part(0);
    let mut text = match part.map(|p| &p.body) {
        Some(PartType::Text(text)) => text.to_string(),
        Some(PartType::Html(html)) => html_to_text(html),
        _ => msg
            .body_html(0)
            .map(|html| html_to_text(&html))
            .unwrap_or_default(),
    };

    let mut issue = None;
    if text.contains('\u{FFFD}') {
        let charset = part
            .and_then(|p| p.content_type())
            .and_then(|ct| ct.attribute("charset"))
            .or(charset_hint)
            .unwrap_or("us-ascii")
            .to_string();
        // A known charset still gives readable text; an unknown one gives noise
        let lossy = encoding_rs::Encoding::for_label(charset.as_bytes()).is_some();
        if !lossy {
            text.clear();
        }
        issue = Some(MessageIssue::EncodingFailure { charset, lossy });
    }

    let images = msg
        .attachments()
        .filter_map(|part| {
            let ct = part.content_type()?;
            if !ct.ctype().eq_ignore_ascii_case("image") {
                return None;
            }
            let content_id = part.content_id()?;
            Some(ImagePart {
                content_id: content_id.trim_matches(['<', '>']).to_string(),
                content_type: format!("image/{}", ct.subtype().unwrap_or("octet-stream")),
                data: part.contents().to_vec(),
            })
        })
        .collect();

    ExtractedBody {
        text: normalize_newlines(&text),
        images,
        issue,
    }
}

/// Decode a body without MIME structure.
///
/// UTF-8 first, then the declared charset. Returns an empty body when no
/// known encoding fits.
fn decode_fallback_body(bytes: &[u8], charset: Option<&str>) -> (String, Option<MessageIssue>) {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return (normalize_newlines(text), None);
    }

    let label = charset.unwrap_or("us-ascii");
    match encoding_rs::Encoding::for_label(label.as_bytes()) {
        Some(encoding) => {
            if let Some(text) = encoding.decode_without_bom_handling_and_without_replacement(bytes)
            {
                return (normalize_newlines(&text), None);
            }
            let (text, _, _) = encoding.decode(bytes);
            let issue = MessageIssue::EncodingFailure {
                charset: label.to_string(),
                lossy: true,
            };
            (normalize_newlines(&text), Some(issue))
        }
        None => {
            let issue = MessageIssue::EncodingFailure {
                charset: label.to_string(),
                lossy: false,
            };
            (String::new(), Some(issue))
        }
    }
}

fn skip_blank_separator(data: &[u8], header_end: usize) -> usize {
    if data[header_end..].starts_with(b"\r\n\r\n") {
        header_end + 4
    } else {
        header_end + 2
    }
}

fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Convert HTML to plain text, keeping the structure the book cares about.
///
/// - `<p>`, headings and `<blockquote>` become paragraph breaks
/// - `<br>`, `<div>`, `<li>` and table rows become line breaks
/// - text inside `<blockquote>` is prefixed with `> ` per nesting level
/// - `<img src="cid:…">` becomes a `[cid:…]` placeholder
/// - scripts, styles and the document head are dropped
/// - entities are decoded and runs of whitespace collapse to one space
pub fn html_to_text(html: &str) -> String {
    let mut html = html.to_string();
    for tag in ["script", "style", "head", "title"] {
        html = remove_tag_block(&html, tag);
    }

    let mut out = TextBuilder::default();
    let mut remaining = html.as_str();

    while let Some(lt) = remaining.find('<') {
        out.push_text(&decode_entities(&remaining[..lt]));
        let after = &remaining[lt + 1..];
        let Some(gt) = after.find('>') else {
            out.push_text(&decode_entities(&remaining[lt..]));
            remaining = "";
            break;
        };
        let tag = &after[..gt];
        remaining = &after[gt + 1..];

        if tag.starts_with('!') {
            continue;
        }
        let closing = tag.starts_with('/');
        let name: String = tag
            .trim_start_matches('/')
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();

        match name.as_str() {
            "br" => out.line_break(),
            "p" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "ul" | "ol" | "table" => {
                out.paragraph_break()
            }
            "div" | "tr" => out.line_break(),
            "li" if !closing => {
                out.line_break();
                out.push_text("- ");
            }
            "blockquote" => {
                out.paragraph_break();
                if closing {
                    out.quote_depth = out.quote_depth.saturating_sub(1);
                } else {
                    out.quote_depth += 1;
                }
            }
            "img" if !closing => {
                if let Some(cid) = attribute(tag, "src").and_then(|s| {
                    s.strip_prefix("cid:")
                        .or_else(|| s.strip_prefix("CID:"))
                        .map(str::to_string)
                }) {
                    out.push_text(&format!("[cid:{cid}]"));
                }
            }
            _ => {}
        }
    }
    out.push_text(&decode_entities(remaining));

    out.finish()
}

/// Accumulates converted lines, tracking blockquote depth per line.
#[derive(Default)]
struct TextBuilder {
    lines: Vec<String>,
    current: String,
    current_depth: usize,
    quote_depth: usize,
}

impl TextBuilder {
    fn push_text(&mut self, text: &str) {
        for ch in text.chars() {
            if ch.is_whitespace() {
                if !self.current.is_empty() && !self.current.ends_with(' ') {
                    self.current.push(' ');
                }
            } else {
                if self.current.is_empty() {
                    self.current_depth = self.quote_depth;
                }
                self.current.push(ch);
            }
        }
    }

    fn line_break(&mut self) {
        if !self.current.trim().is_empty() {
            let line = format!("{}{}", "> ".repeat(self.current_depth), self.current.trim_end());
            self.lines.push(line);
        }
        self.current.clear();
    }

    fn paragraph_break(&mut self) {
        self.line_break();
        if self.lines.last().is_some_and(|l| !l.is_empty()) {
            self.lines.push(String::new());
        }
    }

    fn finish(mut self) -> String {
        self.line_break();
        while self.lines.last().is_some_and(|l| l.is_empty()) {
            self.lines.pop();
        }
        self.lines.join("\n")
    }
}

/// Read one attribute value out of a raw tag body.
fn attribute(tag: &str, name: &str) -> Option<String> {
    let lower = tag.to_ascii_lowercase();
    let pos = lower.find(&format!("{name}="))?;
    let value = &tag[pos + name.len() + 1..];
    let value = match value.chars().next()? {
        quote @ ('"' | '\'') => value[1..].split(quote).next()?,
        _ => value
            .split(|c: char| c.is_whitespace() || c == '>' || c == '/')
            .next()?,
    };
    Some(value.to_string())
}

/// Decode the HTML entities mail clients actually emit.
fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let mut result = String::with_capacity(text.len());
    let mut remaining = text;
    while let Some(amp) = remaining.find('&') {
        result.push_str(&remaining[..amp]);
        let after = &remaining[amp + 1..];
        let decoded = after.find(';').filter(|&semi| semi <= 8).and_then(|semi| {
            let entity = &after[..semi];
            let ch = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some(' '),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|d| d.parse().ok()))
                    .and_then(char::from_u32)
                    .map(|c| if c == '\u{a0}' { ' ' } else { c }),
            }?;
            Some((ch, semi))
        });
        match decoded {
            Some((ch, semi)) => {
                result.push(ch);
                remaining = &after[semi + 1..];
            }
            None => {
                result.push('&');
                remaining = after;
            }
        }
    }
    result.push_str(remaining);
    result
}

/// Remove an entire tag block (e.g. `<script>…</script>`).
fn remove_tag_block(html: &str, tag: &str) -> String {
    let lower = html.to_ascii_lowercase();
    let open = format!("<{tag}");
    let close = format!("</{tag}>");

    let mut result = String::with_capacity(html.len());
    let mut pos = 0;
    while let Some(start) = lower[pos..].find(&open).map(|s| s + pos) {
        // "<p" must not match "<pre"
        let next = lower[start + open.len()..].chars().next();
        if next.is_some_and(|c| c.is_ascii_alphanumeric()) {
            result.push_str(&html[pos..start + open.len()]);
            pos = start + open.len();
            continue;
        }
        result.push_str(&html[pos..start]);
        match lower[start..].find(&close) {
            Some(end) => pos = start + end + close.len(),
            None => return result,
        }
    }
    result.push_str(&html[pos..]);
    result
}
