//! Message normalizer: one [`RawMessage`] in, one [`MessageRecord`] out.
//!
//! Pure function of its input, so the pipeline runs it on worker threads.
//! Every problem met here is recorded on the record as a [`MessageIssue`]
//! and logged; nothing is returned as an error.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::MessageIssue;
use crate::model::marker::{self, image_marker};
use crate::model::message::{InlineImage, MessageRecord, RawMessage};
use crate::parser::mime::ImagePart;
use crate::parser::{emoji, header, mime};

/// Decode one archive entry into a message record.
///
/// The returned record has `body == raw_body`; the quote stripper runs next.
pub fn normalize(raw: RawMessage) -> MessageRecord {
    let fields = header::parse_headers(&raw.bytes);
    let mut issues = Vec::new();

    let date = match header::parse_date(&fields.date) {
        Some(date) => date,
        None => {
            let issue = MessageIssue::DateFallback {
                header: fields.date.clone(),
            };
            warn!(sequence = raw.sequence, "{issue}");
            issues.push(issue);
            raw.envelope_date
                .unwrap_or_else(|| DateTime::<Utc>::UNIX_EPOCH.fixed_offset())
        }
    };

    let extracted = mime::extract_body(&raw.bytes, fields.charset.as_deref());
    if let Some(issue) = extracted.issue {
        warn!(sequence = raw.sequence, "{issue}");
        issues.push(issue);
    }

    let text = marker::escape_literal(&extracted.text);
    let (text, images) = resolve_inline_images(&text, extracted.images, &mut issues);
    let body = tidy_body(&emoji::substitute_emoji(&text));

    let id = if fields.message_id.is_empty() {
        format!("entry-{}", raw.sequence)
    } else {
        fields.message_id
    };
    debug!(id = %id, sequence = raw.sequence, "Normalized message");

    MessageRecord {
        id,
        sequence: raw.sequence,
        from: fields.from,
        to: fields.to,
        date,
        subject: fields.subject,
        raw_body: body.clone(),
        body,
        images,
        has_reply_markers: false,
        issues,
    }
}

fn cid_placeholder_regex() -> &'static Regex {
    static CID_RE: OnceLock<Regex> = OnceLock::new();
    CID_RE.get_or_init(|| {
        Regex::new(r"\[cid:([^\]\s]+)\]").expect("cid placeholder regex must compile")
    })
}

/// Swap `[cid:…]` placeholders for image markers.
///
/// Placeholders with no matching image part are left as they are and
/// reported as [`MessageIssue::UnresolvedInlineImage`].
fn resolve_inline_images(
    text: &str,
    parts: Vec<ImagePart>,
    issues: &mut Vec<MessageIssue>,
) -> (String, Vec<InlineImage>) {
    let mut resolved: Vec<InlineImage> = Vec::new();

    let replaced = cid_placeholder_regex().replace_all(text, |caps: &regex::Captures<'_>| {
        let cid = &caps[1];
        match parts.iter().find(|p| p.content_id.eq_ignore_ascii_case(cid)) {
            Some(part) => {
                let image = inline_image(part);
                let marker = image_marker(&image.file_name);
                if !resolved.iter().any(|r| r.file_name == image.file_name) {
                    resolved.push(image);
                }
                marker
            }
            None => {
                let issue = MessageIssue::UnresolvedInlineImage {
                    content_id: cid.to_string(),
                };
                warn!("{issue}");
                issues.push(issue);
                caps[0].to_string()
            }
        }
    });

    let unreferenced = parts.len().saturating_sub(resolved.len());
    if unreferenced > 0 {
        debug!(count = unreferenced, "Inline images not referenced from the body");
    }

    (replaced.into_owned(), resolved)
}

/// Name an image after its contents so the same picture always lands on the same path.
fn inline_image(part: &ImagePart) -> InlineImage {
    let digest = Sha256::digest(&part.data);
    let hash: String = digest.iter().take(8).map(|b| format!("{b:02x}")).collect();
    let ext = match part.content_type.to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/svg+xml" => "svg",
        _ => "bin",
    };
    InlineImage {
        content_id: part.content_id.clone(),
        content_type: part.content_type.clone(),
        file_name: format!("{hash}.{ext}"),
        data: part.data.clone(),
    }
}

/// Trim trailing whitespace per line and blank lines at both ends.
fn tidy_body(text: &str) -> String {
    let lines: Vec<&str> = text.lines().map(str::trim_end).collect();
    let start = lines.iter().position(|l| !l.is_empty()).unwrap_or(lines.len());
    let end = lines.iter().rposition(|l| !l.is_empty()).map_or(start, |e| e + 1);
    lines[start..end].join("\n")
}
