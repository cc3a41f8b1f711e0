//! Per-message records flowing from the loader to the grouper.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use super::address::EmailAddress;
use crate::error::MessageIssue;

/// One archive entry as cut out of the mbox by the loader.
///
/// Nothing is decoded yet: `bytes` holds the RFC 5322 message with the
/// `From ` separator line removed.
#[derive(Debug, Clone)]
pub struct RawMessage {
    /// Position of the entry in the archive (0, 1, 2, …), skipped entries included.
    pub sequence: u64,

    /// Byte offset of the `From ` separator line.
    pub offset: u64,

    /// Date from the `From ` separator line, if it could be parsed.
    pub envelope_date: Option<DateTime<FixedOffset>>,

    /// Headers and body.
    pub bytes: Vec<u8>,
}

/// An image embedded in a message and referenced from its body by Content-ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InlineImage {
    /// Content-ID without angle brackets.
    pub content_id: String,

    /// MIME type, e.g. `image/png`.
    pub content_type: String,

    /// Stable file name derived from the image contents (`<sha256 prefix>.<ext>`).
    pub file_name: String,

    /// Decoded image bytes. Written next to the document, never serialized.
    #[serde(skip)]
    pub data: Vec<u8>,
}

/// A decoded, normalized email.
///
/// Built by the normalizer, then finished by the quote stripper, which fills
/// `body` and `has_reply_markers`. Read-only afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    /// `Message-ID` without brackets, or a synthetic `entry-<sequence>` id.
    pub id: String,

    /// Archive order, used as the tie-break when dates are equal.
    pub sequence: u64,

    pub from: EmailAddress,
    pub to: Vec<EmailAddress>,

    /// Parsed `Date:` header in the sender's offset, or the envelope date
    /// when that failed. Ordering compares the instant.
    pub date: DateTime<FixedOffset>,

    /// Decoded subject (encoded-words resolved).
    pub subject: String,

    /// Body text after decoding, HTML conversion and glyph/image marker substitution.
    pub raw_body: String,

    /// `raw_body` with quoted ancestor content removed.
    pub body: String,

    /// Images resolved from `[[image:…]]` markers in the body.
    pub images: Vec<InlineImage>,

    /// Whether the quote stripper found and removed quoted content.
    pub has_reply_markers: bool,

    /// Recoverable problems met while decoding this message.
    pub issues: Vec<MessageIssue>,
}

impl MessageRecord {
    /// Whether the date came from the envelope instead of the `Date:` header.
    pub fn date_degraded(&self) -> bool {
        self.issues
            .iter()
            .any(|i| matches!(i, MessageIssue::DateFallback { .. }))
    }

    /// Whether the body could not be decoded cleanly.
    pub fn encoding_failed(&self) -> bool {
        self.issues
            .iter()
            .any(|i| matches!(i, MessageIssue::EncodingFailure { .. }))
    }

    /// Number of inline image references that could not be resolved.
    pub fn unresolved_images(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| matches!(i, MessageIssue::UnresolvedInlineImage { .. }))
            .count()
    }
}
