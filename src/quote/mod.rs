//! Quote stripping: removes quoted ancestor content appended by replies.
//!
//! [`strip`] is a line-oriented state machine over an extensible
//! [`TriggerSet`]. It is deterministic and idempotent, not exhaustive.

pub mod machine;
pub mod triggers;

pub use machine::{is_quote_line, strip, StripOutcome};
pub use triggers::{Confirmation, Trigger, TriggerSet};

use tracing::debug;

use crate::model::marker::image_marker;
use crate::model::message::MessageRecord;

/// Fill `body` and `has_reply_markers` on a freshly normalized record.
///
/// Images whose markers were inside the stripped quote are dropped too.
pub fn strip_record(record: &mut MessageRecord, triggers: &TriggerSet) {
    let outcome = strip(&record.raw_body, triggers);
    if let Some(trigger) = &outcome.trigger {
        debug!(id = %record.id, trigger = %trigger, "Stripped quoted content");
    }

    record.body = outcome.body;
    record.has_reply_markers = outcome.stripped;
    let body = &record.body;
    record
        .images
        .retain(|image| body.contains(&image_marker(&image.file_name)));
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::model::address::EmailAddress;
    use crate::model::message::InlineImage;

    fn record(raw_body: &str, images: Vec<InlineImage>) -> MessageRecord {
        MessageRecord {
            id: "m1".into(),
            sequence: 0,
            from: EmailAddress::parse("bob@example.com"),
            to: Vec::new(),
            date: Utc.with_ymd_and_hms(2020, 1, 2, 8, 0, 0).unwrap().fixed_offset(),
            subject: "Re: Friday".into(),
            raw_body: raw_body.into(),
            body: raw_body.into(),
            images,
            has_reply_markers: false,
            issues: Vec::new(),
        }
    }

    fn image(file_name: &str) -> InlineImage {
        InlineImage {
            content_id: file_name.into(),
            content_type: "image/png".into(),
            file_name: file_name.into(),
            data: Vec::new(),
        }
    }

    #[test]
    fn test_strip_record_sets_body_and_flag() {
        let mut rec = record(
            "See you!\n\nOn Jan 1, 2020, Jane wrote:\n> Friday?\n> Or Saturday?\n> Let me know",
            Vec::new(),
        );
        strip_record(&mut rec, &TriggerSet::builtin(2));
        assert_eq!(rec.body, "See you!");
        assert!(rec.has_reply_markers);
        assert!(rec.raw_body.contains("Jane wrote:"));
    }

    #[test]
    fn test_strip_record_drops_images_in_quote() {
        let body = format!(
            "Look: {}\n-----Original Message-----\n{}",
            image_marker("aa.png"),
            image_marker("bb.png")
        );
        let mut rec = record(&body, vec![image("aa.png"), image("bb.png")]);
        strip_record(&mut rec, &TriggerSet::builtin(2));
        let names: Vec<&str> = rec.images.iter().map(|i| i.file_name.as_str()).collect();
        assert_eq!(names, vec!["aa.png"]);
    }

    #[test]
    fn test_strip_record_without_quote_keeps_body() {
        let mut rec = record("Just a note.", Vec::new());
        strip_record(&mut rec, &TriggerSet::builtin(2));
        assert_eq!(rec.body, rec.raw_body);
        assert!(!rec.has_reply_markers);
    }
}
