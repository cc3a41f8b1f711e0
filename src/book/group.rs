//! Chronological ordering and chapter partitioning.

use chrono::{DateTime, Datelike, FixedOffset};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{BookError, Result};
use crate::model::book::ChapterRecord;
use crate::model::message::MessageRecord;

/// How messages are partitioned into chapters.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum GroupingStrategy {
    /// One chapter per message, titled by its subject.
    PerMessage,
    /// Contiguous runs of messages between the same two people.
    Correspondent,
    /// Contiguous runs of messages from the same season of the year.
    #[default]
    Season,
}

impl std::fmt::Display for GroupingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::PerMessage => "per-message",
            Self::Correspondent => "correspondent",
            Self::Season => "season",
        };
        f.write_str(name)
    }
}

/// Sort records chronologically and cut them into chapters.
///
/// Order is by date, then by archive sequence, so the result does not depend
/// on the order records arrive in. Fails with [`BookError::EmptyArchive`]
/// when there is nothing to group.
pub fn group(
    mut records: Vec<MessageRecord>,
    strategy: GroupingStrategy,
    archive: &std::path::Path,
) -> Result<Vec<ChapterRecord>> {
    if records.is_empty() {
        return Err(BookError::EmptyArchive(archive.to_path_buf()));
    }

    sort_chronologically(&mut records);

    let mut chapters: Vec<ChapterRecord> = Vec::new();
    let mut current_key: Option<String> = None;

    for record in records {
        let key = chapter_key(&record, strategy);
        match chapters.last_mut() {
            Some(chapter) if current_key.as_deref() == Some(key.as_str()) => {
                chapter.messages.push(record);
            }
            _ => {
                let title = chapter_title(&record, strategy);
                chapters.push(ChapterRecord {
                    index: chapters.len() + 1,
                    title,
                    messages: vec![record],
                });
                current_key = Some(key);
            }
        }
    }

    debug!(
        chapters = chapters.len(),
        strategy = %strategy,
        "Grouped messages into chapters"
    );
    Ok(chapters)
}

/// Ascending by instant, ties kept in archive order.
pub fn sort_chronologically(records: &mut [MessageRecord]) {
    records.sort_by(|a, b| a.date.cmp(&b.date).then(a.sequence.cmp(&b.sequence)));
}

/// Records with equal keys that are adjacent share a chapter.
fn chapter_key(record: &MessageRecord, strategy: GroupingStrategy) -> String {
    match strategy {
        GroupingStrategy::PerMessage => record.sequence.to_string(),
        GroupingStrategy::Correspondent => {
            let mut pair = [
                record.from.key(),
                record.to.first().map(|a| a.key()).unwrap_or_default(),
            ];
            pair.sort();
            pair.join("\n")
        }
        GroupingStrategy::Season => season_label(record.date),
    }
}

fn chapter_title(record: &MessageRecord, strategy: GroupingStrategy) -> String {
    match strategy {
        GroupingStrategy::PerMessage => {
            let subject = record.subject.trim();
            if subject.is_empty() {
                record.date.format("%d %B %Y").to_string()
            } else {
                subject.to_string()
            }
        }
        GroupingStrategy::Correspondent => {
            let when = record.date.format("%B %Y");
            match record.to.first() {
                Some(to) => format!("{} & {}, {when}", record.from.name(), to.name()),
                None => format!("{}, {when}", record.from.name()),
            }
        }
        GroupingStrategy::Season => season_label(record.date),
    }
}

/// Season a date falls in, as `Spring '20` or `Winter '19 - '20`.
///
/// Seasons start on Mar 21, Jun 21, Sep 23 and Dec 21. Winter straddles the
/// new year, so both halves get the same label. The calendar day is the
/// sender's, taken in the offset the date was written with.
pub fn season_label(date: DateTime<FixedOffset>) -> String {
    let year = date.year();
    let yy = |y: i32| format!("{:02}", y.rem_euclid(100));
    let day = (date.month(), date.day());

    if day < (3, 21) {
        format!("Winter '{} - '{}", yy(year - 1), yy(year))
    } else if day < (6, 21) {
        format!("Spring '{}", yy(year))
    } else if day < (9, 23) {
        format!("Summer '{}", yy(year))
    } else if day < (12, 21) {
        format!("Autumn '{}", yy(year))
    } else {
        format!("Winter '{} - '{}", yy(year), yy(year + 1))
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::model::address::EmailAddress;

    fn record(
        sequence: u64,
        date: DateTime<FixedOffset>,
        from: &str,
        to: &str,
    ) -> MessageRecord {
        MessageRecord {
            id: format!("m{sequence}"),
            sequence,
            from: EmailAddress::parse(from),
            to: EmailAddress::parse_list(to),
            date,
            subject: format!("Subject {sequence}"),
            raw_body: String::new(),
            body: String::new(),
            images: Vec::new(),
            has_reply_markers: false,
            issues: Vec::new(),
        }
    }

    fn day(y: i32, m: u32, d: u32) -> DateTime<FixedOffset> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap().fixed_offset()
    }

    #[test]
    fn test_empty_input_is_empty_archive() {
        let err = group(Vec::new(), GroupingStrategy::Season, Path::new("a.mbox")).unwrap_err();
        assert!(matches!(err, BookError::EmptyArchive(_)));
    }

    #[test]
    fn test_identical_dates_keep_archive_order() {
        let when = day(2020, 5, 1);
        let records = vec![
            record(2, when, "a@x", "b@x"),
            record(0, when, "a@x", "b@x"),
            record(1, when, "a@x", "b@x"),
        ];
        let chapters = group(records, GroupingStrategy::PerMessage, Path::new("a")).unwrap();
        let order: Vec<u64> = chapters.iter().map(|c| c.messages[0].sequence).collect();
        assert_eq!(order, vec![0, 1, 2]);
        let indices: Vec<usize> = chapters.iter().map(|c| c.index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
    }

    #[test]
    fn test_per_message_title_falls_back_to_date() {
        let mut rec = record(0, day(2021, 7, 4), "a@x", "b@x");
        rec.subject = "  ".into();
        let chapters = group(vec![rec], GroupingStrategy::PerMessage, Path::new("a")).unwrap();
        assert_eq!(chapters[0].title, "04 July 2021");
    }

    #[test]
    fn test_correspondent_runs_are_contiguous() {
        let records = vec![
            record(0, day(2020, 1, 1), "Jane <jane@x>", "bob@x"),
            record(1, day(2020, 1, 2), "bob@x", "Jane <JANE@x>"),
            record(2, day(2020, 1, 3), "jane@x", "carol@x"),
            record(3, day(2020, 1, 4), "bob@x", "jane@x"),
        ];
        let chapters = group(records, GroupingStrategy::Correspondent, Path::new("a")).unwrap();
        let sizes: Vec<usize> = chapters.iter().map(|c| c.messages.len()).collect();
        assert_eq!(sizes, vec![2, 1, 1]);
        assert_eq!(chapters[0].title, "Jane & bob@x, January 2020");
    }

    #[test]
    fn test_season_grouping() {
        let records = vec![
            record(0, day(2019, 12, 25), "a@x", "b@x"),
            record(1, day(2020, 2, 14), "a@x", "b@x"),
            record(2, day(2020, 4, 1), "a@x", "b@x"),
        ];
        let chapters = group(records, GroupingStrategy::Season, Path::new("a")).unwrap();
        let titles: Vec<&str> = chapters.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["Winter '19 - '20", "Spring '20"]);
        assert_eq!(chapters[0].messages.len(), 2);
    }

    #[test]
    fn test_season_boundaries() {
        assert_eq!(season_label(day(2020, 3, 20)), "Winter '19 - '20");
        assert_eq!(season_label(day(2020, 3, 21)), "Spring '20");
        assert_eq!(season_label(day(2020, 6, 21)), "Summer '20");
        assert_eq!(season_label(day(2020, 9, 22)), "Summer '20");
        assert_eq!(season_label(day(2020, 9, 23)), "Autumn '20");
        assert_eq!(season_label(day(2020, 12, 21)), "Winter '20 - '21");
        assert_eq!(season_label(day(2000, 1, 5)), "Winter '99 - '00");
    }

    #[test]
    fn test_season_uses_sender_offset() {
        let date = DateTime::parse_from_rfc2822("Sat, 21 Mar 2020 00:30:00 +0100").unwrap();
        assert_eq!(season_label(date), "Spring '20");
    }

    #[test]
    fn test_sort_compares_instants_not_local_time() {
        // 00:30 +01:00 on the 21st is 23:30 UTC on the 20th
        let early = DateTime::parse_from_rfc2822("Sat, 21 Mar 2020 00:30:00 +0100").unwrap();
        let late = DateTime::parse_from_rfc2822("Fri, 20 Mar 2020 23:45:00 +0000").unwrap();
        let records = vec![record(0, late, "a@x", "b@x"), record(1, early, "a@x", "b@x")];
        let chapters = group(records, GroupingStrategy::PerMessage, Path::new("a")).unwrap();
        let order: Vec<u64> = chapters.iter().map(|c| c.messages[0].sequence).collect();
        assert_eq!(order, vec![1, 0]);
    }

    #[test]
    fn test_chapter_count_never_exceeds_message_count() {
        for strategy in [
            GroupingStrategy::PerMessage,
            GroupingStrategy::Correspondent,
            GroupingStrategy::Season,
        ] {
            let records: Vec<MessageRecord> = (0..12)
                .map(|i| record(i, day(2020, (i as u32 % 12) + 1, 10), "a@x", "b@x"))
                .collect();
            let chapters = group(records, strategy, Path::new("a")).unwrap();
            assert!(chapters.len() <= 12);
            assert!(chapters.iter().all(|c| !c.messages.is_empty()));
        }
    }

    #[test]
    fn test_strategy_names() {
        assert_eq!(GroupingStrategy::PerMessage.to_string(), "per-message");
        let parsed: GroupingStrategy = serde_json::from_str("\"per-message\"").unwrap();
        assert_eq!(parsed, GroupingStrategy::PerMessage);
    }
}
