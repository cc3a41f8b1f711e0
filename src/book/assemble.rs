//! Document assembly: chapters in, [`BookDocument`] out.
//!
//! Each message body is split into an optional greeting (intro), its
//! paragraphs and an optional sign-off (signature). These become the
//! distinct sub-regions of a message block on the page.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::OnceLock;

use chrono::{DateTime, FixedOffset};
use regex::Regex;
use tracing::debug;

use crate::model::book::{
    BackMatter, BookDocument, ChapterRecord, ChapterSection, FrontMatter, MessageBlock, TocEntry,
};
use crate::model::marker::split_inlines;
use crate::model::message::{InlineImage, MessageRecord};

/// Fallback when the configured date format is not valid `strftime`.
const DEFAULT_DATE_FORMAT: &str = "%d %b %Y";

/// Longest line still taken as a greeting when it merely ends with a comma.
const MAX_INTRO_LEN: usize = 40;

/// Most lines a sign-off block may span.
const MAX_SIGNATURE_LINES: usize = 4;

/// Everything the assembler needs besides the chapters.
#[derive(Debug, Clone)]
pub struct AssemblyOptions {
    pub title: String,
    pub author: String,
    pub layout: String,
    pub date_format: String,
    /// Extra colophon paragraphs.
    pub colophon: Vec<String>,
}

/// Build the final document.
///
/// The table of contents gets exactly one entry per chapter, in chapter
/// order, and every chapter anchor is unique within the document.
pub fn assemble(chapters: Vec<ChapterRecord>, options: &AssemblyOptions) -> BookDocument {
    let mut anchors = AnchorAllocator::default();
    let mut images: Vec<InlineImage> = Vec::new();
    let mut seen_images: HashSet<String> = HashSet::new();
    let mut sections = Vec::with_capacity(chapters.len());

    for chapter in chapters {
        let anchor = anchors.allocate(&chapter.title);
        let mut messages = Vec::with_capacity(chapter.messages.len());
        for record in chapter.messages {
            messages.push(message_block(&record, &options.date_format));
            for image in record.images {
                if seen_images.insert(image.file_name.clone()) {
                    images.push(image);
                }
            }
        }
        sections.push(ChapterSection {
            index: chapter.index,
            anchor,
            title: chapter.title,
            messages,
        });
    }

    let toc = sections
        .iter()
        .map(|s| TocEntry {
            anchor: s.anchor.clone(),
            title: s.title.clone(),
        })
        .collect();

    debug!(
        chapters = sections.len(),
        images = images.len(),
        "Assembled book document"
    );

    BookDocument {
        front: FrontMatter {
            title: options.title.clone(),
            author: options.author.clone(),
        },
        toc,
        chapters: sections,
        back: colophon(options),
        layout: options.layout.clone(),
        images,
    }
}

fn colophon(options: &AssemblyOptions) -> BackMatter {
    let mut paragraphs = vec![
        "The exchanges featured in this book were compiled from an email archive.".to_string(),
    ];
    paragraphs.extend(options.colophon.iter().cloned());
    BackMatter {
        copyright: format!("{} © {}", options.title, options.author),
        paragraphs,
    }
}

/// Lay out one message.
pub fn message_block(record: &MessageRecord, date_format: &str) -> MessageBlock {
    let mut lines = cleaned_lines(&record.body);
    let intro = take_intro(&mut lines);
    let signature = take_signature(&mut lines);

    let paragraphs = lines
        .split(|l| l.trim().is_empty())
        .filter(|p| !p.is_empty())
        .map(|p| split_inlines(&p.join("\n")))
        .collect();

    MessageBlock {
        id: record.id.clone(),
        subject: record.subject.clone(),
        date: display_date(record.date, date_format),
        author: record.from.name().to_string(),
        intro,
        paragraphs,
        signature,
    }
}

/// Format a date in its own offset, falling back to `%d %b %Y` when
/// `format` is invalid.
pub fn display_date(date: DateTime<FixedOffset>, format: &str) -> String {
    let mut out = String::new();
    if write!(out, "{}", date.format(format)).is_ok() {
        return out;
    }
    date.format(DEFAULT_DATE_FORMAT).to_string()
}

/// Body lines with leading/trailing blanks, a trailing `----` rule and a
/// trailing date-only line removed.
fn cleaned_lines(body: &str) -> Vec<&str> {
    let mut lines: Vec<&str> = body.lines().collect();
    trim_blank_edges(&mut lines);

    if lines.last().is_some_and(|l| l.trim_start().starts_with("----")) {
        lines.pop();
        trim_blank_edges(&mut lines);
    }
    if lines.last().is_some_and(|l| is_date_line(l)) {
        lines.pop();
        trim_blank_edges(&mut lines);
    }
    lines
}

fn trim_blank_edges(lines: &mut Vec<&str>) {
    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }
    let leading = lines.iter().take_while(|l| l.trim().is_empty()).count();
    lines.drain(..leading);
}

fn date_line_regex() -> &'static Regex {
    static DATE_RE: OnceLock<Regex> = OnceLock::new();
    DATE_RE.get_or_init(|| {
        let month = r"(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?";
        let pattern = format!(
            r"(?i)^([a-z]+,?\s+)?(\d{{1,2}}\s+{month},?\s+\d{{2,4}}|{month}\s+\d{{1,2}}(st|nd|rd|th)?,?\s+\d{{2,4}}|\d{{4}}-\d{{2}}-\d{{2}}|\d{{1,2}}[/.-]\d{{1,2}}[/.-]\d{{2,4}})(,?\s+(at\s+)?\d{{1,2}}:\d{{2}}(:\d{{2}})?\s*([ap]\.?m\.?)?)?$"
        );
        Regex::new(&pattern).expect("date line regex must compile")
    })
}

/// A line holding nothing but a date, as some clients leave at the bottom.
fn is_date_line(line: &str) -> bool {
    let line = line.trim();
    !line.is_empty()
        && (date_line_regex().is_match(line) || DateTime::parse_from_rfc2822(line).is_ok())
}

fn greeting_regex() -> &'static Regex {
    static GREETING_RE: OnceLock<Regex> = OnceLock::new();
    GREETING_RE.get_or_init(|| {
        Regex::new(
            r"(?i)^(dear|dearest|hi|hello|hey|hiya|greetings|good (morning|afternoon|evening)|my dear|querid[oa]s?|ol[aá]|oi|bonjour|salut|cher|chère|hallo|liebe|lieber|ciao|caro|cara|hola)\b.{0,60}$",
        )
        .expect("greeting regex must compile")
    })
}

/// Pop the first line when it reads like a greeting.
///
/// A body that is nothing but the greeting keeps it as body text.
fn take_intro(lines: &mut Vec<&str>) -> Option<String> {
    let first = lines.first()?.trim();
    if lines.len() < 2 {
        return None;
    }
    let short_with_comma = first.ends_with(',')
        && first.chars().count() <= MAX_INTRO_LEN
        && first.split_whitespace().count() <= 5;
    if !(short_with_comma || greeting_regex().is_match(first)) {
        return None;
    }

    let intro = first.to_string();
    lines.remove(0);
    trim_blank_edges(lines);
    Some(intro)
}

fn valediction_regex() -> &'static Regex {
    static VALEDICTION_RE: OnceLock<Regex> = OnceLock::new();
    VALEDICTION_RE.get_or_init(|| {
        Regex::new(
            r"(?i)^(love|lots of love|all my love|much love|cheers|best|best wishes|all the best|regards|best regards|kind regards|warm regards|warmly|yours|yours truly|sincerely|thanks|thank you|many thanks|xo+|x+|hugs|take care|see you|talk soon|beijos?|beijinhos?|besos?|bisous|bises|abraços?|un abrazo|gr[üu](ß|ss)e|liebe gr[üu](ß|ss)e|saludos|cordialmente|a presto|baci)\b[^.?]{0,30}[,!.]?$",
        )
        .expect("valediction regex must compile")
    })
}

/// Split off the sign-off block.
///
/// Either everything after a `--` delimiter line, or a short run of lines at
/// the end of the last paragraph starting with a valediction ("Love,").
fn take_signature(lines: &mut Vec<&str>) -> Option<Vec<String>> {
    if let Some(delim) = lines.iter().rposition(|l| l.trim_end() == "--") {
        let signature: Vec<String> = lines[delim + 1..]
            .iter()
            .filter(|l| !l.trim().is_empty())
            .map(|l| l.trim().to_string())
            .collect();
        lines.truncate(delim);
        trim_blank_edges(lines);
        return (!signature.is_empty()).then_some(signature);
    }

    let last_para = lines
        .iter()
        .rposition(|l| l.trim().is_empty())
        .map_or(0, |b| b + 1);
    let first_allowed = last_para.max(lines.len().saturating_sub(MAX_SIGNATURE_LINES));
    let start = (first_allowed..lines.len())
        .find(|&i| valediction_regex().is_match(lines[i].trim()))?;
    if start == 0 {
        return None;
    }

    let signature = lines[start..].iter().map(|l| l.trim().to_string()).collect();
    lines.truncate(start);
    trim_blank_edges(lines);
    Some(signature)
}

/// Hands out unique, URL-safe anchors.
#[derive(Debug, Default)]
struct AnchorAllocator {
    used: HashSet<String>,
}

impl AnchorAllocator {
    fn allocate(&mut self, title: &str) -> String {
        let base = format!("chapter-{}", slugify(title));
        let mut anchor = base.clone();
        let mut n = 2;
        while !self.used.insert(anchor.clone()) {
            anchor = format!("{base}-{n}");
            n += 1;
        }
        anchor
    }
}

fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        slug.push('x');
    }
    slug
}
