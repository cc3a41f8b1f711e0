//! Chapter and document types produced by the grouper and the assembler.

use serde::{Deserialize, Serialize};

use super::marker::Inline;
use super::message::{InlineImage, MessageRecord};

/// A contiguous, non-empty run of messages sharing one title.
#[derive(Debug, Clone)]
pub struct ChapterRecord {
    /// 1-based position in the book.
    pub index: usize,
    /// Derived once by the grouper.
    pub title: String,
    pub messages: Vec<MessageRecord>,
}

/// The terminal artifact of the pipeline.
///
/// `toc` has exactly one entry per element of `chapters`, in the same order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookDocument {
    pub front: FrontMatter,
    pub toc: Vec<TocEntry>,
    pub chapters: Vec<ChapterSection>,
    pub back: BackMatter,
    /// Layout style name the stylesheet is chosen by.
    pub layout: String,
    /// Image files referenced by `Inline::Image` runs.
    #[serde(skip)]
    pub images: Vec<InlineImage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontMatter {
    pub title: String,
    pub author: String,
}

/// One table-of-contents line; `anchor` points at a chapter heading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TocEntry {
    pub anchor: String,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterSection {
    pub index: usize,
    /// Unique within the document.
    pub anchor: String,
    /// Also the running-header value for every page of the chapter.
    pub title: String,
    pub messages: Vec<MessageBlock>,
}

/// A message as laid out on the page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageBlock {
    pub id: String,
    pub subject: String,
    /// Date formatted with the configured `date_format`.
    pub date: String,
    pub author: String,
    /// Greeting line, when the body opens with one.
    pub intro: Option<String>,
    pub paragraphs: Vec<Vec<Inline>>,
    /// Sign-off lines, when the body closes with a recognizable signature.
    pub signature: Option<Vec<String>>,
}

/// Fixed colophon closing the book.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackMatter {
    pub copyright: String,
    pub paragraphs: Vec<String>,
}
