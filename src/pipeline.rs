//! End-to-end run: archive in, book document out.
//!
//! Loader → (normalizer + quote stripper on worker threads) → grouper →
//! assembler → renderer. The grouper's sort is the only synchronization
//! point, so worker completion order never shows in the output.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::book::assemble::{assemble, AssemblyOptions};
use crate::book::group::group;
use crate::book::render::{write_document, OutputFormat, RenderOptions};
use crate::config::Config;
use crate::error::Result;
use crate::model::message::MessageRecord;
use crate::normalize::normalize;
use crate::parser::mbox::ArchiveReader;
use crate::quote::{strip_record, TriggerSet};

/// What to build.
#[derive(Debug, Clone)]
pub struct BookRequest {
    pub title: String,
    pub author: String,
    pub mbox: PathBuf,
    /// Defaults to `<title>.<format extension>` in the working directory.
    pub output: Option<PathBuf>,
    pub format: OutputFormat,
}

impl BookRequest {
    pub fn output_path(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| default_output_path(&self.title, self.format))
    }
}

/// Counts reported after a successful run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub archive: PathBuf,
    /// Entries found between `From ` separators, malformed ones included.
    pub entries_seen: u64,
    pub skipped_malformed: u64,
    /// Always `entries_seen - skipped_malformed`.
    pub messages_assembled: u64,
    pub chapters: usize,
    pub date_fallbacks: u64,
    pub encoding_failures: u64,
    pub unresolved_images: u64,
    pub stripped_quotes: u64,
    pub output: PathBuf,
    pub output_bytes: u64,
}

/// Run the whole pipeline and write the document.
///
/// `progress` is called from worker threads with the number of messages
/// normalized so far. Nothing is written when an error is returned before
/// the render step.
pub fn build_book(
    request: &BookRequest,
    config: &Config,
    progress: Option<&(dyn Fn(u64) + Sync)>,
) -> Result<RunReport> {
    info!(path = %request.mbox.display(), "Building book");

    let triggers = TriggerSet::from_config(&config.quotes)?;
    let mut reader = ArchiveReader::open(&request.mbox)?
        .with_max_message_size(config.performance.max_message_size);

    let records = normalize_archive(&mut reader, &triggers, config.performance.threads, progress)?;

    let mut report = RunReport {
        archive: request.mbox.clone(),
        entries_seen: reader.entries_seen(),
        skipped_malformed: reader.skipped(),
        messages_assembled: records.len() as u64,
        ..RunReport::default()
    };
    for record in &records {
        report.date_fallbacks += u64::from(record.date_degraded());
        report.encoding_failures += u64::from(record.encoding_failed());
        report.unresolved_images += record.unresolved_images() as u64;
        report.stripped_quotes += u64::from(record.has_reply_markers);
    }

    let chapters = group(records, config.book.grouping, &request.mbox)?;
    report.chapters = chapters.len();

    let document = assemble(
        chapters,
        &AssemblyOptions {
            title: request.title.clone(),
            author: request.author.clone(),
            layout: config.book.layout.clone(),
            date_format: config.book.date_format.clone(),
            colophon: config.book.colophon.clone(),
        },
    );

    let output = request.output_path();
    report.output_bytes = write_document(
        &document,
        request.format,
        &output,
        &RenderOptions {
            stylesheet_dir: config.book.stylesheet_dir.clone(),
            images_dir: config.assets.images_dir.clone(),
            emoji_dir: config.assets.emoji_dir.clone(),
        },
    )?;
    report.output = output;

    info!(
        messages = report.messages_assembled,
        chapters = report.chapters,
        skipped = report.skipped_malformed,
        "Book complete"
    );
    Ok(report)
}

/// Normalize and strip every entry on a pool of `threads` workers (0 = one per core).
///
/// Records come back in completion order; callers sort them.
pub fn normalize_archive<R>(
    reader: &mut ArchiveReader<R>,
    triggers: &TriggerSet,
    threads: usize,
    progress: Option<&(dyn Fn(u64) + Sync)>,
) -> Result<Vec<MessageRecord>>
where
    R: std::io::BufRead + Send,
{
    let done = AtomicU64::new(0);
    let mut work = || {
        reader
            .par_bridge()
            .map(|entry| -> Result<MessageRecord> {
                let mut record = normalize(entry?);
                strip_record(&mut record, triggers);
                let n = done.fetch_add(1, Ordering::Relaxed) + 1;
                if let Some(cb) = progress {
                    cb(n);
                }
                Ok(record)
            })
            .collect::<Result<Vec<_>>>()
    };

    match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
        Ok(pool) => pool.install(work),
        Err(e) => {
            warn!(error = %e, "Could not build worker pool, using the global one");
            work()
        }
    }
}

/// `<title>.<ext>`, with anything unsafe in a file name replaced by `_`.
pub fn default_output_path(title: &str, format: OutputFormat) -> PathBuf {
    let stem: String = title
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '.' || c == '_' || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .take(100)
        .collect();
    let stem = stem.trim_matches(['.', ' ']);
    let stem = if stem.is_empty() { "book" } else { stem };
    PathBuf::from(format!("{stem}.{}", format.extension()))
}
