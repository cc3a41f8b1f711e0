//! Serialize a [`BookDocument`] to HTML or JSON and write it out.
//!
//! The HTML follows the structural contract the external stylesheet layer
//! relies on: `div.facsimile` front matter, `nav#toc` links to chapter
//! anchors, one `section.chapter` per chapter carrying the running-header
//! title, `div.email` blocks with separate title/intro/message/signature
//! regions, and a closing `div.colophon`.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{BookError, Result};
use crate::model::book::{BookDocument, ChapterSection, MessageBlock};
use crate::model::marker::Inline;

/// Output document format.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Single HTML5 file for the typesetter.
    #[default]
    Html,
    /// The document model as pretty-printed JSON.
    Json,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Json => "json",
        }
    }
}

/// Paths the HTML refers to, relative to the output document.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub stylesheet_dir: String,
    pub images_dir: String,
    pub emoji_dir: String,
}

/// Render, then write the document and its inline images.
///
/// Images go to `<output dir>/<images_dir>/` first; the document is written
/// last. Returns the size of the document in bytes.
pub fn write_document(
    doc: &BookDocument,
    format: OutputFormat,
    output: &Path,
    options: &RenderOptions,
) -> Result<u64> {
    let content = match format {
        OutputFormat::Html => render_html(doc, options),
        OutputFormat::Json => render_json(doc).map_err(|e| {
            BookError::output(output, std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?,
    };

    let out_dir = output.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(out_dir).map_err(|e| BookError::output(out_dir, e))?;

    if !doc.images.is_empty() {
        let images_dir = out_dir.join(&options.images_dir);
        std::fs::create_dir_all(&images_dir).map_err(|e| BookError::output(&images_dir, e))?;
        for image in &doc.images {
            let path = images_dir.join(&image.file_name);
            std::fs::write(&path, &image.data).map_err(|e| BookError::output(&path, e))?;
        }
        debug!(count = doc.images.len(), dir = %images_dir.display(), "Wrote inline images");
    }

    std::fs::write(output, &content).map_err(|e| BookError::output(output, e))?;
    info!(path = %output.display(), bytes = content.len(), "Wrote book document");
    Ok(content.len() as u64)
}

/// The document model as pretty JSON.
pub fn render_json(doc: &BookDocument) -> serde_json::Result<String> {
    serde_json::to_string_pretty(doc)
}

/// The document as a single HTML5 file.
pub fn render_html(doc: &BookDocument, options: &RenderOptions) -> String {
    let mut html = String::new();
    let title = escape_html(&doc.front.title);
    let layout = escape_html(&doc.layout);

    html.push_str("<!DOCTYPE html>\n<html>\n<head>\n");
    html.push_str("<meta charset=\"UTF-8\">\n");
    html.push_str(&format!("<title>{title}</title>\n"));
    html.push_str(&format!(
        "<link rel=\"stylesheet\" href=\"{}\">\n",
        escape_html(&asset_path(&options.stylesheet_dir, &format!("{}.css", doc.layout)))
    ));
    html.push_str("</head>\n");
    html.push_str(&format!("<body class=\"layout-{layout}\">\n"));

    // Front matter
    html.push_str("<div class=\"facsimile\">\n");
    html.push_str(&format!("  <h1 class=\"book-title\">{title}</h1>\n"));
    html.push_str(&format!(
        "  <h3 class=\"book-author\">{}</h3>\n",
        escape_html(&doc.front.author)
    ));
    html.push_str("</div>\n");

    // Table of contents
    html.push_str("<nav id=\"toc\">\n");
    for entry in &doc.toc {
        html.push_str(&format!(
            "  <a class=\"toc-entry\" href=\"#{}\"><span>{}</span></a>\n",
            escape_html(&entry.anchor),
            escape_html(&entry.title)
        ));
    }
    html.push_str("</nav>\n");

    for chapter in &doc.chapters {
        render_chapter(&mut html, chapter, options);
    }

    // Back matter
    html.push_str("<div class=\"colophon\">\n");
    html.push_str(&format!(
        "  <p id=\"copyright\">{}</p>\n",
        escape_html(&doc.back.copyright)
    ));
    for paragraph in &doc.back.paragraphs {
        html.push_str(&format!("  <p>{}</p>\n", escape_html(paragraph)));
    }
    html.push_str("</div>\n");

    html.push_str("</body>\n</html>\n");
    html
}

fn render_chapter(html: &mut String, chapter: &ChapterSection, options: &RenderOptions) {
    let title = escape_html(&chapter.title);
    html.push_str(&format!(
        "<section class=\"chapter\" data-chapter-title=\"{title}\">\n"
    ));
    html.push_str(&format!(
        "  <h1 class=\"chapter-title\" id=\"{}\">{title}</h1>\n",
        escape_html(&chapter.anchor)
    ));
    for message in &chapter.messages {
        render_message(html, message, options);
    }
    html.push_str("</section>\n");
}

fn render_message(html: &mut String, message: &MessageBlock, options: &RenderOptions) {
    html.push_str("  <div class=\"email\">\n");
    html.push_str("    <div class=\"titles\">\n");
    html.push_str(&format!(
        "      <h2 class=\"title\">{}</h2>\n",
        escape_html(&message.subject)
    ));
    html.push_str(&format!(
        "      <h3 class=\"date\">{}</h3>\n",
        escape_html(&message.date)
    ));
    html.push_str(&format!(
        "      <h4 class=\"author\">{}</h4>\n",
        escape_html(&message.author)
    ));
    html.push_str("    </div>\n");

    if let Some(intro) = &message.intro {
        html.push_str(&format!("    <p class=\"intro\">{}</p>\n", escape_html(intro)));
    }

    html.push_str("    <div class=\"message\">\n");
    for paragraph in &message.paragraphs {
        render_paragraph(html, paragraph, options);
    }
    html.push_str("    </div>\n");

    if let Some(signature) = &message.signature {
        let lines: Vec<String> = signature.iter().map(|l| escape_html(l)).collect();
        html.push_str(&format!(
            "    <div class=\"signature\"><p>{}</p></div>\n",
            lines.join("<br>\n")
        ));
    }
    html.push_str("  </div>\n");
}

/// Text and emoji runs share a `<p>`; an image closes it and stands alone
/// in a `<figure>`.
fn render_paragraph(html: &mut String, runs: &[Inline], options: &RenderOptions) {
    let mut open = false;
    for run in runs {
        match run {
            Inline::Image { file_name } => {
                if open {
                    html.push_str("</p>\n");
                    open = false;
                }
                html.push_str(&format!(
                    "      <figure class=\"inline-image\"><img src=\"{}\" alt=\"\"></figure>\n",
                    escape_html(&asset_path(&options.images_dir, file_name))
                ));
            }
            Inline::Text { text } => {
                if !open {
                    html.push_str("      <p>");
                    open = true;
                }
                html.push_str(&escape_html(text).replace('\n', "<br>\n"));
            }
            Inline::Emoji { codepoints } => {
                if !open {
                    html.push_str("      <p>");
                    open = true;
                }
                html.push_str(&format!(
                    "<img class=\"emoji\" src=\"{}\" alt=\"{}\">",
                    escape_html(&asset_path(&options.emoji_dir, &format!("{codepoints}.png"))),
                    escape_html(&glyph_text(codepoints))
                ));
            }
        }
    }
    if open {
        html.push_str("</p>\n");
    }
}

fn asset_path(dir: &str, file: &str) -> String {
    let dir = dir.trim_end_matches('/');
    if dir.is_empty() {
        file.to_string()
    } else {
        format!("{dir}/{file}")
    }
}

/// `1f44d-1f3fd` → the characters themselves, for alt text.
fn glyph_text(codepoints: &str) -> String {
    codepoints
        .split('-')
        .filter_map(|hex| u32::from_str_radix(hex, 16).ok())
        .filter_map(char::from_u32)
        .collect()
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}
