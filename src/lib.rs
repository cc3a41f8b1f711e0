//! `mboxbook`: turn an MBOX archive of correspondence into a print-ready book.
//!
//! The library is a strict forward pipeline: the archive loader streams raw
//! entries, the normalizer and quote stripper turn each into a
//! [`MessageRecord`](model::message::MessageRecord) on worker threads, the
//! grouper orders them into chapters, and the assembler emits a
//! [`BookDocument`](model::book::BookDocument) for an external typesetter.

pub mod book;
pub mod config;
pub mod error;
pub mod model;
pub mod normalize;
pub mod parser;
pub mod pipeline;
pub mod quote;
