//! Data model: raw and normalized messages, inline markers, chapters and the book document.

pub mod address;
pub mod book;
pub mod marker;
pub mod message;
