//! Archive parsing: MBOX streaming loader, header decoding, MIME bodies and emoji markers.

pub mod emoji;
pub mod header;
pub mod mbox;
pub mod mime;
