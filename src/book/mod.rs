//! Book building: chapter grouping, document assembly and rendering.

pub mod assemble;
pub mod group;
pub mod render;
