//! Static rendering of published pages.
//!
//! The pipeline is pure: a fixed [`RenderInput`] plus [`PageMetadata`] becomes
//! one HTML document whose asset references are absolute https URLs. Editor
//! JSON is flattened by the boundary adapter in `input` before it gets here.

pub mod assets;
mod document;
mod input;
mod sections;
mod theme;
mod types;

pub use assets::{AssetError, RewriteOutcome};
pub use document::{DESCRIPTION_LIMIT, RenderOptions, StaticRenderer};
pub use types::{
    ContentFlags, FieldValue, Gradient, PageMetadata, RenderError, RenderInput, RenderStats,
    RenderedDocument, SectionContent, TextColors, Theme,
};
