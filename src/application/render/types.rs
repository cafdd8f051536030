use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

/// Fixed structural input to the static renderer.
///
/// Built from the editor's loose JSON by [`RenderInput::from_content_model`];
/// the renderer itself never looks at untyped data.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RenderInput {
    /// Section ids in display order.
    pub sections: Vec<String>,
    /// Section id → fields.
    pub content: BTreeMap<String, SectionContent>,
    pub theme: Theme,
    pub flags: ContentFlags,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SectionContent {
    pub layout: Option<String>,
    pub background: Option<String>,
    pub fields: BTreeMap<String, FieldValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    List(Vec<String>),
    Items(Vec<BTreeMap<String, String>>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContentFlags {
    pub has_forms: bool,
    pub analytics_opt_in: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Theme {
    pub heading_font: Option<String>,
    pub body_font: Option<String>,
    pub accent_color: Option<String>,
    /// Keyed by `primary`, `secondary`, `neutral`, `divider`.
    pub section_backgrounds: BTreeMap<String, String>,
    pub gradient: Option<Gradient>,
    /// Keyed by background name.
    pub text_colors: BTreeMap<String, TextColors>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gradient {
    pub from: String,
    pub via: Option<String>,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TextColors {
    pub heading: Option<String>,
    pub body: Option<String>,
    pub muted: Option<String>,
}

/// Page-level metadata written into the document head.
#[derive(Debug, Clone, PartialEq)]
pub struct PageMetadata {
    pub page_id: Uuid,
    pub slug: String,
    pub title: String,
    pub description: Option<String>,
    pub preview_image: Option<String>,
    /// The only time-dependent input; fixed by callers that need reproducible output.
    pub generated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct RenderStats {
    pub size_bytes: usize,
    pub fonts: Vec<String>,
    pub css_variable_count: usize,
    pub section_count: usize,
    pub rewritten_assets: u32,
    pub invalid_assets: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDocument {
    pub html: String,
    pub stats: RenderStats,
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("template rendering failed: {message}")]
    Template { message: String },
    #[error("document processing failed: {message}")]
    Document { message: String },
    #[error("invalid asset base url `{url}`")]
    AssetBase { url: String },
}
