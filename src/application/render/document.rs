use askama::Template;
use time::format_description::well_known::Rfc3339;
use url::Url;

use crate::domain::slug::public_url_for;

use super::{
    assets,
    sections::SectionWriter,
    theme,
    types::{PageMetadata, RenderError, RenderInput, RenderStats, RenderedDocument},
};

pub const DESCRIPTION_LIMIT: usize = 160;

/// Site-wide values that are not part of a page's content.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub published_domain: String,
    /// Base for root-relative asset references and the default social image.
    pub asset_base_url: Url,
    pub stylesheet_href: String,
    pub form_script_src: String,
    pub analytics_script_src: String,
}

#[derive(Template)]
#[template(path = "published/document.html")]
struct DocumentTemplate<'a> {
    title: &'a str,
    description: &'a str,
    canonical_url: &'a str,
    og_image: &'a str,
    generated_at: &'a str,
    page_id: String,
    slug: &'a str,
    fonts_href: Option<String>,
    stylesheet_href: &'a str,
    style_block: Option<String>,
    body: &'a str,
    form_script_src: Option<&'a str>,
    analytics_script_src: Option<&'a str>,
}

/// Turns a [`RenderInput`] into a self-contained HTML document.
///
/// Output depends only on the input, the metadata and the options; the single
/// time-dependent value is `metadata.generated_at`.
pub struct StaticRenderer {
    options: RenderOptions,
    sections: SectionWriter,
}

impl StaticRenderer {
    pub fn new(options: RenderOptions) -> Self {
        Self {
            options,
            sections: SectionWriter::new(),
        }
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    pub fn render(
        &self,
        input: &RenderInput,
        metadata: &PageMetadata,
    ) -> Result<RenderedDocument, RenderError> {
        let fonts = theme::extract_fonts(&input.theme);
        let variables = theme::css_variables(&input.theme);

        let mut body = String::new();
        for (position, id) in input.sections.iter().enumerate() {
            let section = input.content.get(id).cloned().unwrap_or_default();
            if position > 0 {
                body.push('\n');
            }
            body.push_str(&self.sections.write(id, &section, position));
        }

        let canonical_url = public_url_for(&metadata.slug, &self.options.published_domain);
        let description = truncate_description(metadata.description.as_deref().unwrap_or(""));
        let og_image = self.og_image(metadata);
        let generated_at = metadata
            .generated_at
            .format(&Rfc3339)
            .map_err(|err| RenderError::Document {
                message: err.to_string(),
            })?;

        let template = DocumentTemplate {
            title: metadata.title.trim(),
            description,
            canonical_url: &canonical_url,
            og_image: &og_image,
            generated_at: &generated_at,
            page_id: metadata.page_id.to_string(),
            slug: &metadata.slug,
            fonts_href: theme::google_fonts_url(&fonts),
            stylesheet_href: &self.options.stylesheet_href,
            style_block: theme::style_block(&variables),
            body: &body,
            form_script_src: input
                .flags
                .has_forms
                .then_some(self.options.form_script_src.as_str()),
            analytics_script_src: input
                .flags
                .analytics_opt_in
                .then_some(self.options.analytics_script_src.as_str()),
        };

        let html = template.render().map_err(|err| RenderError::Template {
            message: err.to_string(),
        })?;
        let rewritten = assets::rewrite(&html, &self.options.asset_base_url)?;

        let stats = RenderStats {
            size_bytes: rewritten.html.len(),
            fonts,
            css_variable_count: variables.len(),
            section_count: input.sections.len(),
            rewritten_assets: rewritten.rewritten,
            invalid_assets: rewritten.invalid,
        };

        tracing::debug!(
            target = "application::render",
            slug = %metadata.slug,
            size_bytes = stats.size_bytes,
            sections = stats.section_count,
            invalid_assets = stats.invalid_assets,
            "rendered document"
        );

        Ok(RenderedDocument {
            html: rewritten.html,
            stats,
        })
    }

    fn og_image(&self, metadata: &PageMetadata) -> String {
        if let Some(preview) = metadata.preview_image.as_deref()
            && let Ok(Some(resolved)) = assets::resolve(preview, &self.options.asset_base_url)
        {
            return resolved.to_string();
        }
        let base = self.options.asset_base_url.as_str().trim_end_matches('/');
        format!("{base}/api/og/{}", metadata.slug)
    }
}

/// Cuts at a character boundary; no ellipsis is appended.
fn truncate_description(description: &str) -> &str {
    let description = description.trim();
    match description.char_indices().nth(DESCRIPTION_LIMIT) {
        Some((index, _)) => description[..index].trim_end(),
        None => description,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;
    use time::macros::datetime;
    use uuid::Uuid;

    use super::*;
    use crate::application::render::types::{ContentFlags, FieldValue, SectionContent};

    fn renderer() -> StaticRenderer {
        StaticRenderer::new(RenderOptions {
            published_domain: "pagepress.site".to_string(),
            asset_base_url: Url::parse("https://assets.pagepress.site").unwrap(),
            stylesheet_href: "https://assets.pagepress.site/published.v1.css".to_string(),
            form_script_src: "https://assets.pagepress.site/form.v1.js".to_string(),
            analytics_script_src: "https://assets.pagepress.site/a.v1.js".to_string(),
        })
    }

    fn metadata() -> PageMetadata {
        PageMetadata {
            page_id: Uuid::nil(),
            slug: "demo".to_string(),
            title: "Demo <Page>".to_string(),
            description: Some("A demo page".to_string()),
            preview_image: None,
            generated_at: datetime!(2026-01-02 03:04:05 UTC),
        }
    }

    fn hero_input() -> RenderInput {
        RenderInput::from_content_model(
            &["hero".to_string()],
            &json!({ "hero": { "headline": "Hi", "image": "/img/a.png" } }),
            &json!({ "colors": { "accentColor": "#3366ff" } }),
            false,
        )
    }

    #[test]
    fn renders_head_and_body() {
        let document = renderer().render(&hero_input(), &metadata()).unwrap();
        let html = &document.html;

        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<title>Demo &#60;Page&#62;</title>"));
        assert!(html.contains(r#"<link rel="canonical" href="https://demo.pagepress.site">"#));
        assert!(html.contains("https://assets.pagepress.site/api/og/demo"));
        assert!(html.contains(r#"<meta name="twitter:card" content="summary_large_image">"#));
        assert!(html.contains("--accent-primary: #3366ff;"));
        assert!(html.contains("<h1 data-field=\"headline\">Hi</h1>"));
        assert!(html.contains(r#"src="https://assets.pagepress.site/img/a.png""#));
        assert!(!html.contains("fonts.googleapis.com"));
        assert!(!html.contains("form.v1.js"));
        assert!(!html.contains("a.v1.js"));

        assert_eq!(document.stats.size_bytes, html.len());
        assert_eq!(document.stats.fonts, vec!["Inter".to_string()]);
        assert_eq!(document.stats.css_variable_count, 3);
        assert_eq!(document.stats.rewritten_assets, 1);
    }

    #[test]
    fn identical_input_renders_identically() {
        let renderer = renderer();
        let first = renderer.render(&hero_input(), &metadata()).unwrap();
        let second = renderer.render(&hero_input(), &metadata()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn trailer_scripts_follow_flags() {
        let mut input = hero_input();
        input.flags = ContentFlags {
            has_forms: true,
            analytics_opt_in: true,
        };
        let html = renderer().render(&input, &metadata()).unwrap().html;

        assert!(html.contains(
            r#"<script src="https://assets.pagepress.site/form.v1.js" defer></script>"#
        ));
        assert!(html.contains(&format!(
            r#"data-page-id="{}" data-slug="demo" defer"#,
            Uuid::nil()
        )));
    }

    #[test]
    fn missing_content_is_defaulted() {
        let input = RenderInput {
            sections: vec!["hero".to_string(), "faq".to_string()],
            content: BTreeMap::from([(
                "hero".to_string(),
                SectionContent {
                    fields: BTreeMap::from([(
                        "headline".to_string(),
                        FieldValue::Text(String::new()),
                    )]),
                    ..SectionContent::default()
                },
            )]),
            ..RenderInput::default()
        };
        let document = renderer().render(&input, &metadata()).unwrap();

        assert!(document.html.contains("data-section=\"faq\""));
        assert!(!document.html.contains("<style>"));
        assert_eq!(document.stats.section_count, 2);
    }

    #[test]
    fn description_is_truncated_to_limit() {
        let long = "é".repeat(200);
        let mut meta = metadata();
        meta.description = Some(long);
        let html = renderer().render(&hero_input(), &meta).unwrap().html;

        let expected = "é".repeat(DESCRIPTION_LIMIT);
        assert!(html.contains(&format!(r#"<meta name="description" content="{expected}">"#)));
    }

    #[test]
    fn preview_image_overrides_default_social_image() {
        let mut meta = metadata();
        meta.preview_image = Some("http://cdn.example.com/og.png".to_string());
        let html = renderer().render(&hero_input(), &meta).unwrap().html;
        assert!(html.contains(
            r#"<meta property="og:image" content="https://cdn.example.com/og.png">"#
        ));
    }

    #[test]
    fn invalid_assets_are_counted_not_fatal() {
        let input = RenderInput::from_content_model(
            &["hero".to_string()],
            &json!({ "hero": { "image": "not a url" } }),
            &json!({}),
            false,
        );
        let document = renderer().render(&input, &metadata()).unwrap();
        assert_eq!(document.stats.invalid_assets, 1);
        assert!(!document.html.contains("not a url"));
    }
}
