//! Body markup for content sections.
//!
//! Section components live in the client bundle; this module emits the
//! semantic skeleton they hydrate, plus enough structure to read without it.

use std::collections::{BTreeMap, HashSet};

use ammonia::Builder as AmmoniaBuilder;

use super::types::{FieldValue, SectionContent};

const BACKGROUND_IMAGE_FIELD: &str = "background_image";

pub(crate) struct SectionWriter {
    sanitizer: AmmoniaBuilder<'static>,
}

impl SectionWriter {
    pub(crate) fn new() -> Self {
        Self {
            sanitizer: build_inline_sanitizer(),
        }
    }

    /// Renders one `<section>`. `position` is the zero-based index in display order.
    pub(crate) fn write(&self, id: &str, section: &SectionContent, position: usize) -> String {
        let mut html = String::new();
        html.push_str(&format!(
            "<section id=\"{id}\" class=\"pp-section\" data-section=\"{id}\"",
            id = escape_attribute(id)
        ));
        if let Some(layout) = &section.layout {
            html.push_str(&format!(" data-layout=\"{}\"", escape_attribute(layout)));
        }
        if let Some(background) = &section.background {
            html.push_str(&format!(" data-background=\"{}\"", escape_attribute(background)));
        }
        if let Some(FieldValue::Text(url)) = section.fields.get(BACKGROUND_IMAGE_FIELD)
            && !url.trim().is_empty()
        {
            html.push_str(&format!(
                " style=\"background-image: url({})\"",
                escape_attribute(&css_url(url.trim()))
            ));
        }
        html.push('>');

        let mut fields = section
            .fields
            .iter()
            .filter(|(key, _)| key.as_str() != BACKGROUND_IMAGE_FIELD && !is_link_key(key))
            .collect::<Vec<_>>();
        fields.sort_by_key(|(key, _)| (field_rank(key), key.as_str()));

        for (key, value) in fields {
            match value {
                FieldValue::Text(text) => {
                    self.write_text(&mut html, key, text, &section.fields, position)
                }
                FieldValue::List(items) => self.write_list(&mut html, key, items),
                FieldValue::Items(items) => self.write_items(&mut html, key, items),
            }
        }

        html.push_str("</section>");
        html
    }

    fn write_text(
        &self,
        html: &mut String,
        key: &str,
        text: &str,
        fields: &BTreeMap<String, FieldValue>,
        position: usize,
    ) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        let field = escape_attribute(key);

        if is_image_key(key) {
            html.push_str(&format!(
                "<img data-field=\"{field}\" src=\"{}\" alt=\"\" loading=\"lazy\" decoding=\"async\">",
                escape_attribute(text)
            ));
            return;
        }

        let inner = self.sanitizer.clean(text).to_string();
        if inner.is_empty() {
            return;
        }

        if is_action_key(key) {
            let href = link_for(key, fields).unwrap_or("#");
            html.push_str(&format!(
                "<a class=\"pp-cta\" data-field=\"{field}\" href=\"{}\">{inner}</a>",
                escape_attribute(href)
            ));
            return;
        }

        match key {
            "headline" | "title" => {
                let tag = if position == 0 { "h1" } else { "h2" };
                html.push_str(&format!("<{tag} data-field=\"{field}\">{inner}</{tag}>"));
            }
            _ => html.push_str(&format!("<div data-field=\"{field}\">{inner}</div>")),
        }
    }

    fn write_list(&self, html: &mut String, key: &str, items: &[String]) {
        let rendered = items
            .iter()
            .map(|item| self.sanitizer.clean(item.trim()).to_string())
            .filter(|item| !item.is_empty())
            .collect::<Vec<_>>();
        if rendered.is_empty() {
            return;
        }
        html.push_str(&format!("<ul data-field=\"{}\">", escape_attribute(key)));
        for item in rendered {
            html.push_str(&format!("<li>{item}</li>"));
        }
        html.push_str("</ul>");
    }

    fn write_items(&self, html: &mut String, key: &str, items: &[BTreeMap<String, String>]) {
        if items.is_empty() {
            return;
        }
        html.push_str(&format!("<div data-field=\"{}\">", escape_attribute(key)));
        for item in items {
            html.push_str("<div class=\"pp-item\">");
            for (name, value) in item {
                let name_attr = escape_attribute(name);
                if is_image_key(name) {
                    html.push_str(&format!(
                        "<img data-field=\"{name_attr}\" src=\"{}\" alt=\"\" loading=\"lazy\" decoding=\"async\">",
                        escape_attribute(value.trim())
                    ));
                } else {
                    let inner = self.sanitizer.clean(value.trim()).to_string();
                    html.push_str(&format!("<span data-field=\"{name_attr}\">{inner}</span>"));
                }
            }
            html.push_str("</div>");
        }
        html.push_str("</div>");
    }
}

/// Inline formatting only; anything else is stripped to text.
fn build_inline_sanitizer() -> AmmoniaBuilder<'static> {
    let mut builder = AmmoniaBuilder::empty();
    let tags: HashSet<&'static str> = HashSet::from([
        "b", "br", "div", "em", "h1", "h2", "h3", "h4", "h5", "h6", "i", "p", "span", "strong",
        "u",
    ]);
    builder.tags(tags);
    builder.clean_content_tags(HashSet::from(["script", "style"]));
    builder
}

fn field_rank(key: &str) -> u8 {
    match key {
        "eyebrow" | "badge_text" => 0,
        "headline" | "title" => 1,
        "subheadline" | "subtitle" => 2,
        _ if is_action_key(key) => 5,
        _ if is_image_key(key) => 4,
        _ => 3,
    }
}

fn is_image_key(key: &str) -> bool {
    key == "image"
        || key.ends_with("_image")
        || key.ends_with("_logo")
        || key == "logo"
        || key == "avatar"
        || key.ends_with("_avatar")
}

fn is_action_key(key: &str) -> bool {
    key.starts_with("cta") || key.ends_with("_cta") || key.ends_with("button_text")
}

fn is_link_key(key: &str) -> bool {
    key.ends_with("_url") || key.ends_with("_link") || key.ends_with("_href")
}

fn link_for<'a>(key: &str, fields: &'a BTreeMap<String, FieldValue>) -> Option<&'a str> {
    let stem = key
        .strip_suffix("_text")
        .or_else(|| key.strip_suffix("_label"))
        .unwrap_or(key);
    ["_url", "_link", "_href"].iter().find_map(|suffix| {
        match fields.get(&format!("{stem}{suffix}")) {
            Some(FieldValue::Text(url)) if !url.trim().is_empty() => Some(url.trim()),
            _ => None,
        }
    })
}

fn css_url(url: &str) -> String {
    let mut encoded = String::with_capacity(url.len());
    for ch in url.chars() {
        match ch {
            '\'' => encoded.push_str("%27"),
            '"' => encoded.push_str("%22"),
            '(' => encoded.push_str("%28"),
            ')' => encoded.push_str("%29"),
            ' ' => encoded.push_str("%20"),
            _ => encoded.push(ch),
        }
    }
    encoded
}

pub(crate) fn escape_attribute(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '\n' | '\r' | '\t' => escaped.push(' '),
            _ => escaped.push(ch),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(fields: &[(&str, FieldValue)]) -> SectionContent {
        SectionContent {
            layout: Some("LeftCopyRightImage".to_string()),
            background: Some("primary".to_string()),
            fields: fields
                .iter()
                .map(|(key, value)| (key.to_string(), value.clone()))
                .collect(),
        }
    }

    fn text(value: &str) -> FieldValue {
        FieldValue::Text(value.to_string())
    }

    #[test]
    fn headline_leads_and_cta_trails() {
        let writer = SectionWriter::new();
        let html = writer.write(
            "hero",
            &section(&[
                ("cta_text", text("Start")),
                ("cta_url", text("https://example.com/signup")),
                ("headline", text("Hi")),
                ("subheadline", text("There")),
            ]),
            0,
        );

        let headline = html.find("<h1 data-field=\"headline\">Hi</h1>").unwrap();
        let sub = html.find("There").unwrap();
        let cta = html
            .find("<a class=\"pp-cta\" data-field=\"cta_text\" href=\"https://example.com/signup\">Start</a>")
            .unwrap();
        assert!(headline < sub && sub < cta);
        assert!(html.starts_with("<section id=\"hero\""));
        assert!(html.contains("data-layout=\"LeftCopyRightImage\""));
    }

    #[test]
    fn later_sections_use_h2() {
        let html =
            SectionWriter::new().write("features", &section(&[("headline", text("Why"))]), 2);
        assert!(html.contains("<h2 data-field=\"headline\">Why</h2>"));
    }

    #[test]
    fn script_in_rich_text_is_removed() {
        let html = SectionWriter::new().write(
            "hero",
            &section(&[("body", text("<b>ok</b><script>alert(1)</script>"))]),
            1,
        );
        assert!(html.contains("<b>ok</b>"));
        assert!(!html.contains("<script"));
    }

    #[test]
    fn images_and_background_images_become_src_and_style() {
        let html = SectionWriter::new().write(
            "hero",
            &section(&[
                ("hero_image", text("/img/a.png")),
                ("background_image", text("/bg.jpg")),
            ]),
            0,
        );
        assert!(html.contains("src=\"/img/a.png\""));
        assert!(html.contains("style=\"background-image: url(/bg.jpg)\""));
    }

    #[test]
    fn empty_section_still_renders_container() {
        let html = SectionWriter::new().write("cta", &SectionContent::default(), 3);
        assert_eq!(
            html,
            "<section id=\"cta\" class=\"pp-section\" data-section=\"cta\"></section>"
        );
    }

    #[test]
    fn lists_and_items_render() {
        let item = [("title".to_string(), "Fast".to_string())]
            .into_iter()
            .collect::<BTreeMap<_, _>>();
        let html = SectionWriter::new().write(
            "features",
            &section(&[
                ("bullets", FieldValue::List(vec!["One".into(), " ".into()])),
                ("cards", FieldValue::Items(vec![item])),
            ]),
            1,
        );
        assert!(html.contains("<ul data-field=\"bullets\"><li>One</li></ul>"));
        assert!(
            html.contains("<div class=\"pp-item\"><span data-field=\"title\">Fast</span></div>")
        );
    }
}
