//! Boundary adapter from the editor's loosely-shaped model to [`RenderInput`].
//!
//! The editor stores a section either as a flat field map (`{"headline": "Hi"}`)
//! or nested under `elements`, and a field either as a scalar or wrapped in
//! `{"content": ...}` / `{"value": ...}`. All of that is flattened here so the
//! renderer works against a fixed schema. Unrecognised shapes are dropped.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use super::types::{
    ContentFlags, FieldValue, Gradient, RenderInput, SectionContent, TextColors, Theme,
};

const FORMS_KEY: &str = "forms";
const ELEMENTS_KEY: &str = "elements";
const LAYOUT_KEY: &str = "layout";
const BACKGROUND_KEYS: &[&str] = &["backgroundType", "background"];
const RESERVED_SECTION_KEYS: &[&str] =
    &["id", "layout", "backgroundType", "background", "elements"];
const BACKGROUND_NAMES: &[&str] = &["primary", "secondary", "neutral", "divider"];

impl RenderInput {
    pub fn from_content_model(
        sections: &[String],
        content: &Value,
        theme: &Value,
        analytics_opt_in: bool,
    ) -> Self {
        let content_map = content.as_object();

        let mut sections_out = Vec::with_capacity(sections.len());
        let mut content_out = BTreeMap::new();
        for id in sections {
            let id = id.trim();
            if id.is_empty() || sections_out.iter().any(|existing| existing == id) {
                continue;
            }
            sections_out.push(id.to_string());
            let section = content_map
                .and_then(|map| map.get(id))
                .and_then(Value::as_object)
                .map(flatten_section)
                .unwrap_or_default();
            content_out.insert(id.to_string(), section);
        }

        let has_forms = content_map
            .and_then(|map| map.get(FORMS_KEY))
            .and_then(Value::as_object)
            .is_some_and(|forms| !forms.is_empty());

        Self {
            sections: sections_out,
            content: content_out,
            theme: Theme::from_value(theme),
            flags: ContentFlags {
                has_forms,
                analytics_opt_in,
            },
        }
    }
}

fn flatten_section(raw: &Map<String, Value>) -> SectionContent {
    let layout = raw.get(LAYOUT_KEY).and_then(scalar_text);
    let background = BACKGROUND_KEYS
        .iter()
        .find_map(|key| raw.get(*key).and_then(scalar_text));

    let mut fields = BTreeMap::new();
    for (key, value) in raw {
        if RESERVED_SECTION_KEYS.contains(&key.as_str()) {
            continue;
        }
        if let Some(field) = field_value(value) {
            fields.insert(key.clone(), field);
        }
    }

    if let Some(elements) = raw.get(ELEMENTS_KEY).and_then(Value::as_object) {
        for (key, value) in elements {
            if let Some(field) = field_value(value) {
                fields.insert(key.clone(), field);
            }
        }
    }

    SectionContent {
        layout,
        background,
        fields,
    }
}

fn field_value(value: &Value) -> Option<FieldValue> {
    match value {
        Value::Array(items) => list_value(items),
        Value::Object(map) => {
            let wrapped = map.get("content").or_else(|| map.get("value"))?;
            match wrapped {
                Value::Array(items) => list_value(items),
                other => scalar_text(other).map(FieldValue::Text),
            }
        }
        other => scalar_text(other).map(FieldValue::Text),
    }
}

fn list_value(items: &[Value]) -> Option<FieldValue> {
    if items.iter().all(Value::is_object) && !items.is_empty() {
        let records = items
            .iter()
            .filter_map(Value::as_object)
            .map(|item| {
                item.iter()
                    .filter_map(|(key, value)| scalar_text(value).map(|text| (key.clone(), text)))
                    .collect::<BTreeMap<_, _>>()
            })
            .filter(|record| !record.is_empty())
            .collect::<Vec<_>>();
        return Some(FieldValue::Items(records));
    }

    let texts = items.iter().filter_map(scalar_text).collect::<Vec<_>>();
    Some(FieldValue::List(texts))
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn string_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    let mut current = value;
    for segment in path {
        current = current.get(*segment)?;
    }
    current
        .as_str()
        .map(str::trim)
        .filter(|text| !text.is_empty())
}

impl Theme {
    pub fn from_value(theme: &Value) -> Self {
        let section_backgrounds = BACKGROUND_NAMES
            .iter()
            .filter_map(|name| {
                string_at(theme, &["colors", "sectionBackgrounds", name])
                    .map(|color| (name.to_string(), color.to_string()))
            })
            .collect();

        let gradient = match (
            string_at(theme, &["colors", "gradientColors", "from"]),
            string_at(theme, &["colors", "gradientColors", "to"]),
        ) {
            (Some(from), Some(to)) => Some(Gradient {
                from: from.to_string(),
                via: string_at(theme, &["colors", "gradientColors", "via"]).map(str::to_string),
                to: to.to_string(),
            }),
            _ => None,
        };

        let text_colors = theme
            .get("colors")
            .and_then(|colors| colors.get("textColors"))
            .and_then(Value::as_object)
            .map(|map| {
                map.iter()
                    .map(|(background, colors)| {
                        let pick = |key: &str| string_at(colors, &[key]).map(str::to_string);
                        (
                            background.clone(),
                            TextColors {
                                heading: pick("heading"),
                                body: pick("body"),
                                muted: pick("muted"),
                            },
                        )
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            heading_font: string_at(theme, &["typography", "headingFont"]).map(str::to_string),
            body_font: string_at(theme, &["typography", "bodyFont"]).map(str::to_string),
            accent_color: string_at(theme, &["colors", "accentColor"]).map(str::to_string),
            section_backgrounds,
            gradient,
            text_colors,
        }
    }
}
