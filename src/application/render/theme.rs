//! Theme → fonts and CSS custom properties.

use std::collections::BTreeMap;

use super::types::Theme;

pub(crate) const BASE_FONT: &str = "Inter";
const PRELOADED_FONTS: &[&str] = &[BASE_FONT, "Bricolage Grotesque"];
const GOOGLE_FONTS_CSS: &str = "https://fonts.googleapis.com/css2";

/// Font families referenced by the theme, first family only, quotes stripped.
/// The base font is always present and listed last.
pub(crate) fn extract_fonts(theme: &Theme) -> Vec<String> {
    let mut fonts = Vec::new();
    for family in [&theme.heading_font, &theme.body_font]
        .into_iter()
        .flatten()
        .filter_map(|stack| primary_family(stack))
    {
        if family != BASE_FONT && !fonts.contains(&family) {
            fonts.push(family);
        }
    }
    fonts.push(BASE_FONT.to_string());
    fonts
}

fn primary_family(stack: &str) -> Option<String> {
    let cleaned: String = stack.chars().filter(|c| *c != '\'' && *c != '"').collect();
    let family = cleaned.split(',').next()?.trim();
    let safe = family
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == ' ' || c == '-');
    (!family.is_empty() && safe).then(|| family.to_string())
}

/// Stylesheet link for fonts not already shipped with the shared stylesheet.
pub(crate) fn google_fonts_url(fonts: &[String]) -> Option<String> {
    let families = fonts
        .iter()
        .filter(|font| !PRELOADED_FONTS.contains(&font.as_str()))
        .map(|font| format!("family={}", font.split_whitespace().collect::<Vec<_>>().join("+")))
        .collect::<Vec<_>>();
    if families.is_empty() {
        return None;
    }
    Some(format!("{GOOGLE_FONTS_CSS}?{}&display=swap", families.join("&")))
}

/// CSS custom properties in sorted order.
pub(crate) fn css_variables(theme: &Theme) -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();
    let mut insert = |name: String, value: &str| {
        if let Some(value) = css_value(value) {
            vars.insert(name, value);
        }
    };

    for (background, color) in &theme.section_backgrounds {
        insert(format!("--bg-{background}-base"), color);
    }

    if let Some(accent) = &theme.accent_color {
        insert("--accent-primary".to_string(), accent);
        insert("--accent-primary-hover".to_string(), &darken(accent, 10));
        insert("--accent-primary-active".to_string(), &darken(accent, 20));
    }

    if let Some(gradient) = &theme.gradient {
        insert("--gradient-from".to_string(), &gradient.from);
        insert(
            "--gradient-via".to_string(),
            gradient.via.as_deref().unwrap_or(&gradient.from),
        );
        insert("--gradient-to".to_string(), &gradient.to);
    }

    for (background, colors) in &theme.text_colors {
        if !background
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            continue;
        }
        for (slot, value) in [
            ("heading", &colors.heading),
            ("body", &colors.body),
            ("muted", &colors.muted),
        ] {
            if let Some(value) = value {
                insert(format!("--text-{background}-{slot}"), value);
            }
        }
    }

    vars
}

/// Keeps a value from escaping its declaration or the surrounding `<style>` element.
fn css_value(raw: &str) -> Option<String> {
    let value: String = raw
        .chars()
        .filter(|c| !matches!(c, '<' | '>' | '{' | '}' | ';' | '\\'))
        .collect();
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Darkens a `#rgb` / `#rrggbb` colour by `percent`; other notations pass through.
fn darken(color: &str, percent: u8) -> String {
    let Some(hex) = color.trim().strip_prefix('#') else {
        return color.to_string();
    };
    let expanded: String = match hex.len() {
        3 => hex.chars().flat_map(|c| [c, c]).collect(),
        6 => hex.to_string(),
        _ => return color.to_string(),
    };
    let Ok(value) = u32::from_str_radix(&expanded, 16) else {
        return color.to_string();
    };

    let factor = u32::from(100 - percent.min(100));
    let channel = |shift: u32| ((value >> shift) & 0xff) * factor / 100;
    format!(
        "#{:02x}{:02x}{:02x}",
        channel(16),
        channel(8),
        channel(0)
    )
}

/// Inline `:root` block, or `None` when the theme defines nothing.
pub(crate) fn style_block(vars: &BTreeMap<String, String>) -> Option<String> {
    if vars.is_empty() {
        return None;
    }
    let mut block = String::from(":root {\n");
    for (name, value) in vars {
        block.push_str(&format!("  {name}: {value};\n"));
    }
    block.push('}');
    Some(block)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::render::types::{Gradient, TextColors};

    fn theme() -> Theme {
        Theme {
            heading_font: Some("'Playfair Display', serif".to_string()),
            body_font: Some("Inter, sans-serif".to_string()),
            accent_color: Some("#3366ff".to_string()),
            section_backgrounds: [("primary".to_string(), "#101010".to_string())]
                .into_iter()
                .collect(),
            gradient: Some(Gradient {
                from: "#000".to_string(),
                via: None,
                to: "#fff".to_string(),
            }),
            text_colors: [(
                "primary".to_string(),
                TextColors {
                    heading: Some("#ffffff".to_string()),
                    body: None,
                    muted: Some("#999999".to_string()),
                },
            )]
            .into_iter()
            .collect(),
        }
    }

    #[test]
    fn fonts_always_include_base_font() {
        assert_eq!(extract_fonts(&Theme::default()), vec!["Inter".to_string()]);
        assert_eq!(
            extract_fonts(&theme()),
            vec!["Playfair Display".to_string(), "Inter".to_string()]
        );
    }

    #[test]
    fn google_fonts_link_skips_preloaded_families() {
        let fonts = vec![
            "Playfair Display".to_string(),
            "Bricolage Grotesque".to_string(),
            "Inter".to_string(),
        ];
        assert_eq!(
            google_fonts_url(&fonts).as_deref(),
            Some("https://fonts.googleapis.com/css2?family=Playfair+Display&display=swap")
        );
        assert_eq!(google_fonts_url(&["Inter".to_string()]), None);
    }

    #[test]
    fn variables_cover_backgrounds_accent_gradient_and_text() {
        let vars = css_variables(&theme());

        assert_eq!(vars["--bg-primary-base"], "#101010");
        assert_eq!(vars["--accent-primary"], "#3366ff");
        assert_eq!(vars["--accent-primary-hover"], "#2d5be5");
        assert_eq!(vars["--gradient-via"], "#000");
        assert_eq!(vars["--text-primary-muted"], "#999999");
        assert!(!vars.contains_key("--text-primary-body"));
        assert_eq!(vars.len(), 9);
    }

    #[test]
    fn values_cannot_break_out_of_style_block() {
        let theme = Theme {
            accent_color: Some("red;}</style><script>".to_string()),
            ..Theme::default()
        };
        let vars = css_variables(&theme);
        assert_eq!(vars["--accent-primary"], "red/stylescript");
    }

    #[test]
    fn empty_theme_has_no_style_block() {
        assert_eq!(style_block(&css_variables(&Theme::default())), None);
    }

    #[test]
    fn darken_handles_short_hex_and_passthrough() {
        assert_eq!(darken("#fff", 20), "#cccccc");
        assert_eq!(darken("rgb(1,2,3)", 20), "rgb(1,2,3)");
    }
}
