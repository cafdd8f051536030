//! Media reference normalisation for published documents.
//!
//! An artifact is served from a different origin than the editor, so every
//! `src` and CSS `url()` reference is rewritten to an absolute https URL.

use std::{cell::RefCell, rc::Rc};

use lol_html::{RewriteStrSettings, element, rewrite_str};
use thiserror::Error;
use url::Url;

use super::types::RenderError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssetError {
    #[error("asset reference `{url}` is not an http(s) or root-relative url")]
    Unsupported { url: String },
    #[error("asset reference `{url}` could not be parsed: {reason}")]
    Malformed { url: String, reason: String },
}

/// Resolves a single reference. `Ok(None)` is an empty (optional) asset.
pub fn resolve(url: &str, base: &Url) -> Result<Option<Url>, AssetError> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    if trimmed.starts_with('/') && !trimmed.starts_with("//") {
        return base
            .join(trimmed)
            .map(|joined| Some(upgrade(joined)))
            .map_err(|err| AssetError::Malformed {
                url: trimmed.to_string(),
                reason: err.to_string(),
            });
    }

    let scheme = trimmed
        .split_once(':')
        .map(|(scheme, _)| scheme.to_ascii_lowercase());
    match scheme.as_deref() {
        Some("http" | "https") => Url::parse(trimmed)
            .map(|parsed| Some(upgrade(parsed)))
            .map_err(|err| AssetError::Malformed {
                url: trimmed.to_string(),
                reason: err.to_string(),
            }),
        _ => Err(AssetError::Unsupported {
            url: trimmed.to_string(),
        }),
    }
}

fn upgrade(mut url: Url) -> Url {
    if url.scheme() == "http" {
        // Only fails for scheme changes between special and non-special schemes.
        let _ = url.set_scheme("https");
    }
    url
}

fn is_data_uri(value: &str) -> bool {
    value
        .trim_start()
        .get(..5)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("data:"))
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RewriteOutcome {
    pub html: String,
    pub rewritten: u32,
    pub invalid: u32,
}

#[derive(Default)]
struct RewriteState {
    rewritten: u32,
    invalid: u32,
}

impl RewriteState {
    fn record(&mut self, changed: bool) {
        if changed {
            self.rewritten = self.rewritten.saturating_add(1);
        }
    }

    fn reject(&mut self, url: &str, err: &AssetError) {
        self.invalid = self.invalid.saturating_add(1);
        tracing::debug!(
            target = "application::render::assets",
            url,
            error = %err,
            "dropping invalid asset reference"
        );
    }
}

/// Rewrites every `src` attribute and inline `url()` reference in `html`.
///
/// Invalid references are removed rather than failing the render.
pub fn rewrite(html: &str, base: &Url) -> Result<RewriteOutcome, RenderError> {
    let state = Rc::new(RefCell::new(RewriteState::default()));

    let html = rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![
                element!("[src]", {
                    let state = Rc::clone(&state);
                    move |el| {
                        let Some(src) = el.get_attribute("src") else {
                            return Ok(());
                        };
                        if is_data_uri(&src) {
                            return Ok(());
                        }
                        let mut state = state.borrow_mut();
                        match resolve(&src, base) {
                            Ok(Some(resolved)) => {
                                state.record(resolved.as_str() != src);
                                el.set_attribute("src", resolved.as_str())?;
                            }
                            Ok(None) => el.remove_attribute("src"),
                            Err(err) => {
                                state.reject(&src, &err);
                                el.remove_attribute("src");
                            }
                        }
                        Ok(())
                    }
                }),
                element!("[style]", {
                    let state = Rc::clone(&state);
                    move |el| {
                        let Some(style) = el.get_attribute("style") else {
                            return Ok(());
                        };
                        let rewritten = rewrite_style(&style, base, &mut state.borrow_mut());
                        if rewritten != style {
                            if rewritten.is_empty() {
                                el.remove_attribute("style");
                            } else {
                                el.set_attribute("style", &rewritten)?;
                            }
                        }
                        Ok(())
                    }
                }),
            ],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|err| RenderError::Document {
        message: err.to_string(),
    })?;

    let state = state.borrow();
    Ok(RewriteOutcome {
        html,
        rewritten: state.rewritten,
        invalid: state.invalid,
    })
}

fn rewrite_style(style: &str, base: &Url, state: &mut RewriteState) -> String {
    let mut declarations = Vec::new();
    for declaration in split_declarations(style) {
        let declaration = declaration.trim();
        if declaration.is_empty() {
            continue;
        }
        match rewrite_declaration(declaration, base, state) {
            Some(kept) => declarations.push(kept),
            None => continue,
        }
    }
    declarations.join("; ")
}

/// Splits a style attribute on `;` outside of quotes and parentheses, so
/// `url(data:image/gif;base64,...)` stays in one declaration.
fn split_declarations(style: &str) -> Vec<&str> {
    let mut declarations = Vec::new();
    let mut depth = 0usize;
    let mut quote = None;
    let mut start = 0;
    for (index, ch) in style.char_indices() {
        match (quote, ch) {
            (Some(open), _) if ch == open => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(ch),
            (None, '(') => depth += 1,
            (None, ')') => depth = depth.saturating_sub(1),
            (None, ';') if depth == 0 => {
                declarations.push(&style[start..index]);
                start = index + 1;
            }
            _ => {}
        }
    }
    declarations.push(&style[start..]);
    declarations
}

/// Byte offset of the `)` closing a `url(` token, skipping quoted text.
fn find_url_close(value: &str) -> Option<usize> {
    let mut quote = None;
    for (index, ch) in value.char_indices() {
        match (quote, ch) {
            (Some(open), _) if ch == open => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(ch),
            (None, ')') => return Some(index),
            _ => {}
        }
    }
    None
}

/// Returns `None` when the declaration carried an invalid reference and is dropped.
fn rewrite_declaration(
    declaration: &str,
    base: &Url,
    state: &mut RewriteState,
) -> Option<String> {
    let Some((property, value)) = declaration.split_once(':') else {
        return Some(declaration.to_string());
    };
    let property = property.trim();
    if !matches!(
        property.to_ascii_lowercase().as_str(),
        "background" | "background-image"
    ) {
        return Some(declaration.to_string());
    }

    let mut output = String::with_capacity(value.len());
    let mut rest = value.trim();
    while let Some(start) = find_url_open(rest) {
        output.push_str(&rest[..start]);
        let after_open = &rest[start + 4..];
        let Some(close) = find_url_close(after_open) else {
            output.push_str(&rest[start..]);
            rest = "";
            break;
        };
        let raw = after_open[..close]
            .trim()
            .trim_matches(|c| c == '"' || c == '\'');
        rest = &after_open[close + 1..];

        if is_data_uri(raw) {
            output.push_str(&format!("url('{raw}')"));
            continue;
        }
        match resolve(raw, base) {
            Ok(Some(resolved)) => {
                state.record(resolved.as_str() != raw);
                output.push_str(&format!("url('{}')", resolved.as_str()));
            }
            Ok(None) => return None,
            Err(err) => {
                state.reject(raw, &err);
                return None;
            }
        }
    }
    output.push_str(rest);

    Some(format!("{property}: {}", output.trim()))
}

fn find_url_open(value: &str) -> Option<usize> {
    value.to_ascii_lowercase().find("url(")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://h").expect("base url")
    }

    #[test]
    fn resolve_round_trips() {
        let base = base();
        assert_eq!(
            resolve("https://x/y.png", &base).unwrap().unwrap().as_str(),
            "https://x/y.png"
        );
        assert_eq!(
            resolve("http://x/y.png", &base).unwrap().unwrap().as_str(),
            "https://x/y.png"
        );
        assert_eq!(
            resolve("/img/a.png", &base).unwrap().unwrap().as_str(),
            "https://h/img/a.png"
        );
        assert!(matches!(
            resolve("not a url", &base),
            Err(AssetError::Unsupported { .. })
        ));
    }

    #[test]
    fn empty_reference_is_valid_and_absent() {
        assert_eq!(resolve("", &base()), Ok(None));
        assert_eq!(resolve("   ", &base()), Ok(None));
    }

    #[test]
    fn protocol_relative_and_other_schemes_are_rejected() {
        assert!(resolve("//cdn.example.com/a.png", &base()).is_err());
        assert!(resolve("ftp://x/y.png", &base()).is_err());
        assert!(resolve("javascript:alert(1)", &base()).is_err());
    }

    #[test]
    fn rewrite_absolutises_src_and_background_images() {
        let html = concat!(
            r#"<img src="/img/a.png" alt="a">"#,
            r#"<section style="color: red; background-image: url('/bg.jpg')"></section>"#,
            r#"<img src="https://x/ok.png">"#,
        );
        let outcome = rewrite(html, &base()).unwrap();

        assert!(outcome.html.contains(r#"src="https://h/img/a.png""#));
        assert!(outcome.html.contains("url('https://h/bg.jpg')"));
        assert!(outcome.html.contains("color: red"));
        assert!(outcome.html.contains(r#"src="https://x/ok.png""#));
        assert_eq!(outcome.rewritten, 2);
        assert_eq!(outcome.invalid, 0);
    }

    #[test]
    fn rewrite_skips_data_uris() {
        let html = concat!(
            r#"<img src="data:image/png;base64,AAAA">"#,
            r#"<div style="background: url(data:image/gif;base64,R0); color: red"></div>"#,
        );
        let outcome = rewrite(html, &base()).unwrap();

        assert!(outcome.html.contains(r#"src="data:image/png;base64,AAAA""#));
        assert!(
            outcome
                .html
                .contains("background: url('data:image/gif;base64,R0'); color: red")
        );
        assert_eq!(outcome.rewritten, 0);
        assert_eq!(outcome.invalid, 0);
    }

    #[test]
    fn semicolons_inside_urls_stay_in_one_declaration() {
        let style = r#"background-image: url("/a;b.png"); margin: 0"#;
        assert_eq!(
            split_declarations(style),
            [r#"background-image: url("/a;b.png")"#, " margin: 0"]
        );

        let html = r#"<div style="background-image: url('/a;b.png'); margin: 0"></div>"#;
        let outcome = rewrite(html, &base()).unwrap();
        assert!(outcome.html.contains("url('https://h/a;b.png'); margin: 0"));
        assert_eq!(outcome.rewritten, 1);
    }

    #[test]
    fn rewrite_drops_invalid_references() {
        let html = concat!(
            r#"<img src="not a url" alt="x">"#,
            r#"<div style="background-image: url(ftp://x/a.png); padding: 1px"></div>"#,
        );
        let outcome = rewrite(html, &base()).unwrap();

        assert!(!outcome.html.contains("not a url"));
        assert!(!outcome.html.contains("ftp://"));
        assert!(outcome.html.contains("padding: 1px"));
        assert_eq!(outcome.invalid, 2);
    }
}
