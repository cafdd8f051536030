//! Slug validation and the mapping between slugs and public hostnames.
//!
//! A published page lives at `https://{slug}.{published_domain}`. Slugs are
//! therefore restricted to a single DNS label: lowercase ASCII alphanumerics
//! separated by single hyphens.

use slug::slugify;

use super::error::DomainError;

const MIN_SLUG_LEN: usize = 3;
const MAX_SLUG_LEN: usize = 63;
const RESERVED_SLUGS: &[&str] = &["www", "api", "app", "admin"];

/// Validate a requested slug, returning it unchanged when acceptable.
pub fn validate_slug(input: &str) -> Result<&str, DomainError> {
    let len = input.len();
    if len < MIN_SLUG_LEN {
        return Err(DomainError::invalid_slug(input, "shorter than 3 characters"));
    }
    if len > MAX_SLUG_LEN {
        return Err(DomainError::invalid_slug(input, "longer than 63 characters"));
    }

    // `slugify` lowercases, transliterates and collapses separators; a valid
    // slug is a fixed point of it.
    if slugify(input) != input {
        return Err(DomainError::invalid_slug(
            input,
            "must be lowercase alphanumerics separated by single hyphens",
        ));
    }

    if RESERVED_SLUGS.contains(&input) {
        return Err(DomainError::ReservedSlug {
            slug: input.to_string(),
        });
    }

    Ok(input)
}

/// Public hostname serving the given slug.
pub fn hostname_for(slug: &str, published_domain: &str) -> String {
    format!("{slug}.{}", published_domain.trim_matches('.'))
}

/// Public URL for the given slug.
pub fn public_url_for(slug: &str, published_domain: &str) -> String {
    format!("https://{}", hostname_for(slug, published_domain))
}

/// Normalise a `Host` header value: lowercase, port and trailing dot stripped.
pub fn normalize_host(host: &str) -> String {
    let trimmed = host.trim();
    let without_port = match trimmed.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|ch| ch.is_ascii_digit()) => name,
        _ => trimmed,
    };
    without_port.trim_end_matches('.').to_ascii_lowercase()
}

/// Recover the slug addressed by a hostname under the published domain.
pub fn slug_from_host(host: &str, published_domain: &str) -> Option<String> {
    let host = normalize_host(host);
    let suffix = format!(".{}", published_domain.trim_matches('.').to_ascii_lowercase());
    let label = host.strip_suffix(&suffix)?;
    if label.is_empty() || label.contains('.') {
        return None;
    }
    validate_slug(label).ok().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_slugs() {
        assert_eq!(validate_slug("demo"), Ok("demo"));
        assert_eq!(validate_slug("my-launch-2"), Ok("my-launch-2"));
    }

    #[test]
    fn rejects_malformed_slugs() {
        assert!(matches!(
            validate_slug("ab"),
            Err(DomainError::InvalidSlug { .. })
        ));
        assert!(matches!(
            validate_slug("Demo"),
            Err(DomainError::InvalidSlug { .. })
        ));
        assert!(matches!(
            validate_slug("-demo"),
            Err(DomainError::InvalidSlug { .. })
        ));
        assert!(matches!(
            validate_slug("de--mo"),
            Err(DomainError::InvalidSlug { .. })
        ));
        assert!(matches!(
            validate_slug("demo page"),
            Err(DomainError::InvalidSlug { .. })
        ));
        assert!(matches!(
            validate_slug(&"a".repeat(64)),
            Err(DomainError::InvalidSlug { .. })
        ));
    }

    #[test]
    fn rejects_reserved_slugs() {
        assert_eq!(
            validate_slug("admin"),
            Err(DomainError::ReservedSlug {
                slug: "admin".to_string()
            })
        );
    }

    #[test]
    fn hostname_round_trips_through_slug() {
        let host = hostname_for("demo", "pagepress.site");
        assert_eq!(host, "demo.pagepress.site");
        assert_eq!(
            slug_from_host("Demo.PagePress.site:443", "pagepress.site").as_deref(),
            Some("demo")
        );
        assert_eq!(public_url_for("demo", "pagepress.site"), "https://demo.pagepress.site");
    }

    #[test]
    fn foreign_or_nested_hosts_have_no_slug() {
        assert_eq!(slug_from_host("demo.example.com", "pagepress.site"), None);
        assert_eq!(slug_from_host("a.demo.pagepress.site", "pagepress.site"), None);
        assert_eq!(slug_from_host("pagepress.site", "pagepress.site"), None);
    }
}
