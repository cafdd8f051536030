use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("slug `{slug}` is invalid: {reason}")]
    InvalidSlug { slug: String, reason: &'static str },
    #[error("slug `{slug}` is reserved")]
    ReservedSlug { slug: String },
    #[error("required field `{field}` is empty")]
    EmptyField { field: &'static str },
}

impl DomainError {
    pub fn invalid_slug(slug: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidSlug {
            slug: slug.into(),
            reason,
        }
    }
}
