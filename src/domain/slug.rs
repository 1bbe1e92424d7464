//! Group slug normalisation.
//!
//! Group slugs are operator supplied; they are run through `slug::slugify`
//! so that the stored value is always URL-safe.

use slug::slugify;
use thiserror::Error;

const MAX_SLUG_LEN: usize = 50;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlugError {
    #[error("slug source text is empty")]
    EmptyInput,
    #[error("failed to derive slug from `{input}`")]
    Unrepresentable { input: String },
    #[error("slug `{slug}` exceeds {MAX_SLUG_LEN} characters")]
    TooLong { slug: String },
}

/// Derive a URL-safe slug from operator input.
pub fn derive_slug(input: &str) -> Result<String, SlugError> {
    if input.trim().is_empty() {
        return Err(SlugError::EmptyInput);
    }

    let candidate = slugify(input);
    if candidate.is_empty() {
        return Err(SlugError::Unrepresentable {
            input: input.to_string(),
        });
    }

    if candidate.chars().count() > MAX_SLUG_LEN {
        return Err(SlugError::TooLong { slug: candidate });
    }

    Ok(candidate)
}
