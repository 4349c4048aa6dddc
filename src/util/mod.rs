//! Utility functions shared across the pipeline.
//!
//! - **URL validation**: SSRF checks applied before any source is fetched
//! - **Text processing**: control-character stripping, whitespace folding,
//!   HTML escaping and description sanitizing

mod text;
mod url_validator;

pub use text::{collapse_whitespace, escape_html, sanitize_html, strip_control_chars};
pub use url_validator::{validate_source_url, UrlValidationError};
