//! Storefront navigation targets downstream of the design session.

use crate::error::CoreError;
use crate::session::Language;

/// Path of the "select product" step for a session, optionally pinned to a
/// variation: `/{lang}/design/{session_id}/products[?variation={id}]`.
///
/// Ids are interpolated verbatim, so anything that is not URL-safe is
/// rejected rather than escaped.
pub fn select_product_path(
    language: Language,
    session_id: &str,
    variation_id: Option<&str>,
) -> Result<String, CoreError> {
    validate_path_id("session_id", session_id)?;

    let mut path = format!("/{}/design/{session_id}/products", language.as_str());
    if let Some(variation_id) = variation_id {
        validate_path_id("variation_id", variation_id)?;
        path.push_str("?variation=");
        path.push_str(variation_id);
    }
    Ok(path)
}

fn validate_path_id(field: &str, id: &str) -> Result<(), CoreError> {
    let url_safe = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if url_safe {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "{field} '{id}' is not a valid identifier"
        )))
    }
}
