//! Authorization decisions over verified claims.
//!
//! Missing access is reported as `NotFound`, never `Forbidden`, so a caller
//! without a valid token learns nothing about whether a document exists.
//! The one exception is delegation: a holder of `share` on the document has
//! already been shown the document exists, so asking to grant more than they
//! hold is reported as `Forbidden`.

use crate::error::{Error, Result};
use crate::token::{Claims, Permission};

/// Allow only if the claims are scoped to `document_id` and hold `required`.
pub fn authorize(claims: &Claims, document_id: &str, required: Permission) -> Result<()> {
    if claims.subject == document_id && claims.has(required) {
        Ok(())
    } else {
        Err(Error::NotFound)
    }
}

/// Allow a share of `requested` on `document_id`.
///
/// Requires `share` itself, and every requested permission must already be
/// held: a token can only delegate a subset of its own rights.
pub fn authorize_share(
    claims: &Claims,
    document_id: &str,
    requested: impl IntoIterator<Item = Permission>,
) -> Result<()> {
    authorize(claims, document_id, Permission::Share)?;
    match requested.into_iter().find(|p| !claims.has(*p)) {
        Some(missing) => Err(Error::Forbidden(missing)),
        None => Ok(()),
    }
}
