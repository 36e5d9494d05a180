use axum::async_trait;
use axum::extract::FromRequestParts;
use http::request::Parts;

use common::types::Address;

use super::HandlerError;

/// Header carrying the caller's ledger identity
pub const IDENTITY_HEADER: &str = "x-anchor-identity";

/// The caller's identity, taken from [`IDENTITY_HEADER`]
///
/// Authentication is the job of whatever sits in front of the daemon; the
///  header is trusted as-is.
#[derive(Debug, Clone, Copy)]
pub struct Identity(pub Address);

#[async_trait]
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = HandlerError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(IDENTITY_HEADER)
            .ok_or(HandlerError::MissingIdentity)?;
        let value = value
            .to_str()
            .map_err(|e| HandlerError::InvalidIdentity(e.to_string()))?;
        value
            .trim()
            .parse::<Address>()
            .map(Identity)
            .map_err(|e| HandlerError::InvalidIdentity(e.to_string()))
    }
}
