// Token-provider seam.
//
// Token acquisition and refresh are external collaborators: this crate only
// ever asks for a currently-valid bearer token. Implementations refresh
// behind this call when their cached token is near expiry.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::error::Error;

/// Source of bearer tokens for the vendor cloud.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Return a currently-valid access token, refreshing if needed.
    ///
    /// Failures surface as [`Error::Auth`].
    async fn access_token(&self) -> Result<String, Error>;
}

/// Fixed token, for tests and short-lived tooling.
pub struct StaticToken(SecretString);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn access_token(&self) -> Result<String, Error> {
        Ok(self.0.expose_secret().to_owned())
    }
}
