//! Service account authentication for the Drive and Sheets APIs.

use crate::api::{DriveError, OAUTH_SCOPES};
use std::fmt::{Debug, Formatter};
use std::path::Path;
use tracing::debug;
use yup_oauth2::authenticator::DefaultAuthenticator;

/// Hands out access tokens for a Google service account. `yup_oauth2` caches the token and
/// requests a new one shortly before it expires.
#[derive(Clone)]
pub(crate) struct TokenProvider {
    authenticator: DefaultAuthenticator,
}

impl Debug for TokenProvider {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("TokenProvider")
    }
}

impl TokenProvider {
    /// Reads the service account JSON key at `key_path`.
    pub(crate) async fn load(key_path: &Path) -> Result<Self, DriveError> {
        debug!("Loading service account key from {}", key_path.display());
        let key = yup_oauth2::read_service_account_key(key_path)
            .await
            .map_err(|e| {
                DriveError::Auth(format!(
                    "Unable to read the service account key '{}': {e}",
                    key_path.display()
                ))
            })?;
        let authenticator = yup_oauth2::ServiceAccountAuthenticator::builder(key)
            .build()
            .await
            .map_err(|e| DriveError::Auth(format!("Unable to create an authenticator: {e}")))?;
        Ok(Self { authenticator })
    }

    /// Returns a valid access token.
    pub(crate) async fn token(&self) -> Result<String, DriveError> {
        let token = self
            .authenticator
            .token(OAUTH_SCOPES)
            .await
            .map_err(|e| DriveError::Auth(format!("Unable to obtain an access token: {e}")))?;
        token
            .token()
            .map(str::to_string)
            .ok_or_else(|| DriveError::Auth("The access token was empty".to_string()))
    }
}
