//! Keychain Integration
//!
//! Keeps the access token of the signed-in account in the system keychain.

use keyring::Entry;

/// Service name for keychain entries
const SERVICE_NAME: &str = "com.drivelink.drive";

/// Keychain errors
#[derive(Debug, thiserror::Error)]
pub enum KeychainError {
    #[error("Keychain error: {0}")]
    Keyring(#[from] keyring::Error),
}

/// Access-token storage backed by the OS keychain
pub struct TokenKeychain {
    service: String,
}

impl TokenKeychain {
    pub fn new() -> Self {
        Self {
            service: SERVICE_NAME.to_string(),
        }
    }

    /// Custom service name (for testing)
    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    /// Entries are keyed by local user and account so two OS users never
    /// share a token.
    fn entry(&self, account: &str) -> Result<Entry, KeychainError> {
        let username = whoami::username();
        Ok(Entry::new(&self.service, &format!("{}@{}", username, account))?)
    }

    pub fn store_token(&self, account: &str, token: &str) -> Result<(), KeychainError> {
        tracing::info!("Keychain store: service={}, account={}", self.service, account);
        self.entry(account)?.set_password(token)?;
        Ok(())
    }

    /// Stored token, `None` when the account has never signed in
    pub fn token(&self, account: &str) -> Result<Option<String>, KeychainError> {
        match self.entry(account)?.get_password() {
            Ok(token) => Ok(Some(token)),
            Err(keyring::Error::NoEntry) => {
                tracing::debug!("Keychain: no token for account={}", account);
                Ok(None)
            }
            Err(e) => {
                tracing::error!("Keychain read failed: account={}, error={:?}", account, e);
                Err(KeychainError::Keyring(e))
            }
        }
    }

    pub fn delete_token(&self, account: &str) -> Result<(), KeychainError> {
        match self.entry(account)?.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()), // Already signed out
            Err(e) => Err(KeychainError::Keyring(e)),
        }
    }
}

impl Default for TokenKeychain {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Talks to the real system keychain
    #[test]
    #[ignore] // Run manually: cargo test keychain -- --ignored
    fn test_token_roundtrip() {
        let keychain = TokenKeychain::with_service("com.drivelink.test");
        let account = format!("test-{}", uuid::Uuid::new_v4());

        keychain.store_token(&account, "ya29.secret").unwrap();
        assert_eq!(keychain.token(&account).unwrap().as_deref(), Some("ya29.secret"));

        keychain.delete_token(&account).unwrap();
        assert_eq!(keychain.token(&account).unwrap(), None);
        // Deleting twice is fine
        keychain.delete_token(&account).unwrap();
    }
}
