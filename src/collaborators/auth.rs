//! Authenticators
//!
//! The core only asks for the current credential. Obtaining one (the sign-in
//! flow) belongs to the shell.

use parking_lot::RwLock;

use crate::config::keychain::TokenKeychain;

/// Environment variable read by [`EnvAuthenticator`]
pub const TOKEN_ENV_VAR: &str = "DRIVELINK_TOKEN";

/// Bearer credential for the remote store
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    access_token: String,
}

impl Credential {
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn authorization_header(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

// Never print the token
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .finish()
    }
}

/// Supplies the credential of the signed-in user
pub trait Authenticator: Send + Sync {
    /// `None` means nobody is signed in
    fn current_credential(&self) -> Option<Credential>;
}

/// Credential held in memory; can be swapped or cleared at runtime
#[derive(Debug, Default)]
pub struct StaticAuthenticator {
    credential: RwLock<Option<Credential>>,
}

impl StaticAuthenticator {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            credential: RwLock::new(Some(Credential::bearer(token))),
        }
    }

    pub fn signed_out() -> Self {
        Self::default()
    }

    pub fn set_token(&self, token: impl Into<String>) {
        *self.credential.write() = Some(Credential::bearer(token));
    }

    pub fn sign_out(&self) {
        *self.credential.write() = None;
    }
}

impl Authenticator for StaticAuthenticator {
    fn current_credential(&self) -> Option<Credential> {
        self.credential.read().clone()
    }
}

/// Reads the token from an environment variable on every call
#[derive(Debug, Clone)]
pub struct EnvAuthenticator {
    var: String,
}

impl EnvAuthenticator {
    pub fn new() -> Self {
        Self::with_var(TOKEN_ENV_VAR)
    }

    pub fn with_var(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for EnvAuthenticator {
    fn default() -> Self {
        Self::new()
    }
}

impl Authenticator for EnvAuthenticator {
    fn current_credential(&self) -> Option<Credential> {
        std::env::var(&self.var)
            .ok()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .map(Credential::bearer)
    }
}

/// Reads the token stored by `drivelink login` from the system keychain
pub struct KeychainAuthenticator {
    keychain: TokenKeychain,
    account: String,
}

impl KeychainAuthenticator {
    pub fn new(keychain: TokenKeychain, account: impl Into<String>) -> Self {
        Self {
            keychain,
            account: account.into(),
        }
    }
}

impl Authenticator for KeychainAuthenticator {
    fn current_credential(&self) -> Option<Credential> {
        match self.keychain.token(&self.account) {
            Ok(token) => token.map(Credential::bearer),
            Err(e) => {
                tracing::warn!("Keychain unavailable, treating as signed out: {}", e);
                None
            }
        }
    }
}
