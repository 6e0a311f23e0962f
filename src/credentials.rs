//! Where adapters get the secret they authenticate with.

use async_trait::async_trait;
use std::fmt;

use crate::{error::MissingCredentialsSnafu, Result};

/// Supplies the credential for a provider: an API key or a bearer token.
#[async_trait]
pub trait CredentialProvider: Send + Sync + fmt::Debug {
    async fn credential(&self, provider: &str) -> Result<String>;
}

/// A credential fixed at construction time.
#[derive(Clone)]
pub struct StaticCredential(String);

impl StaticCredential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }
}

impl fmt::Debug for StaticCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StaticCredential(<redacted>)")
    }
}

#[async_trait]
impl CredentialProvider for StaticCredential {
    async fn credential(&self, provider: &str) -> Result<String> {
        if self.0.trim().is_empty() {
            return MissingCredentialsSnafu { provider }.fail();
        }
        Ok(self.0.clone())
    }
}

/// Reads the credential from the first set environment variable, on every call.
///
/// Reading lazily lets short-lived tokens be rotated without rebuilding the
/// gateway.
#[derive(Debug, Clone)]
pub struct EnvCredential {
    vars: Vec<String>,
}

impl EnvCredential {
    pub fn new<I, S>(vars: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            vars: vars.into_iter().map(Into::into).collect(),
        }
    }

    pub fn vars(&self) -> &[String] {
        &self.vars
    }
}

#[async_trait]
impl CredentialProvider for EnvCredential {
    async fn credential(&self, provider: &str) -> Result<String> {
        self.vars
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .find(|value| !value.trim().is_empty())
            .ok_or_else(|| MissingCredentialsSnafu { provider }.build())
    }
}
