// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Credential lookup: mounted secret file, provider variable, generic fallback.

use crate::env::{keys, EnvSnapshot};
use crate::error::{ConfigError, Result};
use crate::provider::ProviderKind;
use std::fmt;
use std::io::ErrorKind;
use std::path::PathBuf;

/// API key that never prints itself
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// One place a key may live
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialLocation {
    SecretFile(PathBuf),
    EnvVar(&'static str),
}

impl fmt::Display for CredentialLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialLocation::SecretFile(path) => write!(f, "secret file {}", path.display()),
            CredentialLocation::EnvVar(var) => write!(f, "env var {}", var),
        }
    }
}

/// A key together with where it was found
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub key: ApiKey,
    pub location: CredentialLocation,
}

/// Ordered lookup locations for one provider. First non-empty value wins.
#[derive(Debug, Clone)]
pub struct CredentialSource {
    provider: ProviderKind,
    locations: Vec<CredentialLocation>,
}

impl CredentialSource {
    pub fn for_provider(provider: ProviderKind, env: &EnvSnapshot) -> Self {
        let mut locations = vec![
            CredentialLocation::SecretFile(
                env.secret_dir()
                    .join(format!("{}_api_key", provider.as_str())),
            ),
            CredentialLocation::EnvVar(provider.api_key_var()),
        ];
        if provider.is_openai_compatible() {
            locations.push(CredentialLocation::EnvVar(keys::API_KEY));
        }

        Self {
            provider,
            locations,
        }
    }

    pub fn provider(&self) -> ProviderKind {
        self.provider
    }

    pub fn locations(&self) -> &[CredentialLocation] {
        &self.locations
    }

    /// Walk the locations in order.
    ///
    /// A missing secret file is skipped. A secret file that exists but
    /// cannot be read is an error.
    pub fn read(&self, env: &EnvSnapshot) -> Result<Option<Credential>> {
        for location in &self.locations {
            let value = match location {
                CredentialLocation::SecretFile(path) => match std::fs::read_to_string(path) {
                    Ok(content) => Some(content.trim().to_string()),
                    Err(e) if e.kind() == ErrorKind::NotFound => None,
                    Err(e) => {
                        return Err(ConfigError::UnreadableSecret {
                            path: path.clone(),
                            reason: e.to_string(),
                        })
                    }
                },
                CredentialLocation::EnvVar(var) => env.get(var).map(str::to_string),
            };

            if let Some(value) = value.filter(|v| !v.is_empty()) {
                tracing::debug!(provider = %self.provider, source = %location, "Credential found");
                return Ok(Some(Credential {
                    key: ApiKey(value),
                    location: location.clone(),
                }));
            }
        }

        Ok(None)
    }
}

/// Credential for `provider`, or `None` when no location holds one
pub fn read_credential(provider: ProviderKind, env: &EnvSnapshot) -> Result<Option<Credential>> {
    CredentialSource::for_provider(provider, env).read(env)
}
