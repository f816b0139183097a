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

//! Read-only view of the process environment used by every resolver call.
//!
//! Resolution never calls `std::env::var` directly. The server captures a
//! fresh [`EnvSnapshot`] per tool invocation, tests build one from a literal
//! map, and both go through exactly the same code path.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Directory holding mounted secrets (`<provider>_api_key`)
pub const DEFAULT_SECRET_DIR: &str = "/run/secrets";

/// Environment variable names understood by the resolver.
pub mod keys {
    pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";
    pub const AZURE_API_KEY: &str = "AZURE_API_KEY";
    pub const LITE_API_KEY: &str = "LITE_API_KEY";
    pub const CUSTOM_API_KEY: &str = "CUSTOM_API_KEY";
    pub const ANTHROPIC_API_KEY: &str = "ANTHROPIC_API_KEY";
    /// Shared fallback for OpenAI-compatible providers
    pub const API_KEY: &str = "API_KEY";

    pub const LLM_PROVIDER: &str = "LLM_PROVIDER";
    pub const LLM_MODEL: &str = "LLM_MODEL";
    pub const LLM_TEMPERATURE: &str = "LLM_TEMPERATURE";
    pub const LLM_MAX_TOKENS: &str = "LLM_MAX_TOKENS";
    pub const LLM_EXTRA_PARAMS: &str = "LLM_EXTRA_PARAMS";
    pub const LLM_CONFIG_FILE: &str = "LLM_CONFIG_FILE";

    pub const EMBEDDING_PROVIDER: &str = "EMBEDDING_PROVIDER";
    pub const EMBEDDING_MODEL: &str = "EMBEDDING_MODEL";
    pub const EMBEDDING_EXTRA_PARAMS: &str = "EMBEDDING_EXTRA_PARAMS";

    pub const OPENAI_API_BASE: &str = "OPENAI_API_BASE";
    pub const OPENAI_API_TYPE: &str = "OPENAI_API_TYPE";
    pub const OPENAI_API_VERSION: &str = "OPENAI_API_VERSION";
    pub const LITE_API_BASE: &str = "LITE_API_BASE";
    pub const CUSTOM_API_BASE: &str = "CUSTOM_API_BASE";
    pub const ANTHROPIC_API_BASE: &str = "ANTHROPIC_API_BASE";
}

/// Immutable snapshot of environment variables plus the secret directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvSnapshot {
    vars: BTreeMap<String, String>,
    secret_dir: PathBuf,
}

impl EnvSnapshot {
    /// Snapshot the current process environment.
    ///
    /// Variables whose name or value is not valid UTF-8 are skipped.
    pub fn capture() -> Self {
        Self::from_os_vars(std::env::vars_os())
    }

    fn from_os_vars<I>(vars: I) -> Self
    where
        I: IntoIterator<Item = (OsString, OsString)>,
    {
        Self::from_vars(vars.into_iter().filter_map(|(key, value)| {
            match (key.into_string(), value.into_string()) {
                (Ok(key), Ok(value)) => Some((key, value)),
                (Ok(key), Err(_)) => {
                    tracing::debug!(variable = %key, "Skipping non UTF-8 environment value");
                    None
                }
                (Err(key), _) => {
                    tracing::debug!(variable = ?key, "Skipping non UTF-8 environment variable");
                    None
                }
            }
        }))
    }

    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            secret_dir: PathBuf::from(DEFAULT_SECRET_DIR),
        }
    }

    pub fn empty() -> Self {
        Self::from_vars(Vec::<(String, String)>::new())
    }

    pub fn with_secret_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.secret_dir = dir.into();
        self
    }

    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    /// Value of `key` with surrounding whitespace removed.
    ///
    /// Blank values count as unset.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn secret_dir(&self) -> &Path {
        &self.secret_dir
    }
}

impl Default for EnvSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_values_are_unset() {
        let env = EnvSnapshot::from_vars([("LLM_MODEL", "   "), ("LLM_PROVIDER", " azure ")]);
        assert_eq!(env.get(keys::LLM_MODEL), None);
        assert_eq!(env.get(keys::LLM_PROVIDER), Some("azure"));
        assert_eq!(env.get("MISSING"), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_variables_are_skipped() {
        use std::os::unix::ffi::OsStringExt;

        let env = EnvSnapshot::from_os_vars(vec![
            (OsString::from("OPENAI_API_KEY"), OsString::from("sk-test")),
            (OsString::from("BINARY_VALUE"), OsString::from_vec(vec![0x66, 0xff, 0x6f])),
            (OsString::from_vec(vec![0x4b, 0xfe]), OsString::from("value")),
        ]);
        assert_eq!(env.get(keys::OPENAI_API_KEY), Some("sk-test"));
        assert_eq!(env.get("BINARY_VALUE"), None);
        assert_eq!(env.vars.len(), 1);
    }

    #[test]
    fn test_capture_does_not_panic() {
        let env = EnvSnapshot::capture();
        assert_eq!(env.secret_dir(), Path::new(DEFAULT_SECRET_DIR));
    }

    #[test]
    fn test_default_secret_dir() {
        let env = EnvSnapshot::empty();
        assert_eq!(env.secret_dir(), Path::new("/run/secrets"));

        let env = env.with_secret_dir("/tmp/secrets");
        assert_eq!(env.secret_dir(), Path::new("/tmp/secrets"));
    }
}
