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

//! Configuration errors raised while resolving model clients.
//!
//! Every variant names the variable, file or provider an operator has to
//! touch to fix the problem. Absent inputs (no secret file, no config file,
//! unset variables) are never errors and never show up here.

use crate::provider::{ProviderKind, Role};
use std::path::PathBuf;
use thiserror::Error;

/// Errors from configuration resolution and client construction
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(
        "No API key found for provider '{provider}' ({role} client). Checked: {}",
        checked.join(", ")
    )]
    MissingCredential {
        provider: ProviderKind,
        role: Role,
        checked: Vec<String>,
    },

    #[error("Provider '{provider}' does not support the {role} role (set via {variable})")]
    UnsupportedProvider {
        provider: ProviderKind,
        role: Role,
        variable: String,
    },

    #[error("Unknown provider '{0}'. Supported: openai, azure, lite, custom, anthropic")]
    UnknownProvider(String),

    #[error("Invalid numeric value for {variable}: '{value}' ({reason})")]
    InvalidNumber {
        variable: String,
        value: String,
        reason: String,
    },

    #[error("Invalid extra parameters in {variable}: {reason}")]
    InvalidExtraParams { variable: String, reason: String },

    #[error("Malformed config file {}: {reason}", path.display())]
    MalformedConfigFile { path: PathBuf, reason: String },

    #[error("Unreadable secret file {}: {reason}", path.display())]
    UnreadableSecret { path: PathBuf, reason: String },

    #[error("Failed to construct {role} client for provider '{provider}': {reason}")]
    ClientConstruction {
        role: Role,
        provider: ProviderKind,
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid_number(
        variable: impl Into<String>,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidNumber {
            variable: variable.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn malformed_file(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::MalformedConfigFile {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;
