//! Credential references for the experiment tracker.
//!
//! Credentials never live in source and are never written into the process
//! environment. A `SecretRef` names where a secret comes from and is resolved
//! once, when the tracker client is constructed.
//!
//! Format: `"env:<VAR>"`, a bare string (inline plaintext, discouraged), or
//! empty for "no credential".

use serde::{Deserialize, Serialize};

const ENV_PREFIX: &str = "env:";
const MASK: &str = "***";

/// Where a configured credential comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretSource<'a> {
    /// Nothing configured.
    Unset,
    /// Read from the named environment variable.
    Env(&'a str),
    /// Stored in the configuration file itself.
    Inline(&'a str),
}

/// A credential reference as written in `config.yaml`.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretRef(String);

impl std::fmt::Debug for SecretRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.source() {
            SecretSource::Unset => f.write_str("SecretRef(unset)"),
            SecretSource::Env(var) => write!(f, "SecretRef(env:{var})"),
            SecretSource::Inline(_) => f.write_str("SecretRef(inline ***)"),
        }
    }
}

impl SecretRef {
    /// Reference to the environment variable `var_name`.
    pub fn env(var_name: &str) -> Self {
        Self(format!("{ENV_PREFIX}{var_name}"))
    }

    pub fn source(&self) -> SecretSource<'_> {
        let raw = self.0.trim();
        if raw.is_empty() {
            SecretSource::Unset
        } else if let Some(var) = raw.strip_prefix(ENV_PREFIX) {
            SecretSource::Env(var.trim())
        } else {
            SecretSource::Inline(raw)
        }
    }

    pub fn is_env(&self) -> bool {
        matches!(self.source(), SecretSource::Env(_))
    }

    /// Copy safe to display: `env:` references and unset values are kept,
    /// inline values are masked.
    pub fn redacted(&self) -> Self {
        match self.source() {
            SecretSource::Inline(_) => Self(MASK.to_string()),
            SecretSource::Unset | SecretSource::Env(_) => self.clone(),
        }
    }

    /// Read the credential. Inline values are returned with a warning.
    pub fn resolve(&self) -> Result<String, SecretResolveError> {
        match self.source() {
            SecretSource::Unset => Err(SecretResolveError::Empty),
            SecretSource::Env(var) => {
                std::env::var(var).map_err(|_| SecretResolveError::EnvVarMissing {
                    var: var.to_string(),
                })
            }
            SecretSource::Inline(value) => {
                tracing::warn!("Tracker credential stored inline in configuration; use env:<VAR>");
                Ok(value.to_string())
            }
        }
    }

    /// Like [`resolve`](Self::resolve), but an unset reference or a missing
    /// variable means the tracker runs without that credential.
    pub fn resolve_optional(&self) -> Option<String> {
        match self.resolve() {
            Ok(value) => Some(value),
            Err(SecretResolveError::Empty) => None,
            Err(SecretResolveError::EnvVarMissing { var }) => {
                tracing::debug!(var = %var, "Credential variable not set");
                None
            }
        }
    }
}

impl From<&str> for SecretRef {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SecretResolveError {
    #[error("No credential configured")]
    Empty,

    #[error("Credential variable '{var}' is not set")]
    EnvVarMissing { var: String },
}
