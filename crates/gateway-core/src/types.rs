//! Validated newtypes for identifiers and bounded numeric parameters.
//!
//! Each type enforces its invariant at construction so that once a value
//! exists, callers never need to re-validate it.

use crate::error::GatewayError;
use serde::{Deserialize, Serialize};
use std::fmt;

fn validate_identifier(kind: &str, value: &str) -> Result<(), GatewayError> {
    if value.is_empty() || value.len() > 64 {
        return Err(GatewayError::validation(
            format!("{kind} must be between 1 and 64 characters, got {}", value.len()),
            Some(kind.to_lowercase()),
            "invalid_length",
        ));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(GatewayError::validation(
            format!("{kind} may only contain letters, digits, '_' and '-'"),
            Some(kind.to_lowercase()),
            "invalid_characters",
        ));
    }
    Ok(())
}

macro_rules! id_newtype {
    ($name:ident, $label:literal) => {
        #[doc = concat!("Validated ", $label, " identifier: 1-64 chars of `[A-Za-z0-9_-]`.")]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            #[doc = concat!("Validate and wrap a ", $label, " identifier.")]
            ///
            /// # Errors
            /// Returns a validation error if the value is empty, too long, or
            /// contains characters outside `[A-Za-z0-9_-]`.
            pub fn new(value: impl Into<String>) -> Result<Self, GatewayError> {
                let value = value.into();
                validate_identifier($label, &value)?;
                Ok(Self(value))
            }

            /// Borrow the underlying string.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::str::FromStr for $name {
            type Err = GatewayError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }
    };
}

id_newtype!(TenantId, "TenantId");
id_newtype!(UserId, "UserId");
id_newtype!(ProviderId, "ProviderId");

/// Model identifier. Non-empty; unlike tenant/user ids this may contain the
/// characters providers commonly use in model names (`.`, `:`, `/`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelId(String);

impl ModelId {
    /// Validate and wrap a model identifier.
    ///
    /// # Errors
    /// Returns a validation error if the value is empty.
    pub fn new(value: impl Into<String>) -> Result<Self, GatewayError> {
        let value = value.into();
        if value.is_empty() {
            return Err(GatewayError::validation(
                "model id must not be empty",
                Some("model".to_string()),
                "empty_model",
            ));
        }
        Ok(Self(value))
    }

    /// Borrow the underlying string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Request correlation identifier. Generated if the caller does not supply one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Wrap an externally supplied id (e.g. from `X-Correlation-ID`) without
    /// re-validating its shape — callers may pass through whatever the
    /// upstream caller sent.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Generate a fresh random id.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Borrow the underlying string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::generate()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque API key wrapper; never logged or displayed.
#[derive(Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApiKey(secrecy::SecretString);

impl ApiKey {
    /// Wrap a raw credential string.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(secrecy::SecretString::new(value.into()))
    }

    /// Expose the credential for use in an outbound Authorization header.
    #[must_use]
    pub fn expose(&self) -> &str {
        secrecy::ExposeSecret::expose_secret(&self.0)
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

macro_rules! bounded_float {
    ($name:ident, $min:expr, $max:expr) => {
        #[doc = concat!("Sampling parameter bounded to [", stringify!($min), ", ", stringify!($max), "].")]
        #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(f32);

        impl $name {
            #[doc = "Validate and wrap a raw value."]
            ///
            /// # Errors
            /// Returns a validation error when the value falls outside range.
            pub fn new(value: f32) -> Result<Self, GatewayError> {
                if !($min..=$max).contains(&value) {
                    return Err(GatewayError::validation(
                        format!(
                            "{} must be between {} and {}, got {value}",
                            stringify!($name),
                            $min,
                            $max
                        ),
                        Some(stringify!($name).to_lowercase()),
                        concat!("invalid_", stringify!($name)),
                    ));
                }
                Ok(Self(value))
            }

            /// The raw numeric value.
            #[must_use]
            pub fn value(&self) -> f32 {
                self.0
            }
        }
    };
}

bounded_float!(Temperature, 0.0, 2.0);
bounded_float!(TopP, 0.0, 1.0);

/// Top-k sampling parameter. Providers interpret `0` as "unset"; any
/// non-negative value is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TopK(u32);

impl TopK {
    /// Wrap a top-k value.
    ///
    /// # Errors
    /// This constructor never errors today; it returns `Result` for symmetry
    /// with the other bounded newtypes and to leave room for future range
    /// enforcement without a signature change.
    pub fn new(value: u32) -> Result<Self, GatewayError> {
        Ok(Self(value))
    }

    /// The raw numeric value.
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }
}

/// Maximum generated token count. Must be nonzero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MaxTokens(u32);

impl MaxTokens {
    /// Validate and wrap a max-tokens value.
    ///
    /// # Errors
    /// Returns a validation error when `value` is zero.
    pub fn new(value: u32) -> Result<Self, GatewayError> {
        if value == 0 {
            return Err(GatewayError::validation(
                "max_tokens must be greater than 0",
                Some("max_tokens".to_string()),
                "invalid_max_tokens",
            ));
        }
        Ok(Self(value))
    }

    /// The raw numeric value.
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }
}
