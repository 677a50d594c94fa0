//! # Gateway Providers
//!
//! Provider adapters for the Inference Gateway's closed provider set:
//! - Azure OpenAI Service
//! - AWS Bedrock (Claude models)
//!
//! Each adapter implements `gateway_core::LLMProvider`; the [`registry`]
//! module holds the set of configured instances the Router selects from.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

#[cfg(feature = "azure")]
pub mod azure;

#[cfg(feature = "bedrock")]
pub mod bedrock;

pub mod registry;

#[cfg(feature = "azure")]
pub use azure::{AzureOpenAiConfig, AzureOpenAiProvider};

#[cfg(feature = "bedrock")]
pub use bedrock::{BedrockConfig, BedrockProvider};

pub use registry::ProviderRegistry;
