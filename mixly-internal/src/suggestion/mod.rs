use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, ErrorDetails};

pub mod dummy;
pub mod openai;
pub mod prompt;

pub use dummy::DummyProvider;
pub use openai::OpenAIProvider;

/// A drink suggestion as returned to clients.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub drink_name: String,
    pub description: String,
    pub ingredients: Vec<String>,
    pub garnish: String,
    pub emoji: String,
}

/// Turns a (mood, liquor) pair into a suggestion. Any error means nothing was produced
/// and the user must not be charged.
#[async_trait]
pub trait SuggestionProvider: Send + Sync {
    fn provider_type(&self) -> &'static str;

    async fn suggest(
        &self,
        http_client: &reqwest::Client,
        mood: &str,
        liquor: &str,
    ) -> Result<Suggestion, Error>;
}

/// Where to read a provider API key from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CredentialLocation {
    Env(String),
    None,
}

impl<'de> Deserialize<'de> for CredentialLocation {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        if let Some(var) = s.strip_prefix("env::") {
            if var.is_empty() {
                return Err(serde::de::Error::custom(
                    "`env::` credential location needs a variable name",
                ));
            }
            Ok(CredentialLocation::Env(var.to_string()))
        } else if s == "none" {
            Ok(CredentialLocation::None)
        } else {
            Err(serde::de::Error::custom(format!(
                "Invalid credential location `{s}`, expected `env::VAR_NAME` or `none`"
            )))
        }
    }
}

impl CredentialLocation {
    pub fn load(&self, provider_type: &str) -> Result<Option<SecretString>, Error> {
        match self {
            CredentialLocation::Env(var) => match std::env::var(var) {
                Ok(value) => Ok(Some(SecretString::from(value))),
                Err(_) => Err(Error::new(ErrorDetails::Config {
                    message: format!(
                        "Missing environment variable `{var}` for `{provider_type}` API key"
                    ),
                })),
            },
            CredentialLocation::None => Ok(None),
        }
    }
}

pub fn default_api_key_location() -> CredentialLocation {
    CredentialLocation::Env("OPENAI_API_KEY".to_string())
}

fn default_model_name() -> String {
    openai::DEFAULT_MODEL_NAME.to_string()
}

fn default_api_base() -> Url {
    openai::OPENAI_DEFAULT_BASE_URL.clone()
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase", deny_unknown_fields)]
pub enum SuggestionProviderConfig {
    #[serde(rename = "openai")]
    OpenAI {
        #[serde(default = "default_model_name")]
        model_name: String,
        #[serde(default = "default_api_base")]
        api_base: Url,
        #[serde(default = "default_api_key_location")]
        api_key_location: CredentialLocation,
    },
    Dummy {
        #[serde(default)]
        fail: bool,
    },
}

impl Default for SuggestionProviderConfig {
    fn default() -> Self {
        SuggestionProviderConfig::OpenAI {
            model_name: default_model_name(),
            api_base: default_api_base(),
            api_key_location: default_api_key_location(),
        }
    }
}

impl SuggestionProviderConfig {
    pub fn load(&self) -> Result<Arc<dyn SuggestionProvider>, Error> {
        match self {
            SuggestionProviderConfig::OpenAI {
                model_name,
                api_base,
                api_key_location,
            } => Ok(Arc::new(OpenAIProvider::new(
                model_name.clone(),
                api_base.clone(),
                api_key_location,
            )?)),
            SuggestionProviderConfig::Dummy { fail } => Ok(Arc::new(if *fail {
                DummyProvider::failing()
            } else {
                DummyProvider::new()
            })),
        }
    }
}
