use std::sync::LazyLock;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, instrument};
use url::Url;

use super::prompt::PromptTemplates;
use super::{CredentialLocation, Suggestion, SuggestionProvider};
use crate::error::{DisplayOrDebugGateway, Error, ErrorDetails};

const PROVIDER_TYPE: &str = "openai";
pub const DEFAULT_MODEL_NAME: &str = "gpt-4o";

#[expect(clippy::expect_used)]
pub static OPENAI_DEFAULT_BASE_URL: LazyLock<Url> = LazyLock::new(|| {
    Url::parse("https://api.openai.com/v1/").expect("Failed to parse OPENAI_DEFAULT_BASE_URL")
});

const TEMPERATURE: f32 = 1.0;
const TOP_P: f32 = 0.95;
const MAX_TOKENS: u32 = 600;

#[derive(Debug)]
pub struct OpenAIProvider {
    model_name: String,
    api_base: Url,
    api_key: Option<SecretString>,
    prompts: PromptTemplates,
}

impl OpenAIProvider {
    pub fn new(
        model_name: String,
        api_base: Url,
        api_key_location: &CredentialLocation,
    ) -> Result<Self, Error> {
        check_api_base_suffix(&api_base);
        Ok(Self {
            model_name,
            api_base,
            api_key: api_key_location.load(PROVIDER_TYPE)?,
            prompts: PromptTemplates::new()?,
        })
    }
}

/// Warns when `api_base` lacks a trailing slash, since `Url::join` would then drop its last segment.
fn check_api_base_suffix(api_base: &Url) {
    if !api_base.path().ends_with('/') {
        tracing::warn!(
            "`api_base` `{api_base}` does not end with `/`; its last path segment will be replaced when building request URLs"
        );
    }
}

fn get_chat_url(base_url: &Url) -> Result<Url, Error> {
    base_url.join("chat/completions").map_err(|e| {
        Error::new(ErrorDetails::Config {
            message: format!("Error constructing chat completions URL: {e}"),
        })
    })
}

#[derive(Debug, Serialize)]
struct OpenAIRequestMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct OpenAIResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAIRequestMessage<'a>>,
    response_format: OpenAIResponseFormat,
    temperature: f32,
    max_tokens: u32,
    top_p: f32,
}

impl<'a> OpenAIRequest<'a> {
    fn new(model: &'a str, prompt: &'a str) -> Self {
        Self {
            model,
            messages: vec![OpenAIRequestMessage {
                role: "user",
                content: prompt,
            }],
            response_format: OpenAIResponseFormat {
                kind: "json_object",
            },
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
            top_p: TOP_P,
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIResponseChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseChoice {
    message: OpenAIResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
}

fn response_error(message: String, raw_response: &str) -> Error {
    Error::new(ErrorDetails::ProviderResponse {
        provider_type: PROVIDER_TYPE.to_string(),
        message,
        raw_response: Some(raw_response.to_string()),
    })
}

/// Extracts and validates the suggestion from a chat completion body.
fn parse_chat_response(raw_response: &str) -> Result<Suggestion, Error> {
    let response: OpenAIResponse = serde_json::from_str(raw_response).map_err(|e| {
        response_error(
            format!(
                "Error parsing response: {}",
                DisplayOrDebugGateway::new(e)
            ),
            raw_response,
        )
    })?;
    let content = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| response_error("No content in response".to_string(), raw_response))?;

    let deserializer = &mut serde_json::Deserializer::from_str(&content);
    let suggestion: Suggestion = serde_path_to_error::deserialize(deserializer).map_err(|e| {
        response_error(
            format!("Suggestion does not match the expected shape: {e}"),
            &content,
        )
    })?;

    if suggestion.drink_name.trim().is_empty() {
        return Err(response_error(
            "Suggestion has an empty `drinkName`".to_string(),
            &content,
        ));
    }
    if suggestion.ingredients.is_empty() {
        return Err(response_error(
            "Suggestion has no `ingredients`".to_string(),
            &content,
        ));
    }
    Ok(suggestion)
}

#[async_trait]
impl SuggestionProvider for OpenAIProvider {
    fn provider_type(&self) -> &'static str {
        PROVIDER_TYPE
    }

    #[instrument(skip_all, fields(model_name = %self.model_name, mood = %mood, liquor = %liquor))]
    async fn suggest(
        &self,
        http_client: &reqwest::Client,
        mood: &str,
        liquor: &str,
    ) -> Result<Suggestion, Error> {
        let prompt = self.prompts.render_cocktail_prompt(mood, liquor)?;
        let request_body = OpenAIRequest::new(&self.model_name, &prompt);
        let request_url = get_chat_url(&self.api_base)?;

        let start_time = Instant::now();
        let mut request_builder = http_client
            .post(request_url)
            .header("Content-Type", "application/json");
        if let Some(key) = &self.api_key {
            request_builder = request_builder.bearer_auth(key.expose_secret());
        }
        let res = request_builder
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                Error::new(ErrorDetails::ProviderFailure {
                    provider_type: PROVIDER_TYPE.to_string(),
                    message: format!(
                        "Error sending request: {}",
                        DisplayOrDebugGateway::new(e)
                    ),
                    status_code: None,
                })
            })?;

        let status = res.status();
        let raw_response = res.text().await.map_err(|e| {
            Error::new(ErrorDetails::ProviderFailure {
                provider_type: PROVIDER_TYPE.to_string(),
                message: format!(
                    "Error reading response body: {}",
                    DisplayOrDebugGateway::new(e)
                ),
                status_code: Some(status),
            })
        })?;
        debug!(
            status = status.as_u16(),
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "Received suggestion provider response"
        );

        if !status.is_success() {
            return Err(Error::new(ErrorDetails::ProviderFailure {
                provider_type: PROVIDER_TYPE.to_string(),
                message: raw_response,
                status_code: Some(status),
            }));
        }
        parse_chat_response(&raw_response)
    }
}
