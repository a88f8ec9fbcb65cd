use async_trait::async_trait;

use super::{Suggestion, SuggestionProvider};
use crate::error::{Error, ErrorDetails};

const PROVIDER_TYPE: &str = "dummy";

/// Offline provider for local runs. Always answers with the same recipe built around
/// the requested liquor, or always fails when built with `failing()`.
#[derive(Debug, Default)]
pub struct DummyProvider {
    fail: bool,
}

impl DummyProvider {
    pub fn new() -> Self {
        Self { fail: false }
    }

    pub fn failing() -> Self {
        Self { fail: true }
    }
}

#[async_trait]
impl SuggestionProvider for DummyProvider {
    fn provider_type(&self) -> &'static str {
        PROVIDER_TYPE
    }

    async fn suggest(
        &self,
        _http_client: &reqwest::Client,
        mood: &str,
        liquor: &str,
    ) -> Result<Suggestion, Error> {
        if self.fail {
            return Err(Error::new(ErrorDetails::ProviderFailure {
                provider_type: PROVIDER_TYPE.to_string(),
                message: "Dummy provider is configured to fail".to_string(),
                status_code: None,
            }));
        }
        Ok(Suggestion {
            drink_name: format!("{mood} {liquor} Highball"),
            description: format!(
                "A tall, easygoing {liquor} highball for a {} mood.",
                mood.to_lowercase()
            ),
            ingredients: vec![
                format!("2 oz {liquor}"),
                "4 oz soda water".to_string(),
                "1/2 oz lime juice".to_string(),
                "Highball glass".to_string(),
            ],
            garnish: "Lime wheel on the rim".to_string(),
            emoji: "🍹".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dummy_provider() {
        let client = reqwest::Client::new();
        let suggestion = DummyProvider::new()
            .suggest(&client, "Relaxed", "Rum")
            .await
            .unwrap();
        assert_eq!(suggestion.drink_name, "Relaxed Rum Highball");
        assert_eq!(suggestion.ingredients[0], "2 oz Rum");

        let err = DummyProvider::failing()
            .suggest(&client, "Relaxed", "Rum")
            .await
            .unwrap_err();
        assert!(matches!(
            err.get_details(),
            ErrorDetails::ProviderFailure { .. }
        ));
    }
}
