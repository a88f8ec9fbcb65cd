use axum::debug_handler;
use axum::extract::State;
use axum::Json;
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use super::{into_validation_result, require_non_blank};
use crate::affiliate::{generate_affiliate_links, AffiliateLink};
use crate::error::Error;
use crate::gateway_util::{AppState, AppStateData, StructuredJson};
use crate::suggestion::Suggestion;
use crate::usage::{EntitlementDecision, LimitReached};

/// The expected payload for `POST /suggest`.
///
/// Missing string fields deserialize as empty so that every problem is reported
/// in a single validation error.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestParams {
    #[serde(default)]
    pub mood: String,
    #[serde(default)]
    pub liquor: String,
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub watched_ad: bool,
}

impl SuggestParams {
    fn validate(&self) -> Result<(), Error> {
        let mut violations = Vec::new();
        require_non_blank(&mut violations, "mood", &self.mood, "Please select a mood");
        require_non_blank(
            &mut violations,
            "liquor",
            &self.liquor,
            "Please select a liquor type",
        );
        require_non_blank(&mut violations, "uid", &self.uid, "User ID is required");
        into_validation_result(violations)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestedCocktail {
    #[serde(flatten)]
    pub suggestion: Suggestion,
    pub affiliate_links: Vec<AffiliateLink>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitReachedResponse {
    pub limit_reached: bool,
    #[serde(flatten)]
    pub details: LimitReached,
}

/// Both outcomes are a 200; clients tell them apart by `limitReached`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SuggestResponse {
    Suggested(SuggestedCocktail),
    LimitReached(LimitReachedResponse),
}

/// A handler for the suggestion endpoint
#[debug_handler(state = AppStateData)]
#[instrument(
    name = "suggest",
    skip_all,
    fields(request_id = %Uuid::now_v7(), uid = tracing::field::Empty)
)]
pub async fn suggest_handler(
    State(AppStateData {
        http_client,
        usage_meter,
        suggestion_provider,
        ..
    }): AppState,
    StructuredJson(params): StructuredJson<SuggestParams>,
) -> Result<Json<SuggestResponse>, Error> {
    counter!("request_count", "endpoint" => "suggest").increment(1);
    params.validate()?;
    tracing::Span::current().record("uid", params.uid.as_str());

    let admission = match usage_meter.evaluate(&params.uid, params.watched_ad).await {
        EntitlementDecision::Allow(admission) => admission,
        EntitlementDecision::Deny(details) => {
            return Ok(Json(SuggestResponse::LimitReached(LimitReachedResponse {
                limit_reached: true,
                details,
            })));
        }
    };

    // On failure the admission is dropped here, which frees its reservation without charging
    let suggestion = suggestion_provider
        .suggest(&http_client, &params.mood, &params.liquor)
        .await?;
    let affiliate_links = generate_affiliate_links(&suggestion.ingredients);

    usage_meter.record_consumption(admission).await;

    Ok(Json(SuggestResponse::Suggested(SuggestedCocktail {
        suggestion,
        affiliate_links,
    })))
}
