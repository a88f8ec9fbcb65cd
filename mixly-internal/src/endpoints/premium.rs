use axum::debug_handler;
use axum::extract::State;
use axum::Json;
use chrono::SecondsFormat;
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::{into_validation_result, require_non_blank};
use crate::error::{Error, ErrorDetails};
use crate::gateway_util::{AppState, AppStateData, StructuredJson};

const PREMIUM_ACTIVATED_MESSAGE: &str =
    "Premium subscription activated! Enjoy unlimited cocktail suggestions.";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    /// Always succeeds, no money moves
    Mock,
    Stripe,
}

impl PaymentMethod {
    /// Confirms payment for one premium period.
    fn confirm(self) -> Result<bool, Error> {
        match self {
            PaymentMethod::Mock => Ok(true),
            PaymentMethod::Stripe => Err(Error::new(ErrorDetails::PaymentMethodUnsupported {
                payment_method: "Stripe".to_string(),
            })),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpgradePremiumParams {
    #[serde(default)]
    pub uid: String,
    pub payment_method: PaymentMethod,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpgradePremiumResponse {
    pub success: bool,
    pub message: String,
    pub premium_expiry: String,
}

#[debug_handler(state = AppStateData)]
#[instrument(name = "upgrade_premium", skip_all, fields(uid = tracing::field::Empty))]
pub async fn upgrade_premium_handler(
    State(AppStateData { usage_meter, .. }): AppState,
    StructuredJson(params): StructuredJson<UpgradePremiumParams>,
) -> Result<Json<UpgradePremiumResponse>, Error> {
    counter!("request_count", "endpoint" => "upgrade_premium").increment(1);
    let mut violations = Vec::new();
    require_non_blank(&mut violations, "uid", &params.uid, "User ID is required");
    into_validation_result(violations)?;
    tracing::Span::current().record("uid", params.uid.as_str());

    let payment_confirmed = params.payment_method.confirm()?;
    let grant = usage_meter
        .grant_premium(&params.uid, payment_confirmed)
        .await
        .map_err(|e| {
            if matches!(e.get_details(), ErrorDetails::PaymentNotCompleted { .. }) {
                e
            } else {
                // Already logged where it happened
                Error::new_without_logging(ErrorDetails::PremiumUpgradeFailed {
                    message: e.to_string(),
                })
            }
        })?;

    Ok(Json(UpgradePremiumResponse {
        success: true,
        message: PREMIUM_ACTIVATED_MESSAGE.to_string(),
        premium_expiry: grant
            .premium_expiry
            .to_rfc3339_opts(SecondsFormat::Millis, true),
    }))
}
