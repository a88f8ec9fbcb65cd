use std::str::FromStr;

use axum::extract::{OriginalUri, Path, Query};
use axum::http::Method;
use axum::Json;
use serde::{Deserialize, Serialize};
use strum::EnumString;

use crate::error::{Error, ErrorDetails};

/// Ride-share apps a user can open to get home after a drink.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum RideProvider {
    Uber,
    Lyft,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RideDeepLink {
    pub deep_link: &'static str,
    pub web_link: &'static str,
    pub app_store: &'static str,
    pub play_store: &'static str,
    pub fallback: bool,
}

impl RideProvider {
    pub fn links(self, fallback: bool) -> RideDeepLink {
        match self {
            RideProvider::Uber => RideDeepLink {
                deep_link: "uber://",
                web_link: "https://m.uber.com/ul/",
                app_store: "https://apps.apple.com/app/uber/id368677368",
                play_store: "https://play.google.com/store/apps/details?id=com.ubercab",
                fallback,
            },
            RideProvider::Lyft => RideDeepLink {
                deep_link: "lyft://",
                web_link: "https://www.lyft.com/app",
                app_store: "https://apps.apple.com/app/lyft/id529379082",
                play_store: "https://play.google.com/store/apps/details?id=me.lyft.android",
                fallback,
            },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct DeepLinkParams {
    pub fallback: Option<String>,
}

/// Only the literal `true` turns the fallback flag on.
pub async fn deeplink_handler(
    method: Method,
    OriginalUri(uri): OriginalUri,
    Path(provider): Path<String>,
    Query(params): Query<DeepLinkParams>,
) -> Result<Json<RideDeepLink>, Error> {
    let provider = RideProvider::from_str(&provider).map_err(|_| {
        Error::new(ErrorDetails::RouteNotFound {
            path: uri.path().to_string(),
            method: method.to_string(),
        })
    })?;
    let fallback = params.fallback.as_deref() == Some("true");
    Ok(Json(provider.links(fallback)))
}
