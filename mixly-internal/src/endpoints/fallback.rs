use axum::extract::OriginalUri;
use axum::http::Method;

use crate::error::{Error, ErrorDetails};

pub async fn handle_404(method: Method, OriginalUri(uri): OriginalUri) -> Error {
    Error::new(ErrorDetails::RouteNotFound {
        path: uri.path().to_string(),
        method: method.to_string(),
    })
}
