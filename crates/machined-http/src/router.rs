//! Router construction from the operation table.
//!
//! Route matching is the operation table's, not axum's: every request lands
//! in one handler that asks [`OperationTable::resolve_route`], so a path
//! such as `/machine/ls` reaches `PUT /machine/{name}` exactly as it would
//! for any other name.
//!
//! [`OperationTable::resolve_route`]: machined::OperationTable::resolve_route

use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::{RawQuery, State};
use axum::http::header::{ALLOW, CONTENT_TYPE};
use axum::http::{HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use machined::{FormParams, NamedParams, RequestContext, Service, Verb};
use percent_encoding::percent_decode_str;
use tracing::{debug, error};

/// Build a router serving every operation in the service's table.
///
/// A path no operation serves gets 404. A path some operation serves, asked
/// with a verb none of them accepts, gets 405 with an `Allow` header.
pub fn router(service: Arc<Service>) -> Router {
    Router::new().fallback(respond).with_state(service)
}

async fn respond(
    State(service): State<Arc<Service>>,
    method: Method,
    uri: Uri,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Response {
    let path = uri.path();
    let table = service.table();

    let resolved = method
        .as_str()
        .parse::<Verb>()
        .ok()
        .and_then(|verb| table.resolve_route(verb, path));
    let Some((operation, named)) = resolved else {
        return unmatched(&table.allowed_verbs(path));
    };

    let form = match parse_form(query.as_deref(), &body) {
        Ok(form) => form,
        Err(reason) => {
            error!(operation = %operation.name(), %reason, "rejecting malformed form");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let ctx = RequestContext::new(decode_named(named), form);
    match service.dispatcher().dispatch(operation.handler(), &ctx).await {
        Ok(json) => {
            debug!(operation = %operation.name(), bytes = json.len(), "request served");
            ([(CONTENT_TYPE, "application/json")], json).into_response()
        }
        Err(e) => {
            error!(operation = %operation.name(), error = %e, "request failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn unmatched(allowed: &[Verb]) -> Response {
    if allowed.is_empty() {
        return StatusCode::NOT_FOUND.into_response();
    }
    let allow = allowed
        .iter()
        .map(Verb::as_str)
        .collect::<Vec<_>>()
        .join(",");
    match HeaderValue::from_str(&allow) {
        Ok(allow) => (StatusCode::METHOD_NOT_ALLOWED, [(ALLOW, allow)]).into_response(),
        Err(_) => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    }
}

/// Path captures arrive percent-encoded.
fn decode_named(named: NamedParams) -> NamedParams {
    named
        .into_iter()
        .map(|(key, value)| {
            let decoded = percent_decode_str(&value).decode_utf8_lossy().into_owned();
            (key, decoded)
        })
        .collect()
}

/// Merge the query string and a form-encoded body, query values first.
fn parse_form(query: Option<&str>, body: &[u8]) -> Result<FormParams, &'static str> {
    let body = std::str::from_utf8(body).map_err(|_| "body is not valid UTF-8")?;
    let pairs = url::form_urlencoded::parse(query.unwrap_or_default().as_bytes())
        .chain(url::form_urlencoded::parse(body.as_bytes()));
    Ok(pairs.collect())
}
