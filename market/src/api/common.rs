//! Shared plumbing for route handlers: error-to-reply conversion and request extraction.
//!
//! Authentication and scope enforcement are an external collaborator (see module docs on
//! `api`): these handlers trust `tenant_id`/`owner_id` query parameters rather than decoding a
//! bearer token, and perform no scope checks. A real deployment sits an auth layer in front of
//! this one.

use model::error::{CoreError, ErrorKind};
use model::ids::{MarketId, OwnerId, TenantId};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use warp::{
    hyper::StatusCode,
    reply::{json, with_status, Json, WithStatus},
    Filter, Rejection, Reply,
};

const MAX_JSON_BODY_PAYLOAD: u64 = 1024 * 16;

pub fn extract_payload<T: DeserializeOwned + Send + 'static>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone {
    warp::body::content_length_limit(MAX_JSON_BODY_PAYLOAD)
        .and(warp::body::json().or(warp::body::form()).unify())
}

#[derive(Debug, Deserialize)]
pub struct Caller {
    pub tenant_id: TenantId,
    pub owner_id: OwnerId,
}

pub fn caller() -> impl Filter<Extract = (Caller,), Error = Rejection> + Clone {
    warp::query::<Caller>()
}

#[derive(Debug, Deserialize)]
pub struct TenantOnly {
    pub tenant_id: TenantId,
}

pub fn tenant() -> impl Filter<Extract = (TenantOnly,), Error = Rejection> + Clone {
    warp::query::<TenantOnly>()
}

pub async fn resolve_market(
    exchange: &crate::exchange::Exchange,
    tenant_id: TenantId,
    name: &str,
) -> Result<MarketId, CoreError> {
    let markets = exchange.list_markets(tenant_id).await?;
    markets
        .into_iter()
        .find(|market| market.name == name)
        .map(|market| market.market_id)
        .ok_or_else(|| CoreError::not_found(format!("market '{}' not found", name)))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody<'a> {
    error_type: &'a str,
    description: &'a str,
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Insufficient => StatusCode::CONFLICT,
        ErrorKind::Forbidden => StatusCode::CONFLICT,
        ErrorKind::Storage => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn core_error_reply(err: CoreError) -> WithStatus<Json> {
    let status = status_for(err.kind);
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!(?err, "internal error");
    }
    let description = if status == StatusCode::INTERNAL_SERVER_ERROR {
        "internal error".to_string()
    } else {
        err.message.clone()
    };
    let error_type = format!("{:?}", err.kind);
    with_status(
        json(&ErrorBody {
            error_type: &error_type,
            description: &description,
        }),
        status,
    )
}

pub fn ok_json<T: Serialize>(value: &T) -> WithStatus<Json> {
    with_status(json(value), StatusCode::OK)
}
