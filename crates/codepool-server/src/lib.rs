//! # Codepool Server
//!
//! JSON-over-HTTP transport for the codepool ledger.
//!
//! | Method | Path                              | Operation              |
//! |--------|-----------------------------------|------------------------|
//! | PUT    | `/{pool}`                         | create pool            |
//! | PUT    | `/{pool}/import/{request_id}`     | CSV import             |
//! | PUT    | `/{pool}/redeem/{request_id}`     | redeem a code          |
//! | GET    | `/{pool}/audit_query`             | audit log lookup       |
//! | GET    | `/{pool}/unique_code_counts`      | counts by flavour/used |
//!
//! Every response body is a JSON object carrying `request_id` (or `null`).

use std::collections::BTreeMap;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, put};
use axum::{Json, Router};
use serde::Serialize;
use tracing::{debug, info};

use codepool::store::Store;
use codepool::{AuditField, AuditParams, CodeCount, CodePools, PoolName};

pub mod audit_view;
pub mod config;
pub mod csv_import;
pub mod error;
pub mod params;

pub use audit_view::AuditRecord;
pub use config::ServerArgs;
pub use error::ApiError;

/// Largest accepted request body (CSV imports).
pub const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

type ApiResult<T> = Result<(StatusCode, Json<T>), ApiError>;

/// Build the service router over `pools`.
pub fn router<S: Store + 'static>(pools: CodePools<S>) -> Router {
    Router::new()
        .route("/:pool", put(create_pool::<S>))
        .route("/:pool/import/:request_id", put(import_codes::<S>))
        .route("/:pool/redeem/:request_id", put(redeem::<S>))
        .route("/:pool/audit_query", get(audit_query::<S>))
        .route("/:pool/unique_code_counts", get(unique_code_counts::<S>))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(pools)
}

fn pool_name(raw: String, request_id: Option<&str>) -> Result<PoolName, ApiError> {
    PoolName::new(raw).map_err(|e| ApiError::bad_request(e.to_string()).with_request_id(request_id))
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct CreatedResponse {
    request_id: Option<String>,
    created: bool,
}

async fn create_pool<S: Store + 'static>(
    State(pools): State<CodePools<S>>,
    Path(pool): Path<String>,
) -> ApiResult<CreatedResponse> {
    let pool = pool_name(pool, None)?;
    let created = pools
        .create_pool(&pool)
        .await
        .map_err(|e| ApiError::from_ledger(e, None))?;

    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(CreatedResponse {
            request_id: None,
            created,
        }),
    ))
}

#[derive(Serialize)]
struct ImportedResponse {
    request_id: String,
    imported: bool,
}

async fn import_codes<S: Store + 'static>(
    State(pools): State<CodePools<S>>,
    Path((pool, request_id)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<ImportedResponse> {
    let rid = Some(request_id.as_str());
    let pool = pool_name(pool, rid)?;

    let header = headers
        .get("content-md5")
        .map(|v| v.to_str().unwrap_or_default());
    let fingerprint =
        csv_import::verify_content_md5(header, &body).map_err(|e| e.with_request_id(rid))?;
    let rows = csv_import::parse_rows(&body).map_err(|e| e.with_request_id(rid))?;

    let outcome = pools
        .import_codes(&pool, &request_id, &fingerprint, rows)
        .await
        .map_err(|e| ApiError::from_ledger(e, rid))?;
    info!(%pool, %request_id, ?outcome, "import request handled");

    Ok((
        StatusCode::CREATED,
        Json(ImportedResponse {
            request_id,
            imported: true,
        }),
    ))
}

#[derive(Serialize)]
struct RedeemResponse {
    request_id: String,
    unique_code: String,
    flavour: String,
}

async fn redeem<S: Store + 'static>(
    State(pools): State<CodePools<S>>,
    Path((pool, request_id)): Path<(String, String)>,
    body: Bytes,
) -> ApiResult<RedeemResponse> {
    let rid = Some(request_id.as_str());
    let pool = pool_name(pool, rid)?;

    let mut fields = params::json_string_fields(&body, &["transaction_id", "user_id", "unique_code"])
        .map_err(|e| e.with_request_id(rid))?;
    let mut take = |name: &str| fields.remove(name).unwrap_or_default();
    let audit = AuditParams::new(request_id.as_str(), take("transaction_id"), take("user_id"));
    let candidate = take("unique_code");

    let code = pools
        .redeem(&pool, &candidate, &audit)
        .await
        .map_err(|e| ApiError::from_ledger(e, rid))?;
    debug!(%pool, %request_id, id = code.id, "redeem request handled");

    Ok((
        StatusCode::OK,
        Json(RedeemResponse {
            request_id,
            unique_code: code.unique_code,
            flavour: code.flavour,
        }),
    ))
}

#[derive(Serialize)]
struct AuditQueryResponse {
    request_id: Option<String>,
    results: Vec<AuditRecord>,
}

async fn audit_query<S: Store + 'static>(
    State(pools): State<CodePools<S>>,
    Path(pool): Path<String>,
    Query(query): Query<BTreeMap<String, String>>,
) -> ApiResult<AuditQueryResponse> {
    let rid = query.get("request_id").map(String::as_str);
    let pool = pool_name(pool, rid)?;
    params::query_fields(&query, &["field", "value"], &["request_id"])
        .map_err(|e| e.with_request_id(rid))?;

    let field: AuditField = query
        .get("field")
        .map(String::as_str)
        .unwrap_or_default()
        .parse()
        .map_err(|_| ApiError::bad_request("Invalid audit field.").with_request_id(rid))?;
    let value = query.get("value").map(String::as_str).unwrap_or_default();

    let results = pools
        .query_audit(&pool, field, value)
        .await
        .map_err(|e| ApiError::from_ledger(e, rid))?
        .into_iter()
        .map(AuditRecord::from_entry)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| e.with_request_id(rid))?;

    Ok((
        StatusCode::OK,
        Json(AuditQueryResponse {
            request_id: rid.map(String::from),
            results,
        }),
    ))
}

#[derive(Serialize)]
struct CountsResponse {
    request_id: Option<String>,
    unique_code_counts: Vec<CodeCount>,
}

async fn unique_code_counts<S: Store + 'static>(
    State(pools): State<CodePools<S>>,
    Path(pool): Path<String>,
    Query(query): Query<BTreeMap<String, String>>,
) -> ApiResult<CountsResponse> {
    let rid = query.get("request_id").map(String::as_str);
    let pool = pool_name(pool, rid)?;
    params::query_fields(&query, &[], &["request_id"]).map_err(|e| e.with_request_id(rid))?;

    let counts = pools
        .count_codes(&pool)
        .await
        .map_err(|e| ApiError::from_ledger(e, rid))?;

    Ok((
        StatusCode::OK,
        Json(CountsResponse {
            request_id: rid.map(String::from),
            unique_code_counts: counts,
        }),
    ))
}
