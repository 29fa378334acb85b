//! Write-result envelope and client-version negotiation.
//!
//! Writes succeed, fail, or land in between; the envelope reports all three
//! shapes uniformly. Version `0.8` clients predate the envelope and receive
//! a bare `Write` (single-entity routes) or `[Write]` instead; the shape is
//! selected by a thin post-processor here, never inside the store.

use crate::context::AppContext;
use crate::error::{write_result_error, ApiError};
use crate::API_ROOT;
use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use labeldb_core::{Entity, EntityId, StoreError};
use serde::{Deserialize, Serialize};

/// One write's outcome.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Write {
    /// Entity id, as 24-char hex.
    #[serde(rename = "Id")]
    pub id: String,
    /// Canonical URI of the entity.
    #[serde(rename = "URI", default, skip_serializing_if = "String::is_empty")]
    pub uri: String,
    /// Pre-image diff, for updates and deletes.
    #[serde(rename = "Diff", default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<Entity>,
    /// Per-item error, for partially failed batches.
    #[serde(rename = "Error", default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The envelope returned by every write route (for non-0.8 clients).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WriteResult {
    /// Per-write outcomes.
    #[serde(rename = "Writes", default)]
    pub writes: Vec<Write>,
    /// Top-level error; not mutually exclusive with `writes`.
    #[serde(rename = "Error", default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

/// Wire shape of an API error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable message.
    #[serde(rename = "Message")]
    pub message: String,
    /// Stable error kind.
    #[serde(rename = "Type")]
    pub kind: String,
    /// HTTP status the error maps to.
    #[serde(rename = "HTTPStatus")]
    pub http_status: u16,
    /// The entity the error is about, if any.
    #[serde(rename = "EntityId", default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
}

/// A client compatibility version, `major.minor`.
pub(crate) type ClientVersion = (u32, u32);

/// The last version expecting bare writes instead of the envelope.
const BARE_WRITES_VERSION: ClientVersion = (0, 8);

/// Parses a version string like `v0.9.0-alpha` down to `(0, 9)`.
pub(crate) fn parse_client_version(raw: &str) -> Option<ClientVersion> {
    let raw = raw.strip_prefix('v').unwrap_or(raw);
    let mut parts = raw.split('.');
    let major = parts.next()?.parse::<u32>().ok()?;
    let minor_digits: String = parts
        .next()?
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    if minor_digits.is_empty() {
        return None;
    }
    Some((major, minor_digits.parse().ok()?))
}

/// Builds the canonical URI for an entity.
pub(crate) fn entity_uri(ctx: &AppContext, id: &str) -> String {
    format!("{}{}/entity/{}", ctx.config.addr, API_ROOT, id)
}

/// Maps created ids to writes.
pub(crate) fn writes_from_ids(ctx: &AppContext, ids: &[EntityId]) -> Vec<Write> {
    ids.iter()
        .map(|id| {
            let id = id.to_hex();
            Write {
                uri: entity_uri(ctx, &id),
                id,
                ..Write::default()
            }
        })
        .collect()
}

/// Maps update/delete diffs to writes.
pub(crate) fn writes_from_diffs(ctx: &AppContext, diffs: Vec<Entity>) -> Vec<Write> {
    diffs
        .into_iter()
        .map(|diff| {
            let id = diff.id().map(|id| id.to_hex()).unwrap_or_default();
            Write {
                uri: entity_uri(ctx, &id),
                id,
                diff: Some(diff),
                error: None,
            }
        })
        .collect()
}

/// Renders a write route's response for the negotiated client version.
///
/// `created` selects 201 on full success; `single` routes return a bare
/// `Write` instead of a list to 0.8 clients.
pub(crate) fn respond_writes(
    version: ClientVersion,
    mut writes: Vec<Write>,
    error: Option<StoreError>,
    created: bool,
    single: bool,
) -> HttpResponse {
    let error = error.map(ApiError::from);
    let status = match &error {
        Some(err) => err.http_status(),
        None if created => StatusCode::CREATED,
        None => StatusCode::OK,
    };

    if version == BARE_WRITES_VERSION {
        if let Some(err) = &error {
            writes.push(Write {
                id: err.body().entity_id.unwrap_or_default(),
                error: Some(err.to_string()),
                ..Write::default()
            });
        }
        if single {
            let first = writes.into_iter().next().unwrap_or_default();
            return HttpResponse::build(status).json(first);
        }
        return HttpResponse::build(status).json(writes);
    }

    let result = WriteResult {
        writes,
        error: error.as_ref().map(ApiError::body),
    };
    HttpResponse::build(status).json(result)
}

/// Renders a write route's failure before any store call was made.
pub(crate) fn respond_write_error(version: ClientVersion, err: &ApiError, single: bool) -> HttpResponse {
    let status = err.http_status();
    if version == BARE_WRITES_VERSION {
        let write = Write {
            id: err.body().entity_id.unwrap_or_default(),
            error: Some(err.to_string()),
            ..Write::default()
        };
        if single {
            return HttpResponse::build(status).json(write);
        }
        return HttpResponse::build(status).json(vec![write]);
    }
    HttpResponse::build(status).json(write_result_error(err))
}
