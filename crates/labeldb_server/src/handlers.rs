//! Route handlers.
//!
//! Thin adapters from REST verbs to the entity store and the change-feed
//! session. Write routes always answer with the negotiated write-result
//! shape; read routes answer with raw entity JSON.

use crate::context::AppContext;
use crate::error::{status_for_kind, ApiError};
use crate::response::{
    parse_client_version, respond_write_error, respond_writes, writes_from_diffs, writes_from_ids,
    ClientVersion,
};
use crate::{USER_HEADER, VERSION, VERSION_HEADER};
use actix_web::{web, HttpRequest, HttpResponse, ResponseError};
use labeldb_core::{Entity, EntityId, QueryFilter, StoreError, WriteOp};
use labeldb_query::{translate, Query};
use labeldb_stream::{ChangeFeedSession, ChangeStreamer, SessionConfig};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

/// Query parameters of read routes.
#[derive(Debug, Deserialize)]
pub(crate) struct ReadParams {
    query: Option<String>,
    labels: Option<String>,
}

/// Query parameters of write routes.
#[derive(Debug, Deserialize)]
pub(crate) struct WriteParams {
    query: Option<String>,
    #[serde(rename = "setOp")]
    set_op: Option<String>,
    #[serde(rename = "setId")]
    set_id: Option<String>,
    #[serde(rename = "setSize")]
    set_size: Option<u32>,
}

fn header<'r>(req: &'r HttpRequest, name: &str) -> Option<&'r str> {
    req.headers().get(name).and_then(|v| v.to_str().ok())
}

/// Resolves the client compatibility version from the version header,
/// falling back to the configured default, then the server's own version.
fn client_version(req: &HttpRequest, ctx: &AppContext) -> Result<ClientVersion, ApiError> {
    let raw = header(req, VERSION_HEADER)
        .map(str::to_string)
        .or_else(|| ctx.config.default_client_version.clone())
        .unwrap_or_else(|| VERSION.to_string());
    parse_client_version(&raw)
        .ok_or_else(|| ApiError::invalid_param(format!("invalid client version '{raw}'")))
}

fn write_op(
    req: &HttpRequest,
    params: &WriteParams,
    entity_type: &str,
    entity_id: Option<EntityId>,
) -> WriteOp {
    let user = header(req, USER_HEADER).unwrap_or_default();
    let mut wo = WriteOp::new(user, entity_type).with_set(
        params.set_op.clone(),
        params.set_id.clone(),
        params.set_size,
    );
    wo.entity_id = entity_id;
    wo
}

fn parse_entity_id(raw: &str) -> Result<EntityId, ApiError> {
    EntityId::from_hex(raw)
        .ok_or_else(|| ApiError::invalid_param(format!("id {raw} is not a valid entity id")))
}

/// Translates the mandatory `query` parameter of bulk routes.
fn required_query(raw: Option<&str>) -> Result<Query, ApiError> {
    match raw {
        None | Some("") => Err(ApiError::invalid_query("query string is empty")),
        Some(selector) => Ok(translate(selector)?),
    }
}

fn filter_from(labels: Option<&str>) -> QueryFilter {
    QueryFilter {
        return_labels: labels
            .map(|csv| csv.split(',').map(str::to_string).collect())
            .unwrap_or_default(),
    }
}

/// Counts a write route's outcome against the API metrics.
fn track_outcome(ctx: &AppContext, error: Option<&StoreError>) {
    if let Some(err) = error {
        let status = status_for_kind(err.kind());
        if status.is_server_error() {
            ctx.metrics.record_server_error();
        } else if status.is_client_error() {
            ctx.metrics.record_client_error();
        }
    }
}

fn not_found() -> HttpResponse {
    HttpResponse::NotFound().json(Value::Null)
}

// ---------------------------------------------------------------------------
// Query
// ---------------------------------------------------------------------------

/// `GET /entities/{type}` — bulk read by selector.
pub(crate) async fn get_entities(
    path: web::Path<String>,
    params: web::Query<ReadParams>,
    ctx: web::Data<AppContext>,
) -> Result<HttpResponse, ApiError> {
    ctx.metrics.record_read();
    let entity_type = path.into_inner();
    let query = required_query(params.query.as_deref()).inspect_err(|_| {
        ctx.metrics.record_client_error();
    })?;
    let filter = filter_from(params.labels.as_deref());
    let entities = ctx
        .store
        .read_entities(&entity_type, &query, &filter)
        .map_err(|err| {
            track_outcome(&ctx, Some(&err));
            ApiError::from(err)
        })?;
    Ok(HttpResponse::Ok().json(entities))
}

/// `POST /query/{type}` — reserved for selectors too long for a URL.
pub(crate) async fn long_query(_path: web::Path<String>) -> HttpResponse {
    HttpResponse::NotImplemented().finish()
}

// ---------------------------------------------------------------------------
// Bulk
// ---------------------------------------------------------------------------

/// `POST /entities/{type}` — bulk create.
pub(crate) async fn post_entities(
    req: HttpRequest,
    path: web::Path<String>,
    params: web::Query<WriteParams>,
    body: web::Json<Vec<Entity>>,
    ctx: web::Data<AppContext>,
) -> HttpResponse {
    ctx.metrics.record_write();
    let version = match client_version(&req, &ctx) {
        Ok(version) => version,
        Err(err) => {
            ctx.metrics.record_client_error();
            return err.error_response();
        }
    };
    let wo = write_op(&req, &params, &path, None);
    let bulk = ctx.store.create_entities(&wo, body.into_inner());
    track_outcome(&ctx, bulk.error.as_ref());
    let writes = writes_from_ids(&ctx, &bulk.writes);
    respond_writes(version, writes, bulk.error, true, false)
}

/// `PUT /entities/{type}?query=…` — bulk patch.
pub(crate) async fn put_entities(
    req: HttpRequest,
    path: web::Path<String>,
    params: web::Query<WriteParams>,
    body: web::Json<Entity>,
    ctx: web::Data<AppContext>,
) -> HttpResponse {
    ctx.metrics.record_write();
    let version = match client_version(&req, &ctx) {
        Ok(version) => version,
        Err(err) => {
            ctx.metrics.record_client_error();
            return err.error_response();
        }
    };
    let query = match required_query(params.query.as_deref()) {
        Ok(query) => query,
        Err(err) => {
            ctx.metrics.record_client_error();
            return respond_write_error(version, &err, false);
        }
    };
    let wo = write_op(&req, &params, &path, None);
    let bulk = ctx.store.update_entities(&wo, &query, &body);
    track_outcome(&ctx, bulk.error.as_ref());
    let writes = writes_from_diffs(&ctx, bulk.writes);
    respond_writes(version, writes, bulk.error, false, false)
}

/// `DELETE /entities/{type}?query=…` — bulk delete.
pub(crate) async fn delete_entities(
    req: HttpRequest,
    path: web::Path<String>,
    params: web::Query<WriteParams>,
    ctx: web::Data<AppContext>,
) -> HttpResponse {
    ctx.metrics.record_write();
    let version = match client_version(&req, &ctx) {
        Ok(version) => version,
        Err(err) => {
            ctx.metrics.record_client_error();
            return err.error_response();
        }
    };
    let query = match required_query(params.query.as_deref()) {
        Ok(query) => query,
        Err(err) => {
            ctx.metrics.record_client_error();
            return respond_write_error(version, &err, false);
        }
    };
    let wo = write_op(&req, &params, &path, None);
    let bulk = ctx.store.delete_entities(&wo, &query);
    track_outcome(&ctx, bulk.error.as_ref());
    let writes = writes_from_diffs(&ctx, bulk.writes);
    respond_writes(version, writes, bulk.error, false, false)
}

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// `POST /entity/{type}` — single create.
pub(crate) async fn post_entity(
    req: HttpRequest,
    path: web::Path<String>,
    params: web::Query<WriteParams>,
    body: web::Json<Entity>,
    ctx: web::Data<AppContext>,
) -> HttpResponse {
    ctx.metrics.record_write();
    let version = match client_version(&req, &ctx) {
        Ok(version) => version,
        Err(err) => {
            ctx.metrics.record_client_error();
            return err.error_response();
        }
    };
    let wo = write_op(&req, &params, &path, None);
    let bulk = ctx.store.create_entities(&wo, vec![body.into_inner()]);
    track_outcome(&ctx, bulk.error.as_ref());
    let writes = writes_from_ids(&ctx, &bulk.writes);
    respond_writes(version, writes, bulk.error, true, true)
}

/// `GET /entity/{type}/{id}` — single read.
pub(crate) async fn get_entity(
    path: web::Path<(String, String)>,
    params: web::Query<ReadParams>,
    ctx: web::Data<AppContext>,
) -> Result<HttpResponse, ApiError> {
    ctx.metrics.record_read();
    let (entity_type, raw_id) = path.into_inner();
    let id = parse_entity_id(&raw_id).inspect_err(|_| ctx.metrics.record_client_error())?;
    let filter = filter_from(params.labels.as_deref());
    let entities = ctx
        .store
        .read_entities(&entity_type, &Query::id_equal(id.to_hex()), &filter)
        .map_err(|err| {
            track_outcome(&ctx, Some(&err));
            ApiError::from(err)
        })?;
    match entities.into_iter().next() {
        Some(entity) => Ok(HttpResponse::Ok().json(entity)),
        None => Ok(not_found()),
    }
}

/// `PUT /entity/{type}/{id}` — single patch.
pub(crate) async fn put_entity(
    req: HttpRequest,
    path: web::Path<(String, String)>,
    params: web::Query<WriteParams>,
    body: web::Json<Entity>,
    ctx: web::Data<AppContext>,
) -> HttpResponse {
    ctx.metrics.record_write();
    let version = match client_version(&req, &ctx) {
        Ok(version) => version,
        Err(err) => {
            ctx.metrics.record_client_error();
            return err.error_response();
        }
    };
    let (entity_type, raw_id) = path.into_inner();
    let id = match parse_entity_id(&raw_id) {
        Ok(id) => id,
        Err(err) => {
            ctx.metrics.record_client_error();
            return respond_write_error(version, &err, true);
        }
    };
    let wo = write_op(&req, &params, &entity_type, Some(id));
    let bulk = ctx
        .store
        .update_entities(&wo, &Query::id_equal(id.to_hex()), &body);
    if bulk.error.is_none() && bulk.writes.is_empty() {
        return not_found();
    }
    track_outcome(&ctx, bulk.error.as_ref());
    let writes = writes_from_diffs(&ctx, bulk.writes);
    respond_writes(version, writes, bulk.error, false, true)
}

/// `DELETE /entity/{type}/{id}` — single delete.
pub(crate) async fn delete_entity(
    req: HttpRequest,
    path: web::Path<(String, String)>,
    params: web::Query<WriteParams>,
    ctx: web::Data<AppContext>,
) -> HttpResponse {
    ctx.metrics.record_write();
    let version = match client_version(&req, &ctx) {
        Ok(version) => version,
        Err(err) => {
            ctx.metrics.record_client_error();
            return err.error_response();
        }
    };
    let (entity_type, raw_id) = path.into_inner();
    let id = match parse_entity_id(&raw_id) {
        Ok(id) => id,
        Err(err) => {
            ctx.metrics.record_client_error();
            return respond_write_error(version, &err, true);
        }
    };
    let wo = write_op(&req, &params, &entity_type, Some(id));
    let bulk = ctx.store.delete_entities(&wo, &Query::id_equal(id.to_hex()));
    if bulk.error.is_none() && bulk.writes.is_empty() {
        return not_found();
    }
    track_outcome(&ctx, bulk.error.as_ref());
    let writes = writes_from_diffs(&ctx, bulk.writes);
    respond_writes(version, writes, bulk.error, false, true)
}

/// `GET /entity/{type}/{id}/labels` — non-reserved label names.
pub(crate) async fn entity_labels(
    path: web::Path<(String, String)>,
    ctx: web::Data<AppContext>,
) -> Result<HttpResponse, ApiError> {
    ctx.metrics.record_read();
    let (entity_type, raw_id) = path.into_inner();
    let id = parse_entity_id(&raw_id).inspect_err(|_| ctx.metrics.record_client_error())?;
    let entities = ctx
        .store
        .read_entities(
            &entity_type,
            &Query::id_equal(id.to_hex()),
            &QueryFilter::default(),
        )
        .map_err(|err| {
            track_outcome(&ctx, Some(&err));
            ApiError::from(err)
        })?;
    match entities.first() {
        Some(entity) => Ok(HttpResponse::Ok().json(entity.label_names())),
        None => Ok(not_found()),
    }
}

/// `DELETE /entity/{type}/{id}/labels/{label}` — remove one label.
pub(crate) async fn delete_label(
    req: HttpRequest,
    path: web::Path<(String, String, String)>,
    params: web::Query<WriteParams>,
    ctx: web::Data<AppContext>,
) -> HttpResponse {
    ctx.metrics.record_write();
    let version = match client_version(&req, &ctx) {
        Ok(version) => version,
        Err(err) => {
            ctx.metrics.record_client_error();
            return err.error_response();
        }
    };
    let (entity_type, raw_id, label) = path.into_inner();
    let id = match parse_entity_id(&raw_id) {
        Ok(id) => id,
        Err(err) => {
            ctx.metrics.record_client_error();
            return respond_write_error(version, &err, true);
        }
    };
    let wo = write_op(&req, &params, &entity_type, Some(id));
    match ctx.store.delete_label(&wo, &label) {
        Ok(diff) => {
            let writes = writes_from_diffs(&ctx, vec![diff]);
            respond_writes(version, writes, None, false, true)
        }
        Err(StoreError::NotFound) => not_found(),
        Err(err) => {
            track_outcome(&ctx, Some(&err));
            respond_write_error(version, &ApiError::from(err), true)
        }
    }
}

// ---------------------------------------------------------------------------
// Introspection
// ---------------------------------------------------------------------------

/// `GET /metrics` — API and store counters.
pub(crate) async fn metrics(ctx: web::Data<AppContext>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "api": ctx.metrics.report(),
        "store": ctx.store.stats().snapshot(),
    }))
}

/// `GET /status` — liveness and version.
pub(crate) async fn status() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "ok": true,
        "version": VERSION,
    }))
}

// ---------------------------------------------------------------------------
// Change feed
// ---------------------------------------------------------------------------

/// `GET /changes` — upgrade to the websocket change feed.
pub(crate) async fn changes(
    req: HttpRequest,
    stream: web::Payload,
    ctx: web::Data<AppContext>,
) -> Result<HttpResponse, actix_web::Error> {
    if !ctx.config.cdc_enabled {
        ctx.metrics.record_client_error();
        return Err(ApiError::CdcDisabled.into());
    }

    let (response, transport, frames) = actix_ws::handle(&req, stream)?;

    let streamer =
        ChangeStreamer::with_buffer(Arc::clone(ctx.store.cdc()), ctx.config.client_buffer);
    let session = ChangeFeedSession::new(
        EntityId::new().to_hex(),
        transport,
        streamer,
        SessionConfig {
            write_timeout: ctx.config.write_timeout,
        },
    );
    info!(session = session.id(), "change feed client connected");

    ctx.metrics.cdc_client_connected();
    let metrics = Arc::clone(&ctx.metrics);
    let session_id = session.id().to_string();
    actix_web::rt::spawn(async move {
        session.run(frames).await;
        metrics.cdc_client_disconnected();
        info!(session = session_id, "change feed client disconnected");
    });

    Ok(response)
}
