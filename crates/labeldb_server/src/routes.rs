//! Route registration.

use crate::context::AppContext;
use crate::error::ApiError;
use crate::handlers;
use crate::API_ROOT;
use actix_web::web;
use labeldb_core::StoreError;

/// Wires the API routes and shared state into an actix application.
///
/// ```ignore
/// HttpServer::new(move || App::new().configure(configure(ctx.clone())))
/// ```
pub fn configure(ctx: AppContext) -> impl Fn(&mut web::ServiceConfig) + Clone {
    move |cfg| {
        cfg.app_data(web::Data::new(ctx.clone()))
            .app_data(web::JsonConfig::default().error_handler(|err, _req| {
                ApiError::from(StoreError::validation(err.to_string())).into()
            }))
            .service(
                web::scope(API_ROOT)
                    // Query
                    .route("/entities/{type}", web::get().to(handlers::get_entities))
                    .route("/query/{type}", web::post().to(handlers::long_query))
                    // Bulk
                    .route("/entities/{type}", web::post().to(handlers::post_entities))
                    .route("/entities/{type}", web::put().to(handlers::put_entities))
                    .route("/entities/{type}", web::delete().to(handlers::delete_entities))
                    // Entity
                    .route("/entity/{type}", web::post().to(handlers::post_entity))
                    .route("/entity/{type}/{id}", web::get().to(handlers::get_entity))
                    .route("/entity/{type}/{id}", web::put().to(handlers::put_entity))
                    .route(
                        "/entity/{type}/{id}",
                        web::delete().to(handlers::delete_entity),
                    )
                    .route(
                        "/entity/{type}/{id}/labels",
                        web::get().to(handlers::entity_labels),
                    )
                    .route(
                        "/entity/{type}/{id}/labels/{label}",
                        web::delete().to(handlers::delete_label),
                    )
                    // Introspection
                    .route("/metrics", web::get().to(handlers::metrics))
                    .route("/status", web::get().to(handlers::status))
                    // Change feed
                    .route("/changes", web::get().to(handlers::changes)),
            );
    }
}
