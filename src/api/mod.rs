//! API endpoints for the threat detection service.
//!
//! This module exposes the engine over HTTP: request evaluation, manual
//! block management, statistics, configuration updates, and state
//! export/reset. The surrounding middleware that enforces `should_block`
//! on live traffic is out of scope; the `/detect` endpoint is the same
//! contract offered to it.

use actix_web::{web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::core::{Engine, RequestInfo};
use crate::models::EngineConfigPatch;

pub struct ApiState {
    pub engine: Arc<Engine>,
}

/// API configuration function for Actix-web
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(web::resource("/health").route(web::get().to(health_check)))
            .service(web::resource("/detect").route(web::post().to(detect)))
            .service(
                web::resource("/blocklist")
                    .route(web::get().to(list_blocked))
                    .route(web::post().to(block_ip)),
            )
            .service(web::resource("/blocklist/{ip}").route(web::delete().to(unblock_ip)))
            .service(web::resource("/statistics").route(web::get().to(statistics)))
            .service(web::resource("/config").route(web::patch().to(update_config)))
            .service(web::resource("/export").route(web::get().to(export_state)))
            .service(web::resource("/clear").route(web::post().to(clear_state))),
    );
}

/// Health check endpoint response
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

/// Manual block request
#[derive(Debug, Serialize, Deserialize)]
pub struct BlockRequest {
    pub ip: String,
    pub reason: String,
    pub duration_minutes: i64,
}

#[derive(Serialize)]
struct MessageResponse {
    message: String,
}

/// Health check endpoint
async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Evaluate one request and return the detection outcome
async fn detect(state: web::Data<ApiState>, req: web::Json<RequestInfo>) -> impl Responder {
    let result = state.engine.detect(&req).await;
    HttpResponse::Ok().json(result)
}

/// List active blocks
async fn list_blocked(state: web::Data<ApiState>) -> impl Responder {
    HttpResponse::Ok().json(state.engine.list_blocked_ips().await)
}

/// Manually block an IP
async fn block_ip(state: web::Data<ApiState>, req: web::Json<BlockRequest>) -> impl Responder {
    if req.duration_minutes < 0 {
        return HttpResponse::BadRequest().json(MessageResponse {
            message: "duration_minutes must not be negative".to_string(),
        });
    }
    state
        .engine
        .block_ip(&req.ip, &req.reason, req.duration_minutes)
        .await;
    HttpResponse::Ok().json(MessageResponse {
        message: format!("{} blocked for {} minutes", req.ip, req.duration_minutes),
    })
}

/// Remove a block
async fn unblock_ip(state: web::Data<ApiState>, path: web::Path<String>) -> impl Responder {
    let ip = path.into_inner();
    if state.engine.unblock_ip(&ip).await {
        HttpResponse::Ok().json(MessageResponse {
            message: format!("{} unblocked", ip),
        })
    } else {
        HttpResponse::NotFound().json(MessageResponse {
            message: format!("no block found for {}", ip),
        })
    }
}

/// Engine-wide statistics
async fn statistics(state: web::Data<ApiState>) -> impl Responder {
    HttpResponse::Ok().json(state.engine.statistics().await)
}

/// Atomically merge a partial configuration
async fn update_config(
    state: web::Data<ApiState>,
    patch: web::Json<EngineConfigPatch>,
) -> impl Responder {
    match state.engine.update_config(&patch).await {
        Ok(merged) => HttpResponse::Ok().json(merged),
        Err(e) => HttpResponse::BadRequest().json(MessageResponse {
            message: e.to_string(),
        }),
    }
}

/// Export findings, statistics, and blocks for offline analysis
async fn export_state(state: web::Data<ApiState>) -> impl Responder {
    HttpResponse::Ok().json(state.engine.export_state().await)
}

/// Operational reset of findings and the reputation cache
async fn clear_state(state: web::Data<ApiState>) -> impl Responder {
    state.engine.clear_state().await;
    HttpResponse::Ok().json(MessageResponse {
        message: "state cleared".to_string(),
    })
}
