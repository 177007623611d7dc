//! HTTP route handlers: Start, Stop, Inventory, and the discovery-store
//! dump (spec.md §6 "HTTP surface of the control plane (abstract)").
//!
//! Grounded in the teacher's `raftcat::main` handler shape (a plain
//! `fn(&HttpRequest<State>) -> Result<HttpResponse>` per route) but
//! returning JSON throughout rather than templated HTML, since this
//! surface is a control-plane API, not an operator dashboard.

use actix_web::{web, HttpRequest, HttpResponse, ResponseError};

use deployer::ModelRequest;
use deployer_core::LifecycleState;

use crate::state::AppState;
use crate::{error_tag, Error, ErrorBody};

fn check_api_key(req: &HttpRequest, cfg: &deployer_core::Config) -> Result<(), HttpResponse> {
    let key = req.headers().get("x-api-key").and_then(|v| v.to_str().ok());
    match key {
        Some(k) if cfg.accepts_key(k) => Ok(()),
        _ => Err(HttpResponse::Unauthorized().json(ErrorBody { error: "unauthorized", message: "missing or invalid x-api-key".into() })),
    }
}

#[derive(Deserialize)]
pub struct StartRequest {
    pub model_id: String,
    pub model_name: String,
    pub model_repo_id: String,
    pub model_type: String,
    #[serde(default)]
    pub cross_cluster: bool,
    #[serde(default)]
    pub ingress_host: Option<String>,
}

#[derive(Serialize)]
struct StartResponse {
    message: String,
    ip: String,
    degraded: bool,
}

#[derive(Deserialize)]
pub struct StopRequest {
    pub model_id: String,
    pub model_name: String,
}

#[derive(Serialize)]
struct StopResponse {
    message: String,
}

/// Failure body shape of spec.md §7: `{error, message, model_id, state_after}`.
#[derive(Serialize)]
struct FailureBody {
    error: &'static str,
    message: String,
    model_id: String,
    state_after: &'static str,
}

/// Which of `warming`/`active`/`cooling` currently holds `model_id`, or
/// `"absent"` if none do (spec.md §8 "at most one... contains that id").
async fn state_after(state: &AppState, model_id: &str) -> &'static str {
    if state.orchestrator.store.get(LifecycleState::Active, model_id).await.ok().flatten().is_some() {
        return "active";
    }
    if state.orchestrator.store.get(LifecycleState::Warming, model_id).await.ok().flatten().is_some() {
        return "warming";
    }
    if state.orchestrator.store.get(LifecycleState::Cooling, model_id).await.ok().flatten().is_some() {
        return "cooling";
    }
    "absent"
}

async fn failure_response(state: &AppState, model_id: &str, e: Error) -> HttpResponse {
    let (status, tag) = error_tag(&e);
    let after = state_after(state, model_id).await;
    warn!("request for model '{}' failed ({}): {}", model_id, tag, e);
    HttpResponse::build(status).json(FailureBody { error: tag, message: e.to_string(), model_id: model_id.to_string(), state_after: after })
}

pub async fn start(req: HttpRequest, state: web::Data<AppState>, body: web::Json<StartRequest>) -> HttpResponse {
    if let Err(resp) = check_api_key(&req, &state.config) {
        return resp;
    }
    let model_request = ModelRequest {
        model_id: body.model_id.clone(),
        model_name: body.model_name.clone(),
        model_repo_id: body.model_repo_id.clone(),
        model_type: body.model_type.clone(),
        cross_cluster: body.cross_cluster,
        ingress_host: body.ingress_host.clone(),
    };
    match state.orchestrator.start(&model_request).await {
        Ok(outcome) => {
            let message = if outcome.degraded {
                format!("model '{}' is active but degraded", body.model_name)
            } else {
                format!("model '{}' is active", body.model_name)
            };
            HttpResponse::Ok().json(StartResponse { message, ip: outcome.ip, degraded: outcome.degraded })
        }
        Err(e) => failure_response(&state, &body.model_id, Error::from(e)).await,
    }
}

pub async fn stop(req: HttpRequest, state: web::Data<AppState>, body: web::Json<StopRequest>) -> HttpResponse {
    if let Err(resp) = check_api_key(&req, &state.config) {
        return resp;
    }
    match state.orchestrator.stop(&body.model_id, &body.model_name).await {
        Ok(()) => HttpResponse::Ok().json(StopResponse { message: format!("model '{}' stopped", body.model_id) }),
        Err(e) => failure_response(&state, &body.model_id, Error::from(e)).await,
    }
}

#[derive(Serialize)]
struct PoolTotals {
    name: String,
    base_cpu_cores: f64,
    base_mem_gib: f64,
    base_gpu_count: u32,
    extra_cpu_cores: f64,
    extra_mem_gib: f64,
    extra_gpu_count: u32,
}

pub async fn inventory(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    if let Err(resp) = check_api_key(&req, &state.config) {
        return resp;
    }
    match state.orchestrator.inventory.snapshot().await {
        Ok(snapshot) => {
            let pools = snapshot
                .pools
                .iter()
                .map(|p| PoolTotals {
                    name: p.name.clone(),
                    base_cpu_cores: p.totals.base.cpu_cores,
                    base_mem_gib: p.totals.base.mem_gib,
                    base_gpu_count: p.totals.base.gpu_count,
                    extra_cpu_cores: p.totals.extra.cpu_cores,
                    extra_mem_gib: p.totals.extra.mem_gib,
                    extra_gpu_count: p.totals.extra.gpu_count,
                })
                .collect::<Vec<_>>();
            HttpResponse::Ok().json(pools)
        }
        Err(e) => Error::from(e).error_response(),
    }
}

#[derive(Serialize)]
struct DumpEntry {
    state: &'static str,
    id: String,
    ip: String,
    model_name: String,
}

pub async fn dump(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    if let Err(resp) = check_api_key(&req, &state.config) {
        return resp;
    }
    let mut entries = Vec::new();
    for lifecycle in LifecycleState::all() {
        match state.orchestrator.store.list(lifecycle).await {
            Ok(records) => {
                for (id, record) in records {
                    entries.push(DumpEntry { state: lifecycle.path_segment(), id, ip: record.ip, model_name: record.model_name });
                }
            }
            Err(e) => return Error::from(e).error_response(),
        }
    }
    HttpResponse::Ok().json(entries)
}

pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}
