// src/handlers/health.rs
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use statsd_profiler::Profiler;

/// GET /healthz
///
/// Reports which service name the timings are filed under and where they go.
pub async fn health_check(State(profiler): State<Profiler>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": profiler.service(),
        "statsd": profiler.address(),
        "debug": profiler.is_debug(),
    }))
}
