// ABOUTME: Health check route handler for service monitoring
// ABOUTME: Liveness only; the provider has no external dependencies to probe
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.

use axum::Json;
use serde_json::Value;

/// Liveness endpoint for load balancers and monitoring
pub async fn health_handler() -> Json<Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}
