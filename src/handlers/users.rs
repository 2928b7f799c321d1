// src/handlers/users.rs
use axum::{extract::Path, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

/// GET /users/{id}
pub async fn get_user(Path(id): Path<String>) -> impl IntoResponse {
    match id.parse::<u64>() {
        Ok(id) => (StatusCode::OK, Json(json!({ "id": id }))),
        Err(_) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("User not found: {}", id) })),
        ),
    }
}
