// src/handlers/sessions.rs

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    common::error::AppError,
    config::AppState,
    middleware::actor::Actor,
    models::product::Location,
};

#[utoipa::path(
    post,
    path = "/api/sessions",
    responses(
        (status = 201, description = "Sesión de inventario abierta", body = crate::models::session::InventorySession),
        (status = 409, description = "Ya existe una sesión abierta"),
    )
)]
pub async fn open_session(
    State(app_state): State<AppState>,
    Actor(usuario_id): Actor,
) -> Result<impl IntoResponse, AppError> {
    let session = app_state.session_service.open(usuario_id).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

#[utoipa::path(
    get,
    path = "/api/sessions",
    responses(
        (status = 200, description = "Historial de sesiones, más reciente primero"),
    )
)]
pub async fn list_sessions(
    State(app_state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let sessions = app_state.session_service.list().await?;
    Ok((StatusCode::OK, Json(sessions)))
}

#[utoipa::path(
    get,
    path = "/api/sessions/{id}",
    params(("id" = i64, Path, description = "Id de la sesión")),
    responses(
        (status = 200, description = "Sesión con sus líneas", body = crate::models::session::SessionDetail),
        (status = 404, description = "Sesión no encontrada"),
    )
)]
pub async fn get_session(
    State(app_state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let detail = app_state.session_service.get(id).await?;
    Ok((StatusCode::OK, Json(detail)))
}

// ---
// Payload: escaneo
// ---
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScanPayload {
    #[validate(length(min = 1, message = "El código es obligatorio."))]
    pub code: String,

    // Cada disparo del escáner suma 1 salvo que se indique otra cantidad.
    pub cantidad: Option<i32>,

    // "A1".."H2"; sin zona, el conteo cae en H1.
    pub zona: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/sessions/{id}/lines",
    params(("id" = i64, Path, description = "Id de la sesión")),
    request_body = ScanPayload,
    responses(
        (status = 200, description = "Línea creada o acumulada", body = crate::models::session::CountLine),
        (status = 404, description = "Sesión o producto no encontrados"),
        (status = 409, description = "La sesión no está abierta"),
    )
)]
pub async fn scan(
    State(app_state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<ScanPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let zona = payload
        .zona
        .as_deref()
        .map(str::parse::<Location>)
        .transpose()
        .map_err(|_| AppError::BadRequest("Ubicación inválida: use A1..H2.".into()))?;

    let line = app_state
        .session_service
        .scan(id, &payload.code, payload.cantidad.unwrap_or(1), zona)
        .await?;

    Ok((StatusCode::OK, Json(line)))
}

// ---
// Payload: corrección manual
// ---
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdjustCountPayload {
    // Valores negativos se acotan a 0 en el servicio.
    pub conteo: i32,
}

#[utoipa::path(
    patch,
    path = "/api/sessions/{id}/lines/{line_id}",
    params(
        ("id" = i64, Path, description = "Id de la sesión"),
        ("line_id" = i64, Path, description = "Id de la línea"),
    ),
    request_body = AdjustCountPayload,
    responses(
        (status = 200, description = "Línea corregida", body = crate::models::session::CountLine),
        (status = 404, description = "Sesión o línea no encontradas"),
        (status = 409, description = "La sesión no está abierta"),
    )
)]
pub async fn adjust_line(
    State(app_state): State<AppState>,
    Path((id, line_id)): Path<(i64, i64)>,
    Json(payload): Json<AdjustCountPayload>,
) -> Result<impl IntoResponse, AppError> {
    let line = app_state
        .session_service
        .adjust(id, line_id, payload.conteo)
        .await?;
    Ok((StatusCode::OK, Json(line)))
}

#[utoipa::path(
    delete,
    path = "/api/sessions/{id}/lines/{line_id}",
    params(
        ("id" = i64, Path, description = "Id de la sesión"),
        ("line_id" = i64, Path, description = "Id de la línea"),
    ),
    responses(
        (status = 204, description = "Línea eliminada"),
        (status = 404, description = "Sesión o línea no encontradas"),
    )
)]
pub async fn remove_line(
    State(app_state): State<AppState>,
    Path((id, line_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    app_state.session_service.remove_line(id, line_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/sessions/{id}/close",
    params(("id" = i64, Path, description = "Id de la sesión")),
    responses(
        (status = 200, description = "Sesión cerrada", body = crate::models::session::InventorySession),
        (status = 409, description = "La sesión no está abierta"),
    )
)]
pub async fn close_session(
    State(app_state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let session = app_state.session_service.close(id).await?;
    Ok((StatusCode::OK, Json(session)))
}

#[utoipa::path(
    post,
    path = "/api/sessions/{id}/apply",
    params(("id" = i64, Path, description = "Id de la sesión")),
    responses(
        (status = 200, description = "Conteo volcado al stock"),
        (status = 409, description = "Sesión sin cerrar o ya aplicada"),
    )
)]
pub async fn apply_session(
    State(app_state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let applied = app_state.reconciliation_service.apply(id).await?;
    Ok((
        StatusCode::OK,
        Json(serde_json::json!({ "appliedLines": applied })),
    ))
}

#[utoipa::path(
    delete,
    path = "/api/sessions/{id}",
    params(("id" = i64, Path, description = "Id de la sesión")),
    responses(
        (status = 204, description = "Sesión descartada"),
        (status = 409, description = "Solo una sesión abierta puede eliminarse"),
    )
)]
pub async fn delete_session(
    State(app_state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    app_state.session_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/sessions/{id}/export",
    params(("id" = i64, Path, description = "Id de la sesión")),
    responses(
        (status = 200, description = "Proyección CSV de las líneas", content_type = "text/csv"),
        (status = 404, description = "Sesión no encontrada"),
    )
)]
pub async fn export_session(
    State(app_state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let bytes = app_state.session_service.export(id).await?;
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"inventario_{id}.csv\""),
            ),
        ],
        bytes,
    ))
}
