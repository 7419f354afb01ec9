// src/handlers/movements.rs

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::error::AppError,
    config::AppState,
    db::movement_repo::MovementFilters,
    middleware::actor::Actor,
    models::movement::MovementKind,
    services::movement_service::DEFAULT_PAGE_SIZE,
};

// ---
// Payload: registrar movimiento
// ---
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterMovementPayload {
    pub product_id: Uuid,

    // Un `tipo` desconocido ya es rechazado por serde al deserializar.
    pub tipo: MovementKind,

    #[validate(range(min = 1, message = "La cantidad debe ser al menos 1."))]
    pub cantidad: i32,

    pub motivo: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MovementResponse {
    pub id: i64,
    pub product_id: Uuid,
    pub tipo: MovementKind,
    pub cantidad: i32,
    pub motivo: Option<String>,
    pub new_stock: i32,
}

#[utoipa::path(
    post,
    path = "/api/movements",
    request_body = RegisterMovementPayload,
    responses(
        (status = 201, description = "Movimiento registrado", body = MovementResponse),
        (status = 400, description = "Campos faltantes, tipo inválido o stock insuficiente"),
        (status = 404, description = "Producto no encontrado"),
    )
)]
pub async fn register_movement(
    State(app_state): State<AppState>,
    Actor(usuario_id): Actor,
    Json(payload): Json<RegisterMovementPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let (movement, new_stock) = app_state
        .movement_service
        .register(
            payload.product_id,
            payload.tipo,
            payload.cantidad,
            payload.motivo.as_deref(),
            usuario_id,
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(MovementResponse {
            id: movement.id,
            product_id: movement.product_id,
            tipo: movement.tipo,
            cantidad: movement.cantidad,
            motivo: movement.motivo,
            new_stock,
        }),
    ))
}

// ---
// Listado con filtros
// ---
fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    DEFAULT_PAGE_SIZE
}

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ListMovementsQuery {
    pub product_id: Option<Uuid>,
    pub tipo: Option<MovementKind>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

#[utoipa::path(
    get,
    path = "/api/movements",
    params(ListMovementsQuery),
    responses(
        (status = 200, description = "Página del libro de movimientos, más reciente primero"),
    )
)]
pub async fn list_movements(
    State(app_state): State<AppState>,
    Query(query): Query<ListMovementsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let filters = MovementFilters {
        product_id: query.product_id,
        tipo: query.tipo,
        date_from: query.date_from,
        date_to: query.date_to,
    };

    let movements = app_state
        .movement_service
        .list(&filters, query.page, query.limit)
        .await?;

    Ok((StatusCode::OK, Json(movements)))
}

#[utoipa::path(
    get,
    path = "/api/movements/statistics",
    responses(
        (status = 200, description = "Agregados del panel", body = crate::models::movement::Statistics),
    )
)]
pub async fn statistics(
    State(app_state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let stats = app_state.movement_service.statistics().await?;
    Ok((StatusCode::OK, Json(stats)))
}
