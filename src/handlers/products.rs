// src/handlers/products.rs

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use crate::{common::error::AppError, config::AppState, middleware::actor::Actor};

// El alta y edición de productos viven en el sistema de catálogo; de este
// lado solo está la baja lógica, que pasa por el ejecutor de reintentos.
#[utoipa::path(
    delete,
    path = "/api/products/{id}",
    params(("id" = Uuid, Path, description = "Id del producto")),
    responses(
        (status = 204, description = "Producto desactivado"),
        (status = 404, description = "Producto no encontrado o ya inactivo"),
        (status = 503, description = "Contención de bloqueos persistente"),
    )
)]
pub async fn deactivate_product(
    State(app_state): State<AppState>,
    Actor(_usuario_id): Actor,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    app_state.product_service.deactivate(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/products/{id}/locations",
    params(("id" = Uuid, Path, description = "Id del producto")),
    responses(
        (status = 200, description = "Saldos por zona del último conteo aplicado"),
        (status = 404, description = "Producto no encontrado"),
    )
)]
pub async fn product_locations(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let locations = app_state.product_service.locations(id).await?;
    Ok((StatusCode::OK, axum::Json(locations)))
}
