// src/common/error.rs

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// Código SQLSTATE de Postgres para "lock_not_available" (lock_timeout agotado).
const PG_LOCK_NOT_AVAILABLE: &str = "55P03";

// Nuestro tipo de error, con `thiserror` para mejor ergonomía.
//
// Taxonomía: errores de validación y pedidos rechazados (400), no-encontrado
// (404), conflictos de estado de sesión (409, nunca se reintentan), contención transitoria de
// bloqueos (503, la única clase que el ejecutor de reintentos vuelve a
// intentar) y errores internos (500).
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Error de validación")]
    Validation(#[from] validator::ValidationErrors),

    #[error("{0}")]
    BadRequest(String),

    #[error("Falta la cabecera X-User-Id o no es un UUID")]
    MissingActor,

    #[error("Producto no encontrado")]
    ProductNotFound,

    #[error("Producto no registrado: {0}")]
    ProductNotRegistered(String),

    #[error("Sesión de inventario no encontrada")]
    SessionNotFound,

    #[error("Línea de conteo no encontrada")]
    LineNotFound,

    #[error("Stock insuficiente: disponible {disponible}, solicitado {solicitado}")]
    InsufficientStock { disponible: i32, solicitado: i32 },

    #[error("Ya existe una sesión de inventario abierta")]
    SessionAlreadyOpen,

    #[error("La sesión no está abierta")]
    SessionNotOpen,

    #[error("La sesión debe estar cerrada antes de aplicarse")]
    SessionNotClosed,

    #[error("La sesión ya fue aplicada")]
    AlreadyApplied,

    // Contención de bloqueos en la base (lock_timeout). Recuperable:
    // el ejecutor de reintentos la vuelve a intentar con backoff.
    #[error("La base de datos está ocupada, intente nuevamente")]
    LockContention,

    #[error("Error de base de datos")]
    Database(sqlx::Error),

    // Variante genérica para cualquier otro error inesperado.
    #[error("Error interno del servidor")]
    Internal(#[from] anyhow::Error),
}

// Conversión manual en lugar de #[from]: separa el timeout de bloqueo
// (transitorio) del resto de errores de sqlx (definitivos).
impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        if let Some(db_err) = e.as_database_error() {
            if db_err.code().as_deref() == Some(PG_LOCK_NOT_AVAILABLE) {
                return AppError::LockContention;
            }
        }
        AppError::Database(e)
    }
}

impl AppError {
    /// Solo la contención de bloqueos es transitoria; todo lo demás es
    /// determinista y reintentar no cambia nada.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::LockContention)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            // Devuelve todos los detalles de la validación, campo por campo.
            AppError::Validation(errors) => {
                let mut details = std::collections::HashMap::new();
                for (field, field_errors) in errors.field_errors() {
                    let messages: Vec<String> = field_errors
                        .iter()
                        .filter_map(|e| e.message.as_ref().map(|m| m.to_string()))
                        .collect();
                    details.insert(field.to_string(), messages);
                }
                let body = Json(json!({
                    "error": "Uno o más campos son inválidos.",
                    "details": details,
                }));
                return (StatusCode::BAD_REQUEST, body).into_response();
            }

            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            // La falta de stock es un rechazo del pedido, no un conflicto de
            // estado de la sesión: misma clase que los demás 400.
            AppError::MissingActor | AppError::InsufficientStock { .. } => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }

            AppError::ProductNotFound
            | AppError::ProductNotRegistered(_)
            | AppError::SessionNotFound
            | AppError::LineNotFound => (StatusCode::NOT_FOUND, self.to_string()),

            AppError::SessionAlreadyOpen
            | AppError::SessionNotOpen
            | AppError::SessionNotClosed
            | AppError::AlreadyApplied => (StatusCode::CONFLICT, self.to_string()),

            // "Intente más tarde": el ejecutor de reintentos ya agotó su cuota.
            AppError::LockContention => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),

            // El detalle queda en el log; el cliente recibe un mensaje genérico.
            e => {
                tracing::error!("Error interno del servidor: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Ocurrió un error inesperado.".to_string(),
                )
            }
        };

        let body = Json(json!({ "error": error_message }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn mapeo_de_estados_http() {
        assert_eq!(status_of(AppError::BadRequest("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(AppError::MissingActor), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(AppError::ProductNotFound), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(AppError::ProductNotRegistered("X1".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(status_of(AppError::SessionNotFound), StatusCode::NOT_FOUND);
        // Stock insuficiente rechaza el pedido como 400, no como conflicto.
        assert_eq!(
            status_of(AppError::InsufficientStock { disponible: 1, solicitado: 5 }),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status_of(AppError::SessionAlreadyOpen), StatusCode::CONFLICT);
        assert_eq!(status_of(AppError::SessionNotClosed), StatusCode::CONFLICT);
        assert_eq!(status_of(AppError::AlreadyApplied), StatusCode::CONFLICT);
        assert_eq!(
            status_of(AppError::LockContention),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(AppError::Internal(anyhow::anyhow!("boom"))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn solo_la_contencion_es_transitoria() {
        assert!(AppError::LockContention.is_transient());
        assert!(!AppError::ProductNotFound.is_transient());
        assert!(!AppError::InsufficientStock { disponible: 0, solicitado: 1 }.is_transient());
        assert!(!AppError::Internal(anyhow::anyhow!("boom")).is_transient());
    }
}
