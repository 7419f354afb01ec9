// src/models/session.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

// ---
// Estado de una sesión de inventario
// ---
// Ciclo de vida: abierto -> cerrado -> aplicado. Una sesión abierta
// también puede eliminarse (descarte, sin rastro en el stock).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Abierto,
    Cerrado,
    Aplicado,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InventorySession {
    pub id: i64,
    pub estado: SessionState,
    pub usuario_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub applied_at: Option<DateTime<Utc>>,
}

// ---
// Línea de conteo
// ---
// Clave única (session, product, zona): escanear el mismo producto en la
// misma zona acumula sobre la misma línea, nunca duplica filas.
// `diferencia` es una columna generada (conteo - stock_actual), así que
// jamás puede quedar desincronizada.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CountLine {
    pub id: i64,
    pub session_id: i64,
    pub product_id: Uuid,
    pub zona_letra: String,
    pub zona_numero: i16,

    // Foto del stock del producto en el primer escaneo de esta línea.
    pub stock_actual: i32,
    pub conteo: i32,
    pub diferencia: i32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Línea con los datos del producto resueltos, para el detalle y el export.
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CountLineDetail {
    pub id: i64,
    pub session_id: i64,
    pub product_id: Uuid,
    pub codigo: String,
    pub nombre: String,
    pub zona_letra: String,
    pub zona_numero: i16,
    pub stock_actual: i32,
    pub conteo: i32,
    pub diferencia: i32,
}

// Detalle completo devuelto por GET /api/sessions/{id}.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionDetail {
    #[serde(flatten)]
    pub session: InventorySession,
    pub lines: Vec<CountLineDetail>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estado_serializa_en_minusculas() {
        assert_eq!(serde_json::to_string(&SessionState::Abierto).unwrap(), "\"abierto\"");
        assert_eq!(serde_json::to_string(&SessionState::Aplicado).unwrap(), "\"aplicado\"");
        let s: SessionState = serde_json::from_str("\"cerrado\"").unwrap();
        assert_eq!(s, SessionState::Cerrado);
    }
}
