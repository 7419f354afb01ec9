// src/models/movement.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

// ---
// Tipo de movimiento
// ---
// Sin atributos de tipo nombrado: sqlx lo codifica como texto plano
// ('ingreso' / 'salida'), igual que la columna `tipo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MovementKind {
    Ingreso,
    Salida,
}

impl MovementKind {
    /// Delta con signo que este movimiento aplica sobre el stock.
    pub fn delta(&self, cantidad: i32) -> i32 {
        match self {
            MovementKind::Ingreso => cantidad,
            MovementKind::Salida => -cantidad,
        }
    }
}

// ---
// Movimiento (asiento del libro)
// ---
// Inmutable una vez escrito: las correcciones se hacen registrando un
// movimiento opuesto, nunca editando el historial.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Movement {
    pub id: i64,
    pub product_id: Uuid,
    pub tipo: MovementKind,
    pub cantidad: i32,
    pub motivo: Option<String>,
    pub usuario_id: Uuid,
    pub created_at: DateTime<Utc>,
}

// Fila del listado, con el código y nombre del producto ya resueltos.
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MovementListItem {
    pub id: i64,
    pub product_id: Uuid,
    pub codigo: String,
    pub nombre: String,
    pub tipo: MovementKind,
    pub cantidad: i32,
    pub motivo: Option<String>,
    pub usuario_id: Uuid,
    pub created_at: DateTime<Utc>,
}

// ---
// Estadísticas del panel
// ---
#[derive(Debug, Clone, Copy, Default, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MovementAggregate {
    pub count: i64,
    pub qty: i64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub total_products: i64,
    pub total_stock: i64,
    pub movements_today: i64,
    pub ingresos_today: MovementAggregate,
    pub salidas_today: MovementAggregate,
    pub low_stock_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_con_signo() {
        assert_eq!(MovementKind::Ingreso.delta(5), 5);
        assert_eq!(MovementKind::Salida.delta(5), -5);
    }

    #[test]
    fn tipo_serializa_en_minusculas() {
        assert_eq!(serde_json::to_string(&MovementKind::Ingreso).unwrap(), "\"ingreso\"");
        assert_eq!(serde_json::to_string(&MovementKind::Salida).unwrap(), "\"salida\"");
        let t: MovementKind = serde_json::from_str("\"salida\"").unwrap();
        assert_eq!(t, MovementKind::Salida);
    }

    #[test]
    fn tipo_desconocido_es_rechazado() {
        assert!(serde_json::from_str::<MovementKind>("\"ajuste\"").is_err());
    }
}
