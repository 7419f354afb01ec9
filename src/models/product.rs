// src/models/product.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

// ---
// Ubicación física (zona del almacén)
// ---
// Una ubicación es un valor compuesto: letra A..H + subzona 1..2.
// No es una entidad propia; vive embebida en productos, líneas de conteo
// y en la tabla product_locations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Location {
    pub letra: char,
    pub numero: i16,
}

impl Location {
    pub fn new(letra: char, numero: i16) -> Option<Self> {
        let letra = letra.to_ascii_uppercase();
        if !('A'..='H').contains(&letra) || !(1..=2).contains(&numero) {
            return None;
        }
        Some(Self { letra, numero })
    }

    pub fn letra_str(&self) -> String {
        self.letra.to_string()
    }
}

// Si el operador no indica zona, todo cae en H1.
impl Default for Location {
    fn default() -> Self {
        Self { letra: 'H', numero: 1 }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.letra, self.numero)
    }
}

impl FromStr for Location {
    type Err = ();

    // Acepta "A1", "h2", etc.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let mut chars = s.chars();
        let letra = chars.next().ok_or(())?;
        let numero: i16 = chars.as_str().parse().map_err(|_| ())?;
        Location::new(letra, numero).ok_or(())
    }
}

// ---
// Normalización de códigos
// ---
/// Normaliza un código de producto para búsqueda: mayúsculas y solo
/// caracteres alfanuméricos ("ab-1" -> "AB1"). La columna codigo_norm
/// guarda esta misma proyección.
pub fn normalize_codigo(codigo: &str) -> String {
    codigo
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

// ---
// Producto (catálogo + stock autoritativo)
// ---
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub codigo: String,
    pub codigo_norm: Option<String>,
    pub nombre: String,

    // El único contador autoritativo de existencias. Solo lo mutan el
    // libro de movimientos y la aplicación de un conteo físico.
    pub stock: i32,

    pub precio_compra: Decimal,
    pub precio_venta: Decimal,
    pub precio_minimo: Decimal,

    // Referencia a la ficha técnica (el archivo vive fuera de este servicio).
    pub ficha_tecnica: Option<String>,

    pub zona_letra: String,
    pub zona_numero: i16,

    pub activo: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Stock por ubicación: se alimenta al aplicar un conteo físico, para que
// un mismo producto conserve saldos independientes por zona.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProductLocation {
    pub product_id: Uuid,
    pub zona_letra: String,
    pub zona_numero: i16,
    pub stock: i32,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ubicacion_valida_y_normalizada() {
        let loc = Location::new('b', 2).unwrap();
        assert_eq!(loc.letra, 'B');
        assert_eq!(loc.to_string(), "B2");
    }

    #[test]
    fn ubicacion_fuera_de_dominio() {
        assert!(Location::new('I', 1).is_none());
        assert!(Location::new('A', 3).is_none());
        assert!(Location::new('A', 0).is_none());
    }

    #[test]
    fn ubicacion_por_defecto_es_h1() {
        assert_eq!(Location::default().to_string(), "H1");
    }

    #[test]
    fn parse_desde_cadena() {
        assert_eq!("a1".parse::<Location>().unwrap().to_string(), "A1");
        assert_eq!("H2".parse::<Location>().unwrap().to_string(), "H2");
        assert!("Z1".parse::<Location>().is_err());
        assert!("A".parse::<Location>().is_err());
        assert!("".parse::<Location>().is_err());
    }

    #[test]
    fn normalizacion_de_codigos() {
        assert_eq!(normalize_codigo("ab-1"), "AB1");
        assert_eq!(normalize_codigo("  xk 99/b "), "XK99B");
        assert_eq!(normalize_codigo("ÑÜ-3"), "3");
        assert_eq!(normalize_codigo(""), "");
    }
}
