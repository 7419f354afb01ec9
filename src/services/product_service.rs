// src/services/product_service.rs

use uuid::Uuid;

use crate::{
    common::error::AppError,
    common::retry::{with_retry, DEFAULT_BASE_DELAY, DEFAULT_MAX_RETRIES},
    db::ProductRepository,
    models::product::ProductLocation,
};

// El CRUD de productos vive en otro sistema; de este lado solo queda la
// baja lógica, porque su UPDATE compite con las transacciones de
// movimientos sobre la misma fila y necesita el ejecutor de reintentos.
#[derive(Clone)]
pub struct ProductService {
    products: ProductRepository,
}

impl ProductService {
    pub fn new(products: ProductRepository) -> Self {
        Self { products }
    }

    /// Baja lógica con reintentos: si la fila está bloqueada por un
    /// movimiento en curso, reintenta con backoff antes de rendirse.
    pub async fn deactivate(&self, id: Uuid) -> Result<(), AppError> {
        let products = self.products.clone();
        with_retry("deactivate_product", DEFAULT_MAX_RETRIES, DEFAULT_BASE_DELAY, move || {
            let products = products.clone();
            async move {
                if products.deactivate(id).await? {
                    Ok(())
                } else {
                    Err(AppError::ProductNotFound)
                }
            }
        })
        .await
    }

    /// Saldos por zona, tal como los dejó el último conteo aplicado.
    pub async fn locations(&self, id: Uuid) -> Result<Vec<ProductLocation>, AppError> {
        if !self.products.exists(id).await? {
            return Err(AppError::ProductNotFound);
        }
        self.products.locations_for_product(id).await
    }
}
