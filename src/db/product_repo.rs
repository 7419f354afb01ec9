// src/db/product_repo.rs

use sqlx::{Executor, PgPool, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::product::{Product, ProductLocation},
};

// El repositorio de productos. Aquí vive la única disciplina válida para
// tocar `products.stock`: el UPDATE atómico con guarda. Nunca se lee el
// stock para calcular el nuevo valor fuera de la misma sentencia.
#[derive(Clone)]
pub struct ProductRepository {
    pool: PgPool,
}

impl ProductRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_active_by_id<'e, E>(
        &self,
        executor: E,
        id: Uuid,
    ) -> Result<Option<Product>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let product = sqlx::query_as::<_, Product>(
            "SELECT * FROM products WHERE id = $1 AND activo",
        )
        .bind(id)
        .fetch_optional(executor)
        .await?;
        Ok(product)
    }

    /// Busca por el código normalizado (columna de búsqueda `codigo_norm`).
    pub async fn find_by_codigo_norm<'e, E>(
        &self,
        executor: E,
        codigo_norm: &str,
    ) -> Result<Option<Product>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let product = sqlx::query_as::<_, Product>(
            "SELECT * FROM products WHERE codigo_norm = $1 AND activo",
        )
        .bind(codigo_norm)
        .fetch_optional(executor)
        .await?;
        Ok(product)
    }

    /// Ajusta el stock en `delta` (positivo o negativo) de forma atómica.
    ///
    /// La guarda `stock + delta >= 0` vive dentro del propio UPDATE, así que
    /// dos movimientos concurrentes sobre el mismo producto se serializan en
    /// el bloqueo de fila de la base y ninguno pisa al otro. Devuelve el
    /// stock resultante, o None si la guarda rechazó el ajuste.
    pub async fn adjust_stock<'e, E>(
        &self,
        executor: E,
        id: Uuid,
        delta: i32,
    ) -> Result<Option<i32>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let new_stock = sqlx::query_scalar::<_, i32>(
            r#"
            UPDATE products
            SET stock = stock + $2, updated_at = now()
            WHERE id = $1 AND stock + $2 >= 0
            RETURNING stock
            "#,
        )
        .bind(id)
        .bind(delta)
        .fetch_optional(executor)
        .await?;
        Ok(new_stock)
    }

    /// Lectura puntual del stock, para informar cuánto hay realmente al
    /// momento de rechazar una salida. No sirve para calcular ajustes.
    pub async fn current_stock<'e, E>(
        &self,
        executor: E,
        id: Uuid,
    ) -> Result<Option<i32>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let stock = sqlx::query_scalar::<_, i32>(
            "SELECT stock FROM products WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(executor)
        .await?;
        Ok(stock)
    }

    /// Fija el stock a un valor absoluto (aplicación de un conteo físico:
    /// el conteo es autoritativo, no un delta).
    pub async fn set_stock<'e, E>(
        &self,
        executor: E,
        id: Uuid,
        stock: i32,
    ) -> Result<bool, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query(
            "UPDATE products SET stock = $2, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(stock)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Baja lógica del producto. Corre con un lock_timeout corto porque la
    /// fila puede estar tomada por una transacción de movimiento; la capa
    /// de servicio envuelve esta llamada en el ejecutor de reintentos.
    pub async fn deactivate(&self, id: Uuid) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SET LOCAL lock_timeout = '1s'")
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query(
            "UPDATE products SET activo = FALSE, updated_at = now() WHERE id = $1 AND activo",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn exists(&self, id: Uuid) -> Result<bool, AppError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM products WHERE id = $1)",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    /// Saldos por zona de un producto, alimentados por los conteos aplicados.
    pub async fn locations_for_product(
        &self,
        product_id: Uuid,
    ) -> Result<Vec<ProductLocation>, AppError> {
        let locations = sqlx::query_as::<_, ProductLocation>(
            r#"
            SELECT product_id, zona_letra, zona_numero, stock, updated_at
            FROM product_locations
            WHERE product_id = $1
            ORDER BY zona_letra, zona_numero
            "#,
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(locations)
    }

    // ---
    // Agregados para el panel
    // ---

    pub async fn count_active(&self) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM products WHERE activo",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    pub async fn total_stock(&self) -> Result<i64, AppError> {
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(SUM(stock), 0) FROM products WHERE activo",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(total)
    }

    /// Productos con stock bajo. El umbral compara contra `precio_minimo`:
    /// comportamiento heredado del panel original, que reutiliza ese campo
    /// como umbral de cantidad (ver DESIGN.md).
    pub async fn low_stock_count(&self) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM products WHERE activo AND stock < precio_minimo",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}
