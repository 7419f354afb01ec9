// src/services/movement_service.rs

use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{movement_repo::MovementFilters, MovementRepository, ProductRepository},
    models::movement::{Movement, MovementKind, MovementListItem, Statistics},
};

pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 500;
// Tope de página: mantiene acotado el OFFSET (page - 1) * page_size.
pub const MAX_PAGE: i64 = 100_000;

// El libro de movimientos. Cada registro es una transacción única: el
// asiento inmutable y la actualización del stock entran juntos o ninguno.
#[derive(Clone)]
pub struct MovementService {
    pool: PgPool,
    products: ProductRepository,
    movements: MovementRepository,
}

impl MovementService {
    pub fn new(pool: PgPool, products: ProductRepository, movements: MovementRepository) -> Self {
        Self { pool, products, movements }
    }

    /// Registra un ingreso o salida y devuelve el asiento junto con el
    /// stock resultante.
    ///
    /// La suficiencia de stock no se valida con una lectura previa: la
    /// guarda `stock + delta >= 0` va dentro del mismo UPDATE, de modo que
    /// movimientos concurrentes sobre el mismo producto no pueden perderse
    /// actualizaciones ni dejar el stock negativo.
    pub async fn register(
        &self,
        product_id: Uuid,
        tipo: MovementKind,
        cantidad: i32,
        motivo: Option<&str>,
        usuario_id: Uuid,
    ) -> Result<(Movement, i32), AppError> {
        if cantidad < 1 {
            return Err(AppError::BadRequest(
                "La cantidad debe ser un entero mayor o igual a 1.".into(),
            ));
        }

        let mut tx = self.pool.begin().await?;

        let product = self
            .products
            .find_active_by_id(&mut *tx, product_id)
            .await?
            .ok_or(AppError::ProductNotFound)?;

        let new_stock = match self
            .products
            .adjust_stock(&mut *tx, product_id, tipo.delta(cantidad))
            .await?
        {
            Some(stock) => stock,
            None => {
                // Se relee dentro de la transacción: la lectura inicial del
                // producto pudo quedar vieja si otro movimiento se coló entre
                // medio, y el mensaje debe informar el stock que rechazó.
                let disponible = self
                    .products
                    .current_stock(&mut *tx, product_id)
                    .await?
                    .unwrap_or(0);
                return Err(AppError::InsufficientStock {
                    disponible,
                    solicitado: cantidad,
                });
            }
        };

        let movement = self
            .movements
            .insert(&mut *tx, product_id, tipo, cantidad, motivo, usuario_id)
            .await?;

        tx.commit().await?;

        tracing::info!(
            "Movimiento #{} registrado: {:?} x{} sobre {} (stock: {})",
            movement.id,
            tipo,
            cantidad,
            product.codigo,
            new_stock
        );
        Ok((movement, new_stock))
    }

    pub async fn list(
        &self,
        filters: &MovementFilters,
        page: i64,
        page_size: i64,
    ) -> Result<Vec<MovementListItem>, AppError> {
        let (page, page_size) = clamp_paging(page, page_size);
        self.movements.list(filters, page, page_size).await
    }

    /// Agregados para el panel de control.
    pub async fn statistics(&self) -> Result<Statistics, AppError> {
        Ok(Statistics {
            total_products: self.products.count_active().await?,
            total_stock: self.products.total_stock().await?,
            movements_today: self.movements.count_today().await?,
            ingresos_today: self.movements.today_aggregate(MovementKind::Ingreso).await?,
            salidas_today: self.movements.today_aggregate(MovementKind::Salida).await?,
            low_stock_count: self.products.low_stock_count().await?,
        })
    }
}

/// Normaliza la paginación pedida por el cliente. Ambos valores quedan
/// acotados por arriba y por abajo, así el OFFSET derivado nunca desborda.
fn clamp_paging(page: i64, page_size: i64) -> (i64, i64) {
    (page.clamp(1, MAX_PAGE), page_size.clamp(1, MAX_PAGE_SIZE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::PgPool;

    #[test]
    fn la_paginacion_queda_acotada() {
        assert_eq!(clamp_paging(0, 0), (1, 1));
        assert_eq!(clamp_paging(-5, -5), (1, 1));
        assert_eq!(clamp_paging(3, 50), (3, 50));
        assert_eq!(clamp_paging(i64::MAX, i64::MAX), (MAX_PAGE, MAX_PAGE_SIZE));

        // El OFFSET derivado de los valores extremos sigue cabiendo en i64.
        let (page, page_size) = clamp_paging(i64::MAX, i64::MAX);
        assert!((page - 1).checked_mul(page_size).is_some());
    }

    fn service(pool: &PgPool) -> MovementService {
        MovementService::new(
            pool.clone(),
            ProductRepository::new(pool.clone()),
            MovementRepository::new(pool.clone()),
        )
    }

    async fn seed_product(pool: &PgPool, codigo: &str, stock: i32) -> Uuid {
        sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO products (codigo, codigo_norm, nombre, stock)
            VALUES ($1, upper(regexp_replace($1, '[^A-Za-z0-9]', '', 'g')), $2, $3)
            RETURNING id
            "#,
        )
        .bind(codigo)
        .bind(format!("Producto {codigo}"))
        .bind(stock)
        .fetch_one(pool)
        .await
        .unwrap()
    }

    async fn stock_of(pool: &PgPool, id: Uuid) -> i32 {
        sqlx::query_scalar::<_, i32>("SELECT stock FROM products WHERE id = $1")
            .bind(id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[sqlx::test]
    async fn un_ingreso_suma_y_una_salida_excesiva_se_rechaza(pool: PgPool) {
        let svc = service(&pool);
        let product_id = seed_product(&pool, "P-20", 20).await;
        let usuario_id = Uuid::new_v4();

        let (movement, new_stock) = svc
            .register(product_id, MovementKind::Ingreso, 5, Some("compra"), usuario_id)
            .await
            .unwrap();
        assert_eq!(new_stock, 25);
        assert_eq!(movement.cantidad, 5);

        // La salida por más de lo disponible se rechaza informando el stock
        // vigente al momento del rechazo, no el de alguna lectura anterior.
        let err = svc
            .register(product_id, MovementKind::Salida, 30, None, usuario_id)
            .await
            .unwrap_err();
        match err {
            AppError::InsufficientStock { disponible, solicitado } => {
                assert_eq!(disponible, 25);
                assert_eq!(solicitado, 30);
            }
            other => panic!("se esperaba InsufficientStock, llegó {other:?}"),
        }

        // El rechazo no toca el stock ni deja asiento en el libro.
        assert_eq!(stock_of(&pool, product_id).await, 25);
        let asientos = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM movements WHERE product_id = $1",
        )
        .bind(product_id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(asientos, 1);
    }

    #[sqlx::test]
    async fn movimientos_concurrentes_no_pierden_actualizaciones(pool: PgPool) {
        let svc = service(&pool);
        let product_id = seed_product(&pool, "P-10", 10).await;
        let usuario_id = Uuid::new_v4();

        let ingreso = svc.register(product_id, MovementKind::Ingreso, 5, None, usuario_id);
        let salida = svc.register(product_id, MovementKind::Salida, 3, None, usuario_id);
        let (a, b) = tokio::join!(ingreso, salida);
        a.unwrap();
        b.unwrap();

        // 10 + 5 - 3: ninguno de los dos pisó al otro.
        assert_eq!(stock_of(&pool, product_id).await, 12);
    }
}
