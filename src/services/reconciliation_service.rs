// src/services/reconciliation_service.rs

use sqlx::PgPool;

use crate::{
    common::error::AppError,
    db::{ProductRepository, SessionRepository},
    models::session::SessionState,
};

// El motor de conciliación: vuelca un conteo físico cerrado sobre el stock
// autoritativo, exactamente una vez por línea.
#[derive(Clone)]
pub struct ReconciliationService {
    pool: PgPool,
    sessions: SessionRepository,
    products: ProductRepository,
}

impl ReconciliationService {
    pub fn new(pool: PgPool, sessions: SessionRepository, products: ProductRepository) -> Self {
        Self { pool, sessions, products }
    }

    /// Aplica una sesión cerrada. Devuelve cuántas líneas se volcaron.
    ///
    /// Todo corre en una sola transacción: si cualquier línea falla, la
    /// sesión queda en `cerrado` y el operador puede reintentar sin riesgo
    /// de una aplicación a medias. El conteo es autoritativo: un conteo
    /// completo reemplaza lo que el stock haya derivado durante el conteo,
    /// no se suma como delta.
    pub async fn apply(&self, session_id: i64) -> Result<usize, AppError> {
        let mut tx = self.pool.begin().await?;

        // FOR UPDATE: dos Apply concurrentes sobre la misma sesión se
        // serializan acá; el segundo ve el estado ya cambiado.
        let session = self
            .sessions
            .find_session_for_update(&mut *tx, session_id)
            .await?
            .ok_or(AppError::SessionNotFound)?;
        match session.estado {
            SessionState::Cerrado => {}
            SessionState::Aplicado => return Err(AppError::AlreadyApplied),
            SessionState::Abierto => return Err(AppError::SessionNotClosed),
        }

        let lines = self.sessions.lines_for_session(&mut *tx, session_id).await?;

        for line in &lines {
            if !self.products.set_stock(&mut *tx, line.product_id, line.conteo).await? {
                // La FK restringe el borrado de productos contados, así que
                // esto solo puede pasar con datos corruptos.
                return Err(AppError::ProductNotFound);
            }
            self.sessions
                .upsert_product_location(
                    &mut *tx,
                    line.product_id,
                    &line.zona_letra,
                    line.zona_numero,
                    line.conteo,
                )
                .await?;
        }

        if !self.sessions.mark_applied(&mut *tx, session_id).await? {
            return Err(AppError::AlreadyApplied);
        }

        tx.commit().await?;

        tracing::info!(
            "Sesión de inventario #{} aplicada: {} líneas volcadas al stock",
            session_id,
            lines.len()
        );
        Ok(lines.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::session_service::SessionService;
    use sqlx::PgPool;
    use uuid::Uuid;

    fn services(pool: &PgPool) -> (SessionService, ReconciliationService) {
        let sessions = SessionService::new(
            pool.clone(),
            SessionRepository::new(pool.clone()),
            ProductRepository::new(pool.clone()),
        );
        let recon = ReconciliationService::new(
            pool.clone(),
            SessionRepository::new(pool.clone()),
            ProductRepository::new(pool.clone()),
        );
        (sessions, recon)
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
    async fn aplicar_vuelca_el_conteo_y_no_se_repite(pool: PgPool) {
        let (sessions, recon) = services(&pool);
        let product_id = seed_product(&pool, "AB-1", 7).await;

        let session = sessions.open(Uuid::new_v4()).await.unwrap();
        sessions
            .scan(session.id, "AB-1", 1, Some("A1".parse().unwrap()))
            .await
            .unwrap();
        sessions
            .scan(session.id, "AB-1", 1, Some("A1".parse().unwrap()))
            .await
            .unwrap();
        sessions.close(session.id).await.unwrap();

        let applied = recon.apply(session.id).await.unwrap();
        assert_eq!(applied, 1);

        // El conteo es autoritativo: el stock pasa a valer 2, no 7 - 2.
        assert_eq!(stock_of(&pool, product_id).await, 2);

        let loc_stock = sqlx::query_scalar::<_, i32>(
            r#"
            SELECT stock FROM product_locations
            WHERE product_id = $1 AND zona_letra = 'A' AND zona_numero = 1
            "#,
        )
        .bind(product_id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(loc_stock, 2);

        let estado = sqlx::query_scalar::<_, String>(
            "SELECT estado FROM inventory_sessions WHERE id = $1",
        )
        .bind(session.id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(estado, "aplicado");

        // Un segundo Apply no vuelve a escribir nada.
        let err = recon.apply(session.id).await.unwrap_err();
        assert!(matches!(err, AppError::AlreadyApplied));
        assert_eq!(stock_of(&pool, product_id).await, 2);
    }

    #[sqlx::test]
    async fn una_sesion_abierta_no_puede_aplicarse(pool: PgPool) {
        let (sessions, recon) = services(&pool);
        seed_product(&pool, "AB-1", 7).await;

        let session = sessions.open(Uuid::new_v4()).await.unwrap();
        sessions.scan(session.id, "AB-1", 1, None).await.unwrap();

        let err = recon.apply(session.id).await.unwrap_err();
        assert!(matches!(err, AppError::SessionNotClosed));

        // El estado no cambió: cerrar y aplicar después sigue funcionando.
        sessions.close(session.id).await.unwrap();
        assert_eq!(recon.apply(session.id).await.unwrap(), 1);
    }
}
