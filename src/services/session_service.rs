// src/services/session_service.rs

use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{ProductRepository, SessionRepository},
    models::{
        product::{normalize_codigo, Location},
        session::{CountLine, InventorySession, SessionDetail, SessionState},
    },
};

// Una sesión de conteo físico: se abre, acumula líneas escaneadas por
// (producto, zona), se cierra y recién entonces puede aplicarse sobre el
// stock (eso es trabajo de ReconciliationService).
#[derive(Clone)]
pub struct SessionService {
    pool: PgPool,
    sessions: SessionRepository,
    products: ProductRepository,
}

impl SessionService {
    pub fn new(pool: PgPool, sessions: SessionRepository, products: ProductRepository) -> Self {
        Self { pool, sessions, products }
    }

    /// Abre una sesión. Regla de una sola sesión abierta a la vez: chequeo
    /// en la aplicación más el índice único parcial como respaldo, así dos
    /// aperturas que corren a la par no pueden colarse las dos.
    pub async fn open(&self, usuario_id: Uuid) -> Result<InventorySession, AppError> {
        if self.sessions.find_open_session().await?.is_some() {
            return Err(AppError::SessionAlreadyOpen);
        }
        let session = self.sessions.insert_session(&self.pool, usuario_id).await?;
        tracing::info!("Sesión de inventario #{} abierta", session.id);
        Ok(session)
    }

    /// Registra un escaneo: resuelve el código, y acumula sobre la línea
    /// (sesión, producto, zona). El primer escaneo congela `stock_actual`
    /// como foto del stock del momento.
    pub async fn scan(
        &self,
        session_id: i64,
        code: &str,
        cantidad: i32,
        zona: Option<Location>,
    ) -> Result<CountLine, AppError> {
        if cantidad < 1 {
            return Err(AppError::BadRequest(
                "La cantidad debe ser un entero mayor o igual a 1.".into(),
            ));
        }
        let codigo_norm = normalize_codigo(code);
        if codigo_norm.is_empty() {
            return Err(AppError::BadRequest("El código escaneado está vacío.".into()));
        }
        let zona = zona.unwrap_or_default();

        let mut tx = self.pool.begin().await?;

        let session = self
            .sessions
            .find_session_for_update(&mut *tx, session_id)
            .await?
            .ok_or(AppError::SessionNotFound)?;
        if session.estado != SessionState::Abierto {
            return Err(AppError::SessionNotOpen);
        }

        // Un código desconocido no crea línea alguna.
        let product = self
            .products
            .find_by_codigo_norm(&mut *tx, &codigo_norm)
            .await?
            .ok_or_else(|| AppError::ProductNotRegistered(codigo_norm.clone()))?;

        let line = self
            .sessions
            .upsert_line(
                &mut *tx,
                session_id,
                product.id,
                &zona.letra_str(),
                zona.numero,
                product.stock,
                cantidad,
            )
            .await?;

        tx.commit().await?;
        Ok(line)
    }

    /// Corrección manual del operador: fija `conteo`, acotado a >= 0.
    pub async fn adjust(
        &self,
        session_id: i64,
        line_id: i64,
        conteo: i32,
    ) -> Result<CountLine, AppError> {
        let conteo = conteo.max(0);

        let mut tx = self.pool.begin().await?;

        let session = self
            .sessions
            .find_session_for_update(&mut *tx, session_id)
            .await?
            .ok_or(AppError::SessionNotFound)?;
        if session.estado != SessionState::Abierto {
            return Err(AppError::SessionNotOpen);
        }

        let line = self
            .sessions
            .set_line_count(&mut *tx, session_id, line_id, conteo)
            .await?
            .ok_or(AppError::LineNotFound)?;

        tx.commit().await?;
        Ok(line)
    }

    /// Elimina una sola línea. No toca el stock.
    pub async fn remove_line(&self, session_id: i64, line_id: i64) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        let session = self
            .sessions
            .find_session_for_update(&mut *tx, session_id)
            .await?
            .ok_or(AppError::SessionNotFound)?;
        if session.estado != SessionState::Abierto {
            return Err(AppError::SessionNotOpen);
        }

        if !self.sessions.delete_line(&mut *tx, session_id, line_id).await? {
            return Err(AppError::LineNotFound);
        }

        tx.commit().await?;
        Ok(())
    }

    /// Cierra la sesión: no se aceptan más escaneos.
    pub async fn close(&self, session_id: i64) -> Result<InventorySession, AppError> {
        let session = self
            .sessions
            .find_session(&self.pool, session_id)
            .await?
            .ok_or(AppError::SessionNotFound)?;
        if session.estado != SessionState::Abierto {
            return Err(AppError::SessionNotOpen);
        }

        // Condicional sobre el estado: si otra petición la cerró primero,
        // el UPDATE no afecta filas.
        if !self.sessions.close_session(&self.pool, session_id).await? {
            return Err(AppError::SessionNotOpen);
        }

        let session = self
            .sessions
            .find_session(&self.pool, session_id)
            .await?
            .ok_or(AppError::SessionNotFound)?;
        tracing::info!("Sesión de inventario #{} cerrada", session.id);
        Ok(session)
    }

    /// Descarta una sesión abierta; las líneas caen en cascada y el stock
    /// queda intacto. Una sesión cerrada o aplicada no se puede eliminar.
    pub async fn delete(&self, session_id: i64) -> Result<(), AppError> {
        let session = self
            .sessions
            .find_session(&self.pool, session_id)
            .await?
            .ok_or(AppError::SessionNotFound)?;
        if session.estado != SessionState::Abierto {
            return Err(AppError::SessionNotOpen);
        }

        if !self.sessions.delete_open_session(&self.pool, session_id).await? {
            return Err(AppError::SessionNotOpen);
        }
        tracing::info!("Sesión de inventario #{} descartada", session_id);
        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<InventorySession>, AppError> {
        self.sessions.list_sessions().await
    }

    pub async fn get(&self, session_id: i64) -> Result<SessionDetail, AppError> {
        let session = self
            .sessions
            .find_session(&self.pool, session_id)
            .await?
            .ok_or(AppError::SessionNotFound)?;
        let lines = self.sessions.lines_for_session(&self.pool, session_id).await?;
        Ok(SessionDetail { session, lines })
    }

    /// Proyección de solo lectura de las líneas, como CSV.
    pub async fn export(&self, session_id: i64) -> Result<Vec<u8>, AppError> {
        let detail = self.get(session_id).await?;

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record(["codigo", "nombre", "ubicacion", "stockActual", "conteo", "diferencia"])
            .map_err(anyhow::Error::from)?;
        for line in &detail.lines {
            let ubicacion = format!("{}{}", line.zona_letra.trim(), line.zona_numero);
            let stock_actual = line.stock_actual.to_string();
            let conteo = line.conteo.to_string();
            let diferencia = line.diferencia.to_string();
            writer
                .write_record([
                    line.codigo.as_str(),
                    line.nombre.as_str(),
                    ubicacion.as_str(),
                    stock_actual.as_str(),
                    conteo.as_str(),
                    diferencia.as_str(),
                ])
                .map_err(anyhow::Error::from)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("No se pudo finalizar el CSV: {e}"))?;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::PgPool;

    fn service(pool: &PgPool) -> SessionService {
        SessionService::new(
            pool.clone(),
            SessionRepository::new(pool.clone()),
            ProductRepository::new(pool.clone()),
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

    #[sqlx::test]
    async fn escaneos_repetidos_acumulan_en_una_sola_linea(pool: PgPool) {
        let svc = service(&pool);
        let product_id = seed_product(&pool, "AB-1", 7).await;
        let session = svc.open(Uuid::new_v4()).await.unwrap();

        // El código llega sin normalizar; las tres pasadas caen en la
        // misma línea (producto, zona).
        for _ in 0..3 {
            svc.scan(session.id, "ab-1", 1, Some("A1".parse().unwrap()))
                .await
                .unwrap();
        }

        let detail = svc.get(session.id).await.unwrap();
        assert_eq!(detail.lines.len(), 1);
        let line = &detail.lines[0];
        assert_eq!(line.product_id, product_id);
        assert_eq!(line.conteo, 3);
        // La foto del stock es la del primer escaneo.
        assert_eq!(line.stock_actual, 7);
        assert_eq!(line.diferencia, 3 - 7);
    }

    #[sqlx::test]
    async fn un_codigo_desconocido_no_deja_linea(pool: PgPool) {
        let svc = service(&pool);
        let session = svc.open(Uuid::new_v4()).await.unwrap();

        let err = svc
            .scan(session.id, "NO-EXISTE", 1, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ProductNotRegistered(_)));

        let detail = svc.get(session.id).await.unwrap();
        assert!(detail.lines.is_empty());
    }

    #[sqlx::test]
    async fn solo_una_sesion_abierta_a_la_vez(pool: PgPool) {
        let svc = service(&pool);
        svc.open(Uuid::new_v4()).await.unwrap();

        let err = svc.open(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::SessionAlreadyOpen));
    }
}
