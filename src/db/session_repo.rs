// src/db/session_repo.rs

use sqlx::{Executor, PgPool, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::session::{CountLine, CountLineDetail, InventorySession},
};

const SESSION_COLUMNS: &str = "id, estado, usuario_id, created_at, closed_at, applied_at";
const LINE_COLUMNS: &str =
    "id, session_id, product_id, zona_letra, zona_numero, stock_actual, conteo, diferencia, created_at, updated_at";

#[derive(Clone)]
pub struct SessionRepository {
    pool: PgPool,
}

impl SessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // ---
    // Sesiones
    // ---

    /// Abre una sesión nueva. El índice único parcial sobre estado='abierto'
    /// es la red de seguridad contra dos aperturas concurrentes: si otra
    /// sesión ganó la carrera, la violación de unicidad se traduce aquí.
    pub async fn insert_session<'e, E>(
        &self,
        executor: E,
        usuario_id: Uuid,
    ) -> Result<InventorySession, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_as::<_, InventorySession>(&format!(
            "INSERT INTO inventory_sessions (estado, usuario_id) VALUES ('abierto', $1) RETURNING {SESSION_COLUMNS}"
        ))
        .bind(usuario_id)
        .fetch_one(executor)
        .await
        .map_err(|e| {
            if let Some(db_err) = e.as_database_error() {
                if db_err.is_unique_violation() {
                    return AppError::SessionAlreadyOpen;
                }
            }
            e.into()
        })
    }

    pub async fn find_session<'e, E>(
        &self,
        executor: E,
        id: i64,
    ) -> Result<Option<InventorySession>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let session = sqlx::query_as::<_, InventorySession>(&format!(
            "SELECT {SESSION_COLUMNS} FROM inventory_sessions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(executor)
        .await?;
        Ok(session)
    }

    /// Toma la fila de la sesión con FOR UPDATE: serializa escaneos, cierre
    /// y aplicación contra la misma sesión.
    pub async fn find_session_for_update<'e, E>(
        &self,
        executor: E,
        id: i64,
    ) -> Result<Option<InventorySession>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let session = sqlx::query_as::<_, InventorySession>(&format!(
            "SELECT {SESSION_COLUMNS} FROM inventory_sessions WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(executor)
        .await?;
        Ok(session)
    }

    pub async fn find_open_session(&self) -> Result<Option<InventorySession>, AppError> {
        let session = sqlx::query_as::<_, InventorySession>(&format!(
            "SELECT {SESSION_COLUMNS} FROM inventory_sessions WHERE estado = 'abierto' LIMIT 1"
        ))
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }

    pub async fn list_sessions(&self) -> Result<Vec<InventorySession>, AppError> {
        let sessions = sqlx::query_as::<_, InventorySession>(&format!(
            "SELECT {SESSION_COLUMNS} FROM inventory_sessions ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(sessions)
    }

    /// Transición abierto -> cerrado. Condicional sobre el estado actual:
    /// devuelve false si la sesión ya no estaba abierta.
    pub async fn close_session<'e, E>(&self, executor: E, id: i64) -> Result<bool, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query(
            "UPDATE inventory_sessions SET estado = 'cerrado', closed_at = now() WHERE id = $1 AND estado = 'abierto'",
        )
        .bind(id)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Transición cerrado -> aplicado, condicional. Si devuelve false la
    /// sesión ya fue aplicada por otra transacción y el llamador debe
    /// abortar la suya.
    pub async fn mark_applied<'e, E>(&self, executor: E, id: i64) -> Result<bool, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query(
            "UPDATE inventory_sessions SET estado = 'aplicado', applied_at = now() WHERE id = $1 AND estado = 'cerrado'",
        )
        .bind(id)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Descarta una sesión abierta. El borrado cascadea a sus líneas.
    pub async fn delete_open_session<'e, E>(&self, executor: E, id: i64) -> Result<bool, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query(
            "DELETE FROM inventory_sessions WHERE id = $1 AND estado = 'abierto'",
        )
        .bind(id)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    // ---
    // Líneas de conteo
    // ---

    /// Upsert de una línea, clave (sesión, producto, zona). El primer escaneo
    /// crea la línea con la foto del stock; los siguientes solo acumulan
    /// sobre `conteo`. `diferencia` es columna generada, se recalcula sola.
    pub async fn upsert_line<'e, E>(
        &self,
        executor: E,
        session_id: i64,
        product_id: Uuid,
        zona_letra: &str,
        zona_numero: i16,
        stock_actual: i32,
        cantidad: i32,
    ) -> Result<CountLine, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let line = sqlx::query_as::<_, CountLine>(&format!(
            r#"
            INSERT INTO count_lines (session_id, product_id, zona_letra, zona_numero, stock_actual, conteo)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (session_id, product_id, zona_letra, zona_numero)
            DO UPDATE SET conteo = count_lines.conteo + EXCLUDED.conteo, updated_at = now()
            RETURNING {LINE_COLUMNS}
            "#
        ))
        .bind(session_id)
        .bind(product_id)
        .bind(zona_letra)
        .bind(zona_numero)
        .bind(stock_actual)
        .bind(cantidad)
        .fetch_one(executor)
        .await?;
        Ok(line)
    }

    /// Fija `conteo` a un valor absoluto (corrección manual del operador).
    pub async fn set_line_count<'e, E>(
        &self,
        executor: E,
        session_id: i64,
        line_id: i64,
        conteo: i32,
    ) -> Result<Option<CountLine>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let line = sqlx::query_as::<_, CountLine>(&format!(
            r#"
            UPDATE count_lines SET conteo = $3, updated_at = now()
            WHERE id = $2 AND session_id = $1
            RETURNING {LINE_COLUMNS}
            "#
        ))
        .bind(session_id)
        .bind(line_id)
        .bind(conteo)
        .fetch_optional(executor)
        .await?;
        Ok(line)
    }

    pub async fn delete_line<'e, E>(
        &self,
        executor: E,
        session_id: i64,
        line_id: i64,
    ) -> Result<bool, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query("DELETE FROM count_lines WHERE id = $2 AND session_id = $1")
            .bind(session_id)
            .bind(line_id)
            .execute(executor)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Líneas de una sesión con el producto resuelto, ordenadas por zona.
    pub async fn lines_for_session<'e, E>(
        &self,
        executor: E,
        session_id: i64,
    ) -> Result<Vec<CountLineDetail>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let lines = sqlx::query_as::<_, CountLineDetail>(
            r#"
            SELECT l.id, l.session_id, l.product_id, p.codigo, p.nombre,
                   l.zona_letra, l.zona_numero, l.stock_actual, l.conteo, l.diferencia
            FROM count_lines l
            JOIN products p ON p.id = l.product_id
            WHERE l.session_id = $1
            ORDER BY l.zona_letra, l.zona_numero, p.codigo
            "#,
        )
        .bind(session_id)
        .fetch_all(executor)
        .await?;
        Ok(lines)
    }

    // ---
    // Stock por ubicación
    // ---

    /// Al aplicar un conteo, cada línea fija el saldo de su (producto, zona).
    pub async fn upsert_product_location<'e, E>(
        &self,
        executor: E,
        product_id: Uuid,
        zona_letra: &str,
        zona_numero: i16,
        stock: i32,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            r#"
            INSERT INTO product_locations (product_id, zona_letra, zona_numero, stock)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (product_id, zona_letra, zona_numero)
            DO UPDATE SET stock = EXCLUDED.stock, updated_at = now()
            "#,
        )
        .bind(product_id)
        .bind(zona_letra)
        .bind(zona_numero)
        .bind(stock)
        .execute(executor)
        .await?;
        Ok(())
    }
}
