// src/bin/migrate.rs
//
// Guardián de evolución del esquema. Herramienta operativa, fuera del
// tráfico normal: lleva una base ya desplegada (posiblemente anterior a la
// función de conteo físico) al esquema actual, de forma idempotente y
// serializada contra sí misma con un advisory lock.
//
// Políticas, distintas de las del servidor:
//   - lock_timeout corto (5s): ante contención se aborta y se informa, no
//     se reintenta.
//   - todo cambio estructural chequea existencia primero; lo ya presente se
//     loguea como no-op para que las repeticiones sean visiblemente
//     idempotentes.
//   - la limpieza destructiva exige opt-in explícito por variable de
//     entorno, con modo dry-run.
//
// Salida: código 0 si todo quedó aplicado; distinto de cero con la
// categoría del error impresa en cualquier otro caso.

use sqlx::{Connection, PgConnection, Row};
use std::env;
use thiserror::Error;

// Clave fija del advisory lock que serializa las corridas del guardián.
const MIGRATION_LOCK_KEY: i64 = 0x414c4d414345; // "ALMACE"

const BACKFILL_BATCH_SIZE: i64 = 500;

pub const ALLOW_DESTRUCTIVE_FLAG: &str = "ALLOW_DESTRUCTIVE_MIGRATION";
pub const DRY_RUN_DESTRUCTIVE_FLAG: &str = "DRY_RUN_DESTRUCTIVE_MIGRATION";

#[derive(Debug, Error)]
enum MigrationError {
    #[error("LOCK: otra migración está en curso (no se pudo tomar el advisory lock en 5s)")]
    LockBusy,

    #[error("CONFIG: {0}")]
    Config(String),

    #[error("STRUCTURAL: {0}")]
    Structural(String),

    #[error("BACKFILL: contención de bloqueos durante el backfill, abortado para reportar: {0}")]
    BackfillContention(sqlx::Error),

    #[error("DESTRUCTIVE: {0}")]
    Destructive(String),

    #[error("DB: {0}")]
    Db(#[from] sqlx::Error),
}

impl MigrationError {
    fn exit_code(&self) -> i32 {
        match self {
            MigrationError::LockBusy => 2,
            MigrationError::Config(_) => 3,
            MigrationError::Structural(_) => 4,
            MigrationError::BackfillContention(_) => 5,
            MigrationError::Destructive(_) => 6,
            MigrationError::Db(_) => 7,
        }
    }
}

fn is_lock_timeout(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .and_then(|d| d.code())
        .as_deref()
        == Some("55P03")
}

/// Interpreta una variable de entorno como bandera booleana.
fn flag_enabled(value: Option<&str>) -> bool {
    matches!(
        value.map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("1") | Some("true") | Some("yes")
    )
}

fn env_flag(name: &str) -> bool {
    flag_enabled(env::var(name).ok().as_deref())
}

// ---
// Chequeos de existencia (catálogos de Postgres)
// ---

async fn table_exists(conn: &mut PgConnection, table: &str) -> Result<bool, MigrationError> {
    let row = sqlx::query(
        "SELECT EXISTS (SELECT 1 FROM information_schema.tables WHERE table_schema = current_schema() AND table_name = $1)",
    )
    .bind(table)
    .fetch_one(&mut *conn)
    .await?;
    Ok(row.get::<bool, _>(0))
}

async fn column_exists(
    conn: &mut PgConnection,
    table: &str,
    column: &str,
) -> Result<bool, MigrationError> {
    let row = sqlx::query(
        "SELECT EXISTS (SELECT 1 FROM information_schema.columns WHERE table_schema = current_schema() AND table_name = $1 AND column_name = $2)",
    )
    .bind(table)
    .bind(column)
    .fetch_one(&mut *conn)
    .await?;
    Ok(row.get::<bool, _>(0))
}

async fn index_exists(conn: &mut PgConnection, name: &str) -> Result<bool, MigrationError> {
    let row = sqlx::query(
        "SELECT EXISTS (SELECT 1 FROM pg_indexes WHERE schemaname = current_schema() AND indexname = $1)",
    )
    .bind(name)
    .fetch_one(&mut *conn)
    .await?;
    Ok(row.get::<bool, _>(0))
}

async fn constraint_exists(
    conn: &mut PgConnection,
    table: &str,
    name: &str,
) -> Result<bool, MigrationError> {
    let row = sqlx::query(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM pg_constraint c
            JOIN pg_class t ON t.oid = c.conrelid
            WHERE t.relname = $1 AND c.conname = $2
        )
        "#,
    )
    .bind(table)
    .bind(name)
    .fetch_one(&mut *conn)
    .await?;
    Ok(row.get::<bool, _>(0))
}

// ---
// Cambios estructurales idempotentes
// ---

async fn add_column_if_missing(
    conn: &mut PgConnection,
    table: &str,
    column: &str,
    ddl: &str,
) -> Result<(), MigrationError> {
    if column_exists(conn, table, column).await? {
        tracing::warn!("columna {table}.{column} ya presente, no-op");
        return Ok(());
    }
    sqlx::query(ddl)
        .execute(&mut *conn)
        .await
        .map_err(|e| MigrationError::Structural(format!("agregando {table}.{column}: {e}")))?;
    tracing::info!("columna {table}.{column} agregada");
    Ok(())
}

async fn create_index_if_missing(
    conn: &mut PgConnection,
    name: &str,
    ddl: &str,
) -> Result<(), MigrationError> {
    if index_exists(conn, name).await? {
        tracing::warn!("índice {name} ya presente, no-op");
        return Ok(());
    }
    sqlx::query(ddl)
        .execute(&mut *conn)
        .await
        .map_err(|e| MigrationError::Structural(format!("creando índice {name}: {e}")))?;
    tracing::info!("índice {name} creado");
    Ok(())
}

async fn add_constraint_if_missing(
    conn: &mut PgConnection,
    table: &str,
    name: &str,
    ddl: &str,
) -> Result<(), MigrationError> {
    if constraint_exists(conn, table, name).await? {
        tracing::warn!("restricción {table}.{name} ya presente, no-op");
        return Ok(());
    }
    sqlx::query(ddl)
        .execute(&mut *conn)
        .await
        .map_err(|e| MigrationError::Structural(format!("agregando restricción {name}: {e}")))?;
    tracing::info!("restricción {table}.{name} agregada");
    Ok(())
}

// ---
// Pasos de la migración
// ---

/// Tablas nuevas que una base anterior a la función de conteo físico no
/// tiene todavía. CREATE TABLE IF NOT EXISTS las hace idempotentes.
async fn ensure_count_tables(conn: &mut PgConnection) -> Result<(), MigrationError> {
    for (table, ddl) in [
        (
            "inventory_sessions",
            r#"
            CREATE TABLE IF NOT EXISTS inventory_sessions (
                id         BIGSERIAL PRIMARY KEY,
                estado     TEXT NOT NULL DEFAULT 'abierto'
                           CHECK (estado IN ('abierto', 'cerrado', 'aplicado')),
                usuario_id UUID NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                closed_at  TIMESTAMPTZ,
                applied_at TIMESTAMPTZ
            )
            "#,
        ),
        (
            "count_lines",
            r#"
            CREATE TABLE IF NOT EXISTS count_lines (
                id           BIGSERIAL PRIMARY KEY,
                session_id   BIGINT NOT NULL REFERENCES inventory_sessions (id) ON DELETE CASCADE,
                product_id   UUID NOT NULL REFERENCES products (id) ON DELETE RESTRICT,
                zona_letra   CHAR(1) NOT NULL CHECK (zona_letra BETWEEN 'A' AND 'H'),
                zona_numero  SMALLINT NOT NULL CHECK (zona_numero IN (1, 2)),
                stock_actual INTEGER NOT NULL,
                conteo       INTEGER NOT NULL CHECK (conteo >= 0),
                diferencia   INTEGER GENERATED ALWAYS AS (conteo - stock_actual) STORED,
                created_at   TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at   TIMESTAMPTZ NOT NULL DEFAULT now(),
                CONSTRAINT uq_count_lines_scan UNIQUE (session_id, product_id, zona_letra, zona_numero)
            )
            "#,
        ),
        (
            "product_locations",
            r#"
            CREATE TABLE IF NOT EXISTS product_locations (
                product_id  UUID NOT NULL REFERENCES products (id) ON DELETE CASCADE,
                zona_letra  CHAR(1) NOT NULL,
                zona_numero SMALLINT NOT NULL,
                stock       INTEGER NOT NULL CHECK (stock >= 0),
                updated_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
                PRIMARY KEY (product_id, zona_letra, zona_numero)
            )
            "#,
        ),
    ] {
        if table_exists(conn, table).await? {
            tracing::warn!("tabla {table} ya presente, no-op");
            continue;
        }
        sqlx::query(ddl)
            .execute(&mut *conn)
            .await
            .map_err(|e| MigrationError::Structural(format!("creando tabla {table}: {e}")))?;
        tracing::info!("tabla {table} creada");
    }
    Ok(())
}

async fn structural_changes(conn: &mut PgConnection) -> Result<(), MigrationError> {
    add_column_if_missing(
        conn,
        "products",
        "codigo_norm",
        "ALTER TABLE products ADD COLUMN codigo_norm TEXT",
    )
    .await?;
    add_column_if_missing(
        conn,
        "products",
        "activo",
        "ALTER TABLE products ADD COLUMN activo BOOLEAN NOT NULL DEFAULT TRUE",
    )
    .await?;
    add_column_if_missing(
        conn,
        "products",
        "zona_letra",
        "ALTER TABLE products ADD COLUMN zona_letra CHAR(1) NOT NULL DEFAULT 'H'",
    )
    .await?;
    add_column_if_missing(
        conn,
        "products",
        "zona_numero",
        "ALTER TABLE products ADD COLUMN zona_numero SMALLINT NOT NULL DEFAULT 1",
    )
    .await?;

    create_index_if_missing(
        conn,
        "idx_products_codigo_norm",
        "CREATE INDEX idx_products_codigo_norm ON products (codigo_norm)",
    )
    .await?;
    create_index_if_missing(
        conn,
        "idx_movements_product_created",
        "CREATE INDEX idx_movements_product_created ON movements (product_id, created_at DESC)",
    )
    .await?;
    // Regla de una sola sesión abierta, a prueba de carreras.
    create_index_if_missing(
        conn,
        "uq_inventory_sessions_abierta",
        "CREATE UNIQUE INDEX uq_inventory_sessions_abierta ON inventory_sessions (estado) WHERE estado = 'abierto'",
    )
    .await?;
    Ok(())
}

/// Backfill de codigo_norm en lotes acotados. Misma proyección que
/// normalize_codigo del servidor: mayúsculas, solo alfanuméricos ASCII.
/// Ante contención de bloqueos se aborta y reporta; esta herramienta corre
/// sin nadie mirando y preferimos un reporte a un reintento infinito.
async fn backfill_codigo_norm(conn: &mut PgConnection) -> Result<u64, MigrationError> {
    let mut total: u64 = 0;
    loop {
        let result = sqlx::query(
            r#"
            UPDATE products
            SET codigo_norm = upper(regexp_replace(codigo, '[^A-Za-z0-9]', '', 'g'))
            WHERE id IN (
                SELECT id FROM products WHERE codigo_norm IS NULL LIMIT $1
            )
            "#,
        )
        .bind(BACKFILL_BATCH_SIZE)
        .execute(&mut *conn)
        .await;

        match result {
            Ok(done) if done.rows_affected() == 0 => break,
            Ok(done) => {
                total += done.rows_affected();
                tracing::info!("backfill codigo_norm: {} filas (acumulado {total})", done.rows_affected());
            }
            Err(e) if is_lock_timeout(&e) => return Err(MigrationError::BackfillContention(e)),
            Err(e) => return Err(e.into()),
        }
    }
    Ok(total)
}

/// Acota datos heredados fuera de invariante ANTES de agregar los CHECK,
/// para que la creación de restricciones no pueda fallar por filas viejas.
async fn sanitize_numeric_data(conn: &mut PgConnection) -> Result<(), MigrationError> {
    for (descr, sql) in [
        ("stock negativo -> 0", "UPDATE products SET stock = 0 WHERE stock < 0"),
        (
            "precios negativos -> 0",
            "UPDATE products SET precio_compra = GREATEST(precio_compra, 0), precio_venta = GREATEST(precio_venta, 0), precio_minimo = GREATEST(precio_minimo, 0) WHERE precio_compra < 0 OR precio_venta < 0 OR precio_minimo < 0",
        ),
        (
            "compra > venta -> compra = venta",
            "UPDATE products SET precio_compra = precio_venta WHERE precio_compra > precio_venta",
        ),
        (
            "mínimo > venta -> mínimo = venta",
            "UPDATE products SET precio_minimo = precio_venta WHERE precio_minimo > precio_venta",
        ),
    ] {
        let done = sqlx::query(sql).execute(&mut *conn).await?;
        if done.rows_affected() > 0 {
            tracing::info!("sanitización ({descr}): {} filas corregidas", done.rows_affected());
        }
    }
    Ok(())
}

async fn numeric_constraints(conn: &mut PgConnection) -> Result<(), MigrationError> {
    add_constraint_if_missing(
        conn,
        "products",
        "chk_products_stock_no_negativo",
        "ALTER TABLE products ADD CONSTRAINT chk_products_stock_no_negativo CHECK (stock >= 0)",
    )
    .await?;
    add_constraint_if_missing(
        conn,
        "products",
        "chk_products_precios_no_negativos",
        "ALTER TABLE products ADD CONSTRAINT chk_products_precios_no_negativos CHECK (precio_compra >= 0 AND precio_venta >= 0 AND precio_minimo >= 0)",
    )
    .await?;
    add_constraint_if_missing(
        conn,
        "products",
        "chk_products_compra_vs_venta",
        "ALTER TABLE products ADD CONSTRAINT chk_products_compra_vs_venta CHECK (precio_compra <= precio_venta)",
    )
    .await?;
    add_constraint_if_missing(
        conn,
        "products",
        "chk_products_minimo_vs_venta",
        "ALTER TABLE products ADD CONSTRAINT chk_products_minimo_vs_venta CHECK (precio_minimo <= precio_venta)",
    )
    .await?;
    add_constraint_if_missing(
        conn,
        "movements",
        "chk_movements_cantidad",
        "ALTER TABLE movements ADD CONSTRAINT chk_movements_cantidad CHECK (cantidad >= 1)",
    )
    .await?;
    add_constraint_if_missing(
        conn,
        "movements",
        "chk_movements_tipo",
        "ALTER TABLE movements ADD CONSTRAINT chk_movements_tipo CHECK (tipo IN ('ingreso', 'salida'))",
    )
    .await?;
    Ok(())
}

async fn foreign_keys(conn: &mut PgConnection) -> Result<(), MigrationError> {
    add_constraint_if_missing(
        conn,
        "movements",
        "fk_movements_product",
        "ALTER TABLE movements ADD CONSTRAINT fk_movements_product FOREIGN KEY (product_id) REFERENCES products (id) ON DELETE RESTRICT",
    )
    .await?;
    add_constraint_if_missing(
        conn,
        "count_lines",
        "fk_count_lines_session",
        "ALTER TABLE count_lines ADD CONSTRAINT fk_count_lines_session FOREIGN KEY (session_id) REFERENCES inventory_sessions (id) ON DELETE CASCADE",
    )
    .await?;
    add_constraint_if_missing(
        conn,
        "count_lines",
        "fk_count_lines_product",
        "ALTER TABLE count_lines ADD CONSTRAINT fk_count_lines_product FOREIGN KEY (product_id) REFERENCES products (id) ON DELETE RESTRICT",
    )
    .await?;
    Ok(())
}

/// Sentencias de limpieza destructiva: huérfanos que solo pueden existir en
/// bases heredadas sin claves foráneas.
fn destructive_statements() -> Vec<&'static str> {
    vec![
        "DELETE FROM count_lines WHERE session_id NOT IN (SELECT id FROM inventory_sessions)",
        "DELETE FROM count_lines WHERE product_id NOT IN (SELECT id FROM products)",
        "DELETE FROM product_locations WHERE product_id NOT IN (SELECT id FROM products)",
    ]
}

async fn destructive_cleanup(conn: &mut PgConnection) -> Result<(), MigrationError> {
    let allow = env_flag(ALLOW_DESTRUCTIVE_FLAG);
    let dry_run = env_flag(DRY_RUN_DESTRUCTIVE_FLAG);

    if !allow && !dry_run {
        tracing::info!(
            "limpieza destructiva omitida (exporte {ALLOW_DESTRUCTIVE_FLAG}=1 para habilitarla)"
        );
        return Ok(());
    }

    for sql in destructive_statements() {
        if dry_run {
            tracing::warn!("dry-run destructivo, NO ejecutado: {sql}");
            continue;
        }
        let done = sqlx::query(sql)
            .execute(&mut *conn)
            .await
            .map_err(|e| MigrationError::Destructive(format!("{sql}: {e}")))?;
        tracing::info!("limpieza destructiva: {} filas ({sql})", done.rows_affected());
    }
    Ok(())
}

// ---
// Orquestación
// ---

async fn run_guarded(conn: &mut PgConnection) -> Result<(), MigrationError> {
    // El guardián exige que el núcleo heredado exista; no inventa un
    // almacén desde cero (para eso están las migraciones base del server).
    for table in ["products", "movements"] {
        if !table_exists(conn, table).await? {
            return Err(MigrationError::Structural(format!(
                "la tabla {table} no existe; esta no parece ser una base del almacén"
            )));
        }
    }

    ensure_count_tables(conn).await?;
    structural_changes(conn).await?;
    let backfilled = backfill_codigo_norm(conn).await?;
    tracing::info!("backfill codigo_norm completo: {backfilled} filas");
    sanitize_numeric_data(conn).await?;
    numeric_constraints(conn).await?;
    foreign_keys(conn).await?;
    destructive_cleanup(conn).await?;
    Ok(())
}

async fn run(conn: &mut PgConnection) -> Result<(), MigrationError> {
    // Falla rápido en vez de colgarse: cualquier espera de bloqueo (incluido
    // el advisory lock) se corta a los 5 segundos.
    sqlx::query("SET lock_timeout = '5s'").execute(&mut *conn).await?;

    match sqlx::query("SELECT pg_advisory_lock($1)")
        .bind(MIGRATION_LOCK_KEY)
        .execute(&mut *conn)
        .await
    {
        Ok(_) => {}
        Err(e) if is_lock_timeout(&e) => return Err(MigrationError::LockBusy),
        Err(e) => return Err(e.into()),
    }
    tracing::info!("advisory lock tomado (clave {MIGRATION_LOCK_KEY})");

    let result = run_guarded(conn).await;

    // El lock se suelta en todos los caminos de salida.
    let unlock = sqlx::query("SELECT pg_advisory_unlock($1)")
        .bind(MIGRATION_LOCK_KEY)
        .execute(&mut *conn)
        .await;
    if let Err(e) = unlock {
        tracing::warn!("no se pudo soltar el advisory lock: {e}");
    }

    result
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_target(false).compact().init();
    dotenvy::dotenv().ok();

    let database_url = match env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("{}", MigrationError::Config("DATABASE_URL no está definida".into()));
            std::process::exit(MigrationError::Config(String::new()).exit_code());
        }
    };

    // Una sola conexión, sin pool: el advisory lock es de sesión y debe
    // vivir y morir con esta conexión.
    let mut conn = match PgConnection::connect(&database_url).await {
        Ok(conn) => conn,
        Err(e) => {
            let err = MigrationError::Db(e);
            eprintln!("{err}");
            std::process::exit(err.exit_code());
        }
    };

    match run(&mut conn).await {
        Ok(()) => {
            tracing::info!("migración completa, esquema al día");
        }
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(e.exit_code());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn banderas_de_entorno() {
        assert!(flag_enabled(Some("1")));
        assert!(flag_enabled(Some("true")));
        assert!(flag_enabled(Some(" YES ")));
        assert!(!flag_enabled(Some("0")));
        assert!(!flag_enabled(Some("false")));
        assert!(!flag_enabled(Some("")));
        assert!(!flag_enabled(None));
    }

    #[test]
    fn codigos_de_salida_por_categoria() {
        assert_eq!(MigrationError::LockBusy.exit_code(), 2);
        assert_eq!(MigrationError::Config("x".into()).exit_code(), 3);
        assert_eq!(MigrationError::Structural("x".into()).exit_code(), 4);
        assert_eq!(MigrationError::Destructive("x".into()).exit_code(), 6);
    }

    #[test]
    fn la_limpieza_destructiva_solo_borra_huerfanos() {
        for sql in destructive_statements() {
            assert!(sql.starts_with("DELETE FROM"));
            assert!(sql.contains("NOT IN"));
        }
    }
}
