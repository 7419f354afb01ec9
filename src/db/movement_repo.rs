// src/db/movement_repo.rs

use chrono::NaiveDate;
use sqlx::{Executor, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::movement::{Movement, MovementAggregate, MovementKind, MovementListItem},
};

// Filtros del listado de movimientos. Todos opcionales; el orden es
// siempre created_at DESC.
#[derive(Debug, Default, Clone)]
pub struct MovementFilters {
    pub product_id: Option<Uuid>,
    pub tipo: Option<MovementKind>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

#[derive(Clone)]
pub struct MovementRepository {
    pool: PgPool,
}

impl MovementRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserta un asiento en el libro. No existe UPDATE ni DELETE para esta
    /// tabla: las correcciones se asientan como movimientos opuestos.
    pub async fn insert<'e, E>(
        &self,
        executor: E,
        product_id: Uuid,
        tipo: MovementKind,
        cantidad: i32,
        motivo: Option<&str>,
        usuario_id: Uuid,
    ) -> Result<Movement, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let movement = sqlx::query_as::<_, Movement>(
            r#"
            INSERT INTO movements (product_id, tipo, cantidad, motivo, usuario_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, product_id, tipo, cantidad, motivo, usuario_id, created_at
            "#,
        )
        .bind(product_id)
        .bind(tipo)
        .bind(cantidad)
        .bind(motivo)
        .bind(usuario_id)
        .fetch_one(executor)
        .await?;
        Ok(movement)
    }

    /// Página del libro, más reciente primero, con filtros opcionales.
    pub async fn list(
        &self,
        filters: &MovementFilters,
        page: i64,
        page_size: i64,
    ) -> Result<Vec<MovementListItem>, AppError> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            r#"
            SELECT m.id, m.product_id, p.codigo, p.nombre,
                   m.tipo, m.cantidad, m.motivo, m.usuario_id, m.created_at
            FROM movements m
            JOIN products p ON p.id = m.product_id
            WHERE 1 = 1
            "#,
        );

        if let Some(product_id) = filters.product_id {
            qb.push(" AND m.product_id = ").push_bind(product_id);
        }
        if let Some(tipo) = filters.tipo {
            qb.push(" AND m.tipo = ").push_bind(tipo);
        }
        if let Some(from) = filters.date_from {
            qb.push(" AND m.created_at::date >= ").push_bind(from);
        }
        if let Some(to) = filters.date_to {
            qb.push(" AND m.created_at::date <= ").push_bind(to);
        }

        qb.push(" ORDER BY m.created_at DESC, m.id DESC ");
        qb.push(" LIMIT ").push_bind(page_size);
        qb.push(" OFFSET ").push_bind((page - 1) * page_size);

        let movements = qb
            .build_query_as::<MovementListItem>()
            .fetch_all(&self.pool)
            .await?;
        Ok(movements)
    }

    pub async fn count_today(&self) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM movements WHERE created_at::date = CURRENT_DATE",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Cantidad de asientos y unidades movidas hoy para un tipo dado.
    pub async fn today_aggregate(
        &self,
        tipo: MovementKind,
    ) -> Result<MovementAggregate, AppError> {
        let (count, qty) = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT COUNT(*), COALESCE(SUM(cantidad), 0)
            FROM movements
            WHERE tipo = $1 AND created_at::date = CURRENT_DATE
            "#,
        )
        .bind(tipo)
        .fetch_one(&self.pool)
        .await?;
        Ok(MovementAggregate { count, qty })
    }
}
