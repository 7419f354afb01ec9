// src/config.rs

use sqlx::{postgres::PgPoolOptions, PgPool};
use std::{env, time::Duration};

use crate::{
    db::{MovementRepository, ProductRepository, SessionRepository},
    services::{MovementService, ProductService, ReconciliationService, SessionService},
};

// El estado compartido, accesible desde todos los handlers.
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub movement_service: MovementService,
    pub session_service: SessionService,
    pub reconciliation_service: ReconciliationService,
    pub product_service: ProductService,
}

impl AppState {
    pub async fn new() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL")?;

        let db_pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&database_url)
            .await?;

        tracing::info!("Conexión con la base de datos establecida");

        // --- Arma el grafo de dependencias ---
        let product_repo = ProductRepository::new(db_pool.clone());
        let movement_repo = MovementRepository::new(db_pool.clone());
        let session_repo = SessionRepository::new(db_pool.clone());

        let movement_service = MovementService::new(
            db_pool.clone(),
            product_repo.clone(),
            movement_repo.clone(),
        );
        let session_service = SessionService::new(
            db_pool.clone(),
            session_repo.clone(),
            product_repo.clone(),
        );
        let reconciliation_service = ReconciliationService::new(
            db_pool.clone(),
            session_repo,
            product_repo.clone(),
        );
        let product_service = ProductService::new(product_repo);

        Ok(Self {
            db_pool,
            movement_service,
            session_service,
            reconciliation_service,
            product_service,
        })
    }
}
