// src/main.rs

use axum::{
    routing::{get, post},
    Json, Router,
};
use tokio::net::TcpListener;
use utoipa::OpenApi;

mod common;
mod config;
mod db;
mod docs;
mod handlers;
mod middleware;
mod models;
mod services;

use crate::config::AppState;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_target(false).compact().init();

    // .expect() está bien acá: si la configuración falla, la aplicación
    // no debe arrancar.
    let app_state = AppState::new()
        .await
        .expect("Fallo al inicializar el estado de la aplicación.");

    // Esquema base para instalaciones nuevas. La evolución de bases ya
    // desplegadas corre aparte, con el binario `migrate`.
    sqlx::migrate!()
        .run(&app_state.db_pool)
        .await
        .expect("Fallo al correr las migraciones de la base de datos.");

    tracing::info!("Migraciones de la base de datos ejecutadas");

    let movement_routes = Router::new()
        .route(
            "/",
            post(handlers::movements::register_movement).get(handlers::movements::list_movements),
        )
        .route("/statistics", get(handlers::movements::statistics));

    let session_routes = Router::new()
        .route(
            "/",
            post(handlers::sessions::open_session).get(handlers::sessions::list_sessions),
        )
        .route(
            "/{id}",
            get(handlers::sessions::get_session).delete(handlers::sessions::delete_session),
        )
        .route("/{id}/lines", post(handlers::sessions::scan))
        .route(
            "/{id}/lines/{line_id}",
            axum::routing::patch(handlers::sessions::adjust_line)
                .delete(handlers::sessions::remove_line),
        )
        .route("/{id}/close", post(handlers::sessions::close_session))
        .route("/{id}/apply", post(handlers::sessions::apply_session))
        .route("/{id}/export", get(handlers::sessions::export_session));

    let product_routes = Router::new()
        .route(
            "/{id}",
            axum::routing::delete(handlers::products::deactivate_product),
        )
        .route(
            "/{id}/locations",
            get(handlers::products::product_locations),
        );

    // Combina todo en el router principal
    let app = Router::new()
        .route("/api/health", get(|| async { "OK" }))
        .route(
            "/api/docs/openapi.json",
            get(|| async { Json(docs::ApiDoc::openapi()) }),
        )
        .nest("/api/movements", movement_routes)
        .nest("/api/sessions", session_routes)
        .nest("/api/products", product_routes)
        .with_state(app_state);

    // Inicia el servidor
    let addr = "0.0.0.0:3000";
    let listener = TcpListener::bind(addr)
        .await
        .expect("Fallo al iniciar el listener TCP");
    tracing::info!("Servidor escuchando en {}", listener.local_addr().unwrap());
    axum::serve(listener, app).await.expect("Error en el servidor Axum");
}
