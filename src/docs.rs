// src/docs.rs

use utoipa::OpenApi;

use crate::handlers;
use crate::models;

#[derive(OpenApi)]
#[openapi(
    paths(
        // --- Movimientos ---
        handlers::movements::register_movement,
        handlers::movements::list_movements,
        handlers::movements::statistics,

        // --- Sesiones de inventario ---
        handlers::sessions::open_session,
        handlers::sessions::list_sessions,
        handlers::sessions::get_session,
        handlers::sessions::scan,
        handlers::sessions::adjust_line,
        handlers::sessions::remove_line,
        handlers::sessions::close_session,
        handlers::sessions::apply_session,
        handlers::sessions::delete_session,
        handlers::sessions::export_session,

        // --- Productos ---
        handlers::products::deactivate_product,
        handlers::products::product_locations,
    ),
    components(
        schemas(
            models::product::Product,
            models::product::ProductLocation,
            models::movement::MovementKind,
            models::movement::Movement,
            models::movement::MovementListItem,
            models::movement::MovementAggregate,
            models::movement::Statistics,
            models::session::SessionState,
            models::session::InventorySession,
            models::session::CountLine,
            models::session::CountLineDetail,
            models::session::SessionDetail,
            handlers::movements::RegisterMovementPayload,
            handlers::movements::MovementResponse,
            handlers::sessions::ScanPayload,
            handlers::sessions::AdjustCountPayload,
        )
    ),
    info(
        title = "API de almacén",
        description = "Libro de movimientos de stock y conciliación de conteos físicos."
    )
)]
pub struct ApiDoc;
