pub mod movement_service;
pub mod product_service;
pub mod reconciliation_service;
pub mod session_service;

pub use movement_service::MovementService;
pub use product_service::ProductService;
pub use reconciliation_service::ReconciliationService;
pub use session_service::SessionService;
