pub mod movement_repo;
pub mod product_repo;
pub mod session_repo;

pub use movement_repo::MovementRepository;
pub use product_repo::ProductRepository;
pub use session_repo::SessionRepository;
