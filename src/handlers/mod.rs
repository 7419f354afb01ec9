pub mod movements;
pub mod products;
pub mod sessions;
