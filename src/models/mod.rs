pub mod movement;
pub mod product;
pub mod session;
