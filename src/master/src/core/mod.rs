pub mod cluster;
pub mod health;
pub mod index;
pub mod node;
pub mod placement;
pub mod repair;
pub mod routes;
pub mod state;
