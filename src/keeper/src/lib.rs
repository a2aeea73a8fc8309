pub mod health;
pub mod inbound;
pub mod membership;
pub mod receiver;
pub mod routes;
pub mod state;
pub mod store;
