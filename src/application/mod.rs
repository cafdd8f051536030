//! Publish pipeline services and the ports they depend on.

pub mod artifacts;
pub mod delivery;
pub mod error;
pub mod plans;
pub mod publish;
pub mod render;
pub mod repos;
pub mod retention;
pub mod routes;
