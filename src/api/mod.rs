//! The HTTP surface: request-scoped state, middleware, the Pipeline Entry
//! handler, response assembly, and router construction.
//!
//! Layout mirrors the teacher's `api::*` module split (`responses`,
//! `middleware`, `handlers`, `routes`) one level down; `state` and `debug` are
//! additions this system needs that the teacher's CRUD API didn't.

pub mod debug;
pub mod handlers;
pub mod middleware;
pub mod responses;
pub mod routes;
pub mod state;
