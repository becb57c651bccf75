//! HTTP interface consumed by the home-automation host.

pub mod api;
mod middleware;
pub mod router;
