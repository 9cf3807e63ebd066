pub mod config;
pub mod levels;
pub mod lifecycle;
pub mod schema;
pub mod target;
pub mod thesis;
