//! Pattern thesis scoring, lifecycle tracking and support/resistance level
//! aggregation for chart-pattern screening.

pub mod business_logic;
pub mod errors;
pub mod models;
pub mod services;
