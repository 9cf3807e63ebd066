pub mod level;
pub mod pattern;
pub mod snapshot;
