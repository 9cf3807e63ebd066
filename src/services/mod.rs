pub mod events;
pub mod level_tracker;
pub mod store;
pub mod summary;
pub mod thesis_tracker;
