pub mod camera;
pub mod config;
pub mod constants;
pub mod geometry;
pub mod viewport;
