pub mod geometry;
pub mod ids;
pub mod project;
pub mod editing;
pub mod topography;
pub mod overlay;
pub mod config;

pub use config::EditorConfig;
