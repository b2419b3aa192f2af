pub mod registry;
pub use registry::{OverlayElement, OverlayId, OverlayKind, OverlayRegistry};
