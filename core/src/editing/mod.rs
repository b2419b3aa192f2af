//! Interactive shape editing: constraints, rotation, drag and draw gestures.

pub mod constraints;
pub mod rotation;
pub mod drag;
pub mod draw;
pub mod measurement;
pub mod session;

pub use constraints::{compute_constrained_vertex, translate_edge, ConstraintError};
pub use rotation::{area_azimuth, rotate_quadrilateral, RotationError, RotationResult};
pub use drag::{DragHandle, DragSession, DragState, TickThrottle};
pub use draw::{DrawError, DrawSession, DrawStep};
pub use measurement::{measure_area, AreaMeasurements, EdgeDimension};
pub use session::{EditError, Editor, EditorOutcome, MapEvent};

#[cfg(test)]
mod tests_editor;
