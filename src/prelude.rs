//! 🖌️欢迎光临🖌️
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::{Idx2d, Idx2dF, Idx3d};

pub use crate::data::slice::{
    CompactLabelSlice, LabelMirror, LabelSlice, LabelSliceMut, OwnedLabelSlice,
};
pub use crate::{DiffVolume, LabelVolume};

pub use crate::consts::label::{BACKGROUND, INTERNAL_FILL};
pub use crate::consts::EPS;

pub use crate::geometry::{ReferencePlane, SliceAxis, VolumeGeometry};

pub use crate::brush::{BrushContour, PaintSession, StrokeFeedback};

pub use crate::interp::{
    interpolate_all, InterpolationRequest, ShapeBasedInterpolation, SliceInterpolator,
};

pub use crate::undo::{GroupId, UndoHistory};

pub use crate::session::{EditSession, SessionError, SessionResult};

pub use crate::task::{BackgroundTask, TaskGate};
