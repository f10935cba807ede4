//! Device-resident scene state.
//!
//! The store owns every buffer derived from constructor input. Each input
//! section is validated and uploaded on its own, so one malformed section
//! never blocks the others; the [`ConstructionReport`] lists what was
//! rejected.

mod report;
mod scene_store;

pub use report::{ConstructionReport, ConstructionWarning, Section};
pub use scene_store::{CameraBuffers, DeviceSceneStore, TopologyBuffers};
