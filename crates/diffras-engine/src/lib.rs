//! diffras engine crate.
//!
//! Device-resident scene state and pass orchestration for a differentiable
//! triangle rasterizer. The crate owns the mesh adjacency, camera and
//! texture-coordinate buffers, tracks the caller-owned per-iteration buffers,
//! and launches the rasterization and gradient kernels. The kernels
//! themselves are supplied by the caller.

pub mod bindings;
pub mod config;
pub mod device;
pub mod error;
pub mod kernel;
pub mod logging;
pub mod mesh;
pub mod rasterizer;
pub mod scene;
pub mod store;

pub use bindings::{BufferSlot, FrameBindings, PassKind};
pub use config::{AlbedoMode, RasterizerConfig, ShadingMode, ValidationPolicy};
pub use device::{BufferRef, DeviceBackend, HostDevice, OwnedBuffer, WgpuDevice};
pub use error::{DeviceError, RasterError, Result};
pub use kernel::{GradientKernel, KernelInputs, RasterizationKernel, WgslKernel};
pub use mesh::{FaceRange, VertexAdjacency};
pub use rasterizer::Rasterizer;
pub use scene::SceneDescriptor;
pub use store::{ConstructionReport, ConstructionWarning};
