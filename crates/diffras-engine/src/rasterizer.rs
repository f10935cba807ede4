//! The orchestrator.
//!
//! [`Rasterizer`] owns the scene store and the per-iteration wiring. A training
//! loop wires caller-owned buffers through the setters, then calls
//! [`Rasterizer::render_pass`] and [`Rasterizer::render_gradient_pass`]. Kernel
//! outputs land in caller-owned buffers; nothing is read back here.

use std::fmt;

use crate::bindings::{BufferSlot, FrameBindings, PassKind};
use crate::config::RasterizerConfig;
use crate::device::{BufferRef, DeviceBackend};
use crate::error::{RasterError, Result};
use crate::kernel::{GradientKernel, KernelInputs, RasterizationKernel};
use crate::mesh::VertexAdjacency;
use crate::scene::{SceneDescriptor, SceneDims, TextureSize};
use crate::store::{ConstructionReport, DeviceSceneStore};

/// Differentiable-rasterizer front end for one scene.
///
/// The setters keep a clone of each caller handle; the caller still owns and
/// releases the buffer. The wiring is dropped after each gradient pass, so
/// buffers must be re-wired every iteration.
pub struct Rasterizer<B: DeviceBackend> {
    store: DeviceSceneStore<B>,
    config: RasterizerConfig,
    bindings: FrameBindings<B>,
    gradient_kernel: Box<dyn GradientKernel<B>>,
    rasterization_kernel: Option<Box<dyn RasterizationKernel<B>>>,
}

impl<B: DeviceBackend> Rasterizer<B> {
    /// Builds the scene store on `device` and installs the gradient kernel.
    ///
    /// Validation follows `config.validation`.
    pub fn new(
        device: B,
        desc: &SceneDescriptor<'_>,
        config: RasterizerConfig,
        gradient_kernel: impl GradientKernel<B> + 'static,
    ) -> Result<Self> {
        let store = DeviceSceneStore::new(device, desc, config.validation)?;
        log::info!(
            "rasterizer ready: {} faces, {} vertices, {} cameras at {}x{} ({}, {})",
            store.dims().face_count,
            store.dims().vertex_count,
            store.dims().camera_count,
            store.dims().frame_width,
            store.dims().frame_height,
            config.albedo_mode,
            config.shading_mode,
        );

        Ok(Self {
            store,
            config,
            bindings: FrameBindings::new(),
            gradient_kernel: Box::new(gradient_kernel),
            rasterization_kernel: None,
        })
    }

    /// Installs the forward entry point used by [`render_pass`](Self::render_pass).
    pub fn with_rasterization_kernel(mut self, kernel: impl RasterizationKernel<B> + 'static) -> Self {
        self.rasterization_kernel = Some(Box::new(kernel));
        self
    }

    // ── dimensions ────────────────────────────────────────────────────────

    #[inline]
    pub fn dims(&self) -> &SceneDims {
        self.store.dims()
    }

    #[inline]
    pub fn face_count(&self) -> usize {
        self.dims().face_count
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.dims().vertex_count
    }

    #[inline]
    pub fn camera_count(&self) -> usize {
        self.dims().camera_count
    }

    #[inline]
    pub fn frame_width(&self) -> u32 {
        self.dims().frame_width
    }

    #[inline]
    pub fn frame_height(&self) -> u32 {
        self.dims().frame_height
    }

    #[inline]
    pub fn texture_width(&self) -> u32 {
        self.bindings.texture_size.width
    }

    #[inline]
    pub fn texture_height(&self) -> u32 {
        self.bindings.texture_size.height
    }

    // ── static buffers ────────────────────────────────────────────────────

    pub fn faces(&self) -> Option<BufferRef<'_, B>> {
        self.store.topology().map(|t| t.faces.view())
    }

    pub fn face_of_vertex(&self) -> Option<BufferRef<'_, B>> {
        self.store.topology().map(|t| t.face_of_vertex.view())
    }

    pub fn vertex_face_ranges(&self) -> Option<BufferRef<'_, B>> {
        self.store.topology().map(|t| t.vertex_face_ranges.view())
    }

    pub fn texture_coordinates(&self) -> Option<BufferRef<'_, B>> {
        self.store.texture_coordinates().map(|b| b.view())
    }

    pub fn extrinsics(&self) -> Option<BufferRef<'_, B>> {
        self.store.cameras().map(|c| c.extrinsics.view())
    }

    pub fn intrinsics(&self) -> Option<BufferRef<'_, B>> {
        self.store.cameras().map(|c| c.intrinsics.view())
    }

    /// Wired override if any, otherwise the store-owned storage.
    pub fn vertex_normals(&self) -> Option<BufferRef<'_, B>> {
        self.bindings
            .get(BufferSlot::VertexNormals)
            .or_else(|| self.store.vertex_normals().map(|b| b.view()))
    }

    pub fn face_normals(&self) -> Option<BufferRef<'_, B>> {
        self.store.face_normals().map(|b| b.view())
    }

    // ── host state ────────────────────────────────────────────────────────

    #[inline]
    pub fn adjacency(&self) -> Option<&VertexAdjacency> {
        self.store.adjacency()
    }

    #[inline]
    pub fn report(&self) -> &ConstructionReport {
        self.store.report()
    }

    #[inline]
    pub fn config(&self) -> &RasterizerConfig {
        &self.config
    }

    #[inline]
    pub fn store(&self) -> &DeviceSceneStore<B> {
        &self.store
    }

    #[inline]
    pub fn bindings(&self) -> &FrameBindings<B> {
        &self.bindings
    }

    // ── per-iteration wiring ──────────────────────────────────────────────

    pub fn set_vertices(&mut self, buffer: &B::Buffer) {
        self.bindings.set(BufferSlot::Vertices, buffer);
    }

    pub fn set_vertex_colors(&mut self, buffer: &B::Buffer) {
        self.bindings.set(BufferSlot::VertexColors, buffer);
    }

    /// Overrides the store-owned normal storage until the next gradient pass.
    /// The owned storage is kept.
    pub fn set_vertex_normals(&mut self, buffer: &B::Buffer) {
        self.bindings.set(BufferSlot::VertexNormals, buffer);
    }

    /// `buffer` holds `width * height` RGB texels.
    pub fn set_texture_map(&mut self, buffer: &B::Buffer, width: u32, height: u32) {
        self.bindings.set(BufferSlot::TextureMap, buffer);
        self.bindings.texture_size = TextureSize::new(width, height);
    }

    pub fn set_sh_coefficients(&mut self, buffer: &B::Buffer) {
        self.bindings.set(BufferSlot::ShCoefficients, buffer);
    }

    pub fn set_face_ids(&mut self, buffer: &B::Buffer) {
        self.bindings.set(BufferSlot::FaceIds, buffer);
    }

    pub fn set_barycentrics(&mut self, buffer: &B::Buffer) {
        self.bindings.set(BufferSlot::Barycentrics, buffer);
    }

    pub fn set_render_buffer_grad(&mut self, buffer: &B::Buffer) {
        self.bindings.set(BufferSlot::RenderBufferGrad, buffer);
    }

    pub fn set_vertex_pos_grad(&mut self, buffer: &B::Buffer) {
        self.bindings.set(BufferSlot::VertexPosGrad, buffer);
    }

    pub fn set_vertex_color_grad(&mut self, buffer: &B::Buffer) {
        self.bindings.set(BufferSlot::VertexColorGrad, buffer);
    }

    pub fn set_texture_grad(&mut self, buffer: &B::Buffer) {
        self.bindings.set(BufferSlot::TextureGrad, buffer);
    }

    pub fn set_sh_coeff_grad(&mut self, buffer: &B::Buffer) {
        self.bindings.set(BufferSlot::ShCoeffGrad, buffer);
    }

    // ── passes ────────────────────────────────────────────────────────────

    /// Runs the forward entry point with the current wiring.
    ///
    /// The wiring is kept: the face-ID and barycentric outputs feed the
    /// gradient pass that follows.
    pub fn render_pass(&mut self) -> Result<()> {
        let pass = PassKind::Rasterize;
        let kernel = self
            .rasterization_kernel
            .as_mut()
            .ok_or(RasterError::KernelNotInstalled(pass))?;

        self.bindings
            .validate(self.store.device(), pass, &self.config, self.store.dims())?;
        let inputs = KernelInputs::prepare(pass, &self.store, &self.config, &self.bindings)?;

        log::debug!("launching {} kernel `{}`", pass, kernel.name());
        kernel.rasterize(&inputs)?;
        Ok(())
    }

    /// Runs the gradient entry point, then drops the per-iteration wiring.
    ///
    /// Validation failures leave the wiring untouched so the caller can fix
    /// it and retry. Once the kernel has been launched the wiring is cleared
    /// whether or not it succeeded.
    pub fn render_gradient_pass(&mut self) -> Result<()> {
        let pass = PassKind::Gradient;

        self.bindings
            .validate(self.store.device(), pass, &self.config, self.store.dims())?;
        let launched = {
            let inputs = KernelInputs::prepare(pass, &self.store, &self.config, &self.bindings)?;
            log::debug!("launching {} kernel `{}`", pass, self.gradient_kernel.name());
            self.gradient_kernel.accumulate_gradients(&inputs)
        };

        self.bindings.clear();
        launched?;
        Ok(())
    }
}

impl<B: DeviceBackend> fmt::Debug for Rasterizer<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rasterizer")
            .field("store", &self.store)
            .field("config", &self.config)
            .field("bindings", &self.bindings)
            .field("gradient_kernel", &self.gradient_kernel.name())
            .field(
                "rasterization_kernel",
                &self.rasterization_kernel.as_ref().map(|k| k.name()),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::config::{AlbedoMode, ValidationPolicy};
    use crate::device::{HostBuffer, HostDevice};
    use crate::error::{DeviceError, DeviceResult};
    use crate::store::Section;

    const EXTRINSICS: [f32; 12] = [1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 2.0];
    const INTRINSICS: [f32; 9] = [2.0, 0.0, 1.0, 0.0, 2.0, 1.0, 0.0, 0.0, 1.0];

    /// Counts launches; fails when asked.
    #[derive(Clone, Default)]
    struct Recorder {
        calls: Rc<Cell<usize>>,
        fail: bool,
    }

    impl GradientKernel<HostDevice> for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn accumulate_gradients(&mut self, _: &KernelInputs<'_, HostDevice>) -> DeviceResult<()> {
            self.calls.set(self.calls.get() + 1);
            if self.fail {
                return Err(DeviceError::KernelLaunch {
                    kernel: "recorder".into(),
                    reason: "simulated fault".into(),
                });
            }
            Ok(())
        }
    }

    impl RasterizationKernel<HostDevice> for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn rasterize(&mut self, _: &KernelInputs<'_, HostDevice>) -> DeviceResult<()> {
            self.calls.set(self.calls.get() + 1);
            Ok(())
        }
    }

    fn desc(extrinsics: &[f32]) -> SceneDescriptor<'_> {
        SceneDescriptor {
            faces: &[0, 1, 2],
            texture_coordinates: &[0.0, 0.0, 1.0, 0.0, 0.0, 1.0],
            vertex_count: 3,
            extrinsics,
            intrinsics: &INTRINSICS,
            frame_width: 2,
            frame_height: 2,
        }
    }

    /// Caller-owned buffers for a 3-vertex, 2x2, single-camera scene.
    struct Frame {
        vertices: HostBuffer,
        colors: HostBuffer,
        sh: HostBuffer,
        face_ids: HostBuffer,
        barycentrics: HostBuffer,
        render_grad: HostBuffer,
        pos_grad: HostBuffer,
        color_grad: HostBuffer,
        sh_grad: HostBuffer,
    }

    impl Frame {
        fn new(device: &HostDevice) -> Self {
            let buf = |label, size| device.create_buffer(label, size).unwrap();
            Self {
                vertices: buf("vertices", 36),
                colors: buf("colors", 36),
                sh: buf("sh", 108),
                face_ids: buf("face ids", 16),
                barycentrics: buf("barycentrics", 32),
                render_grad: buf("render grad", 48),
                pos_grad: buf("pos grad", 36),
                color_grad: buf("color grad", 36),
                sh_grad: buf("sh grad", 108),
            }
        }

        fn wire(&self, r: &mut Rasterizer<HostDevice>) {
            r.set_vertices(&self.vertices);
            r.set_vertex_colors(&self.colors);
            r.set_sh_coefficients(&self.sh);
            r.set_face_ids(&self.face_ids);
            r.set_barycentrics(&self.barycentrics);
            r.set_render_buffer_grad(&self.render_grad);
            r.set_vertex_pos_grad(&self.pos_grad);
            r.set_vertex_color_grad(&self.color_grad);
            r.set_sh_coeff_grad(&self.sh_grad);
        }
    }

    // ── accessors ─────────────────────────────────────────────────────────

    #[test]
    fn dimensions_round_trip() {
        let device = HostDevice::new();
        let r = Rasterizer::new(
            device,
            &desc(&EXTRINSICS),
            RasterizerConfig::default(),
            Recorder::default(),
        )
        .unwrap();

        assert_eq!(r.face_count(), 1);
        assert_eq!(r.vertex_count(), 3);
        assert_eq!(r.camera_count(), 1);
        assert_eq!((r.frame_width(), r.frame_height()), (2, 2));
        assert!(r.faces().is_some());
        assert!(r.extrinsics().is_some());
        assert!(r.report().is_clean());
    }

    #[test]
    fn texture_size_follows_texture_map() {
        let device = HostDevice::new();
        let texture = device.create_buffer("texture", 4 * 2 * 12).unwrap();
        let mut r = Rasterizer::new(
            device.clone(),
            &desc(&EXTRINSICS),
            RasterizerConfig::default(),
            Recorder::default(),
        )
        .unwrap();
        r.set_texture_map(&texture, 4, 2);
        assert_eq!((r.texture_width(), r.texture_height()), (4, 2));
    }

    #[test]
    fn vertex_normal_override_keeps_owned_storage() {
        let device = HostDevice::new();
        let normals = device.create_buffer("normals", 36).unwrap();
        let mut r = Rasterizer::new(
            device.clone(),
            &desc(&EXTRINSICS),
            RasterizerConfig::default(),
            Recorder::default(),
        )
        .unwrap();
        let live = device.live_count();

        r.set_vertex_normals(&normals);
        assert_eq!(r.vertex_normals().unwrap().raw().id(), normals.id());
        assert!(r.store().vertex_normals().is_some());
        assert_eq!(device.live_count(), live);
    }

    // ── gradient pass ─────────────────────────────────────────────────────

    #[test]
    fn gradient_pass_launches_and_clears_wiring() {
        let device = HostDevice::new();
        let frame = Frame::new(&device);
        let kernel = Recorder::default();
        let calls = kernel.calls.clone();
        let mut r =
            Rasterizer::new(device, &desc(&EXTRINSICS), RasterizerConfig::default(), kernel)
                .unwrap();

        frame.wire(&mut r);
        r.render_gradient_pass().unwrap();
        assert_eq!(calls.get(), 1);
        for slot in BufferSlot::ALL {
            assert!(!r.bindings().is_wired(slot), "{slot} still wired");
        }

        let err = r.render_gradient_pass().unwrap_err();
        assert!(matches!(
            err,
            RasterError::UnwiredBuffer {
                slot: BufferSlot::Vertices,
                ..
            }
        ));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn buffers_allocated_per_iteration_can_be_wired() {
        let device = HostDevice::new();
        let kernel = Recorder::default();
        let calls = kernel.calls.clone();
        let mut r = Rasterizer::new(
            device.clone(),
            &desc(&EXTRINSICS),
            RasterizerConfig::default(),
            kernel,
        )
        .unwrap();

        for _ in 0..2 {
            let frame = Frame::new(&device);
            frame.wire(&mut r);
            r.render_gradient_pass().unwrap();
        }
        assert_eq!(calls.get(), 2);
        assert!(!r.bindings().is_wired(BufferSlot::Vertices));
    }

    #[test]
    fn validation_failure_keeps_wiring() {
        let device = HostDevice::new();
        let frame = Frame::new(&device);
        let kernel = Recorder::default();
        let calls = kernel.calls.clone();
        let mut r =
            Rasterizer::new(device, &desc(&EXTRINSICS), RasterizerConfig::default(), kernel)
                .unwrap();

        r.set_vertices(&frame.vertices);
        let err = r.render_gradient_pass().unwrap_err();
        assert!(matches!(
            err,
            RasterError::UnwiredBuffer {
                slot: BufferSlot::VertexColors,
                pass: PassKind::Gradient
            }
        ));
        assert!(r.bindings().is_wired(BufferSlot::Vertices));
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn kernel_fault_is_reported_and_clears_wiring() {
        let device = HostDevice::new();
        let frame = Frame::new(&device);
        let kernel = Recorder {
            fail: true,
            ..Recorder::default()
        };
        let mut r =
            Rasterizer::new(device, &desc(&EXTRINSICS), RasterizerConfig::default(), kernel)
                .unwrap();

        frame.wire(&mut r);
        let err = r.render_gradient_pass().unwrap_err();
        assert!(matches!(
            err,
            RasterError::DeviceExecution(DeviceError::KernelLaunch { .. })
        ));
        assert!(!r.bindings().is_wired(BufferSlot::Vertices));
    }

    #[test]
    fn rejected_cameras_block_the_pass() {
        let device = HostDevice::new();
        let frame = Frame::new(&device);
        let kernel = Recorder::default();
        let calls = kernel.calls.clone();
        let mut r = Rasterizer::new(
            device,
            &desc(&EXTRINSICS[..11]),
            RasterizerConfig::default(),
            kernel,
        )
        .unwrap();

        // camera_count is 0, so every per-pixel size requirement is trivially met
        frame.wire(&mut r);
        let err = r.render_gradient_pass().unwrap_err();
        assert!(matches!(
            err,
            RasterError::SectionUnavailable {
                section: Section::Cameras,
                ..
            }
        ));
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn strict_policy_fails_construction() {
        let device = HostDevice::new();
        let config = RasterizerConfig {
            validation: ValidationPolicy::Strict,
            ..RasterizerConfig::default()
        };
        let err = Rasterizer::new(device, &desc(&EXTRINSICS[..11]), config, Recorder::default())
            .unwrap_err();
        assert!(matches!(err, RasterError::MalformedInput(_)));
    }

    // ── forward pass ──────────────────────────────────────────────────────

    #[test]
    fn render_pass_requires_a_kernel() {
        let device = HostDevice::new();
        let mut r = Rasterizer::new(
            device,
            &desc(&EXTRINSICS),
            RasterizerConfig::default(),
            Recorder::default(),
        )
        .unwrap();
        assert!(matches!(
            r.render_pass().unwrap_err(),
            RasterError::KernelNotInstalled(PassKind::Rasterize)
        ));
    }

    #[test]
    fn render_pass_keeps_wiring_for_the_gradient_pass() {
        let device = HostDevice::new();
        let frame = Frame::new(&device);
        let forward = Recorder::default();
        let forward_calls = forward.calls.clone();
        let backward = Recorder::default();
        let backward_calls = backward.calls.clone();
        let mut r = Rasterizer::new(
            device,
            &desc(&EXTRINSICS),
            RasterizerConfig::default(),
            backward,
        )
        .unwrap()
        .with_rasterization_kernel(forward);

        frame.wire(&mut r);
        r.render_pass().unwrap();
        assert!(r.bindings().is_wired(BufferSlot::FaceIds));
        r.render_gradient_pass().unwrap();
        assert_eq!((forward_calls.get(), backward_calls.get()), (1, 1));
    }

    #[test]
    fn textured_mode_requires_texture_map() {
        let device = HostDevice::new();
        let frame = Frame::new(&device);
        let config = RasterizerConfig {
            albedo_mode: AlbedoMode::Textured,
            ..RasterizerConfig::default()
        };
        let mut r = Rasterizer::new(device, &desc(&EXTRINSICS), config, Recorder::default())
            .unwrap()
            .with_rasterization_kernel(Recorder::default());

        frame.wire(&mut r);
        let err = r.render_pass().unwrap_err();
        assert!(matches!(
            err,
            RasterError::UnwiredBuffer {
                slot: BufferSlot::TextureMap,
                pass: PassKind::Rasterize
            }
        ));
    }
}
