//! wgpu backend checks. Skipped, with a note on stderr, when no adapter is
//! available.

use std::num::NonZeroU32;

use diffras_engine::device::{DeviceBackend, DeviceInit, OwnedBuffer, WgpuDevice, read_pod};
use diffras_engine::kernel::{BINDING_ORDER, Binding, DispatchDomain, KernelDescriptor, WgslKernel};
use diffras_engine::store::DeviceSceneStore;
use diffras_engine::{
    BufferSlot, DeviceError, FaceRange, RasterError, Rasterizer, RasterizerConfig,
    SceneDescriptor, ValidationPolicy,
};

/// Any adapter, software first, on `wgpu::Limits::default()`.
fn request_device() -> Option<WgpuDevice> {
    let device = [true, false].into_iter().find_map(|force_fallback_adapter| {
        let init = DeviceInit {
            power_preference: wgpu::PowerPreference::LowPower,
            force_fallback_adapter,
            required_limits: wgpu::Limits::default(),
            ..DeviceInit::default()
        };
        WgpuDevice::new_blocking(init).ok()
    });
    if device.is_none() {
        eprintln!("skipping wgpu test: no adapter available");
    }
    device
}

/// Writes `1.0` into every vertex-position gradient component.
const FILL_GRADIENT: &str = r#"
struct Params {
    vertex_count: u32,
    face_count: u32,
    camera_count: u32,
    frame_width: u32,
    frame_height: u32,
    texture_width: u32,
    texture_height: u32,
    albedo_mode: u32,
    shading_mode: u32,
    image_filter_size: u32,
    texture_filter_size: u32,
    pass_kind: u32,
    invocation_count: u32,
    workgroups_x: u32,
    bound_mask: u32,
    pad: u32,
}

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(16) var<storage, read_write> vertex_pos_grad: array<f32>;

@compute @workgroup_size(64)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let v = gid.y * params.workgroups_x * 64u + gid.x;
    if (v >= params.invocation_count) {
        return;
    }
    vertex_pos_grad[v * 3u] = 1.0;
    vertex_pos_grad[v * 3u + 1u] = 1.0;
    vertex_pos_grad[v * 3u + 2u] = 1.0;
}
"#;

const FILL_BINDINGS: [Binding; 1] = [Binding::Slot(BufferSlot::VertexPosGrad)];

fn fill_gradient(source: &'static str) -> KernelDescriptor<'static> {
    KernelDescriptor {
        name: "fill gradient",
        source,
        entry_point: "main",
        domain: DispatchDomain::Vertices,
        workgroup_size: NonZeroU32::new(64).unwrap(),
        bindings: &FILL_BINDINGS,
    }
}

fn scene() -> SceneDescriptor<'static> {
    SceneDescriptor {
        faces: &[0, 1, 2, 0, 2, 3],
        texture_coordinates: &[0.0; 12],
        vertex_count: 4,
        extrinsics: &[1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0],
        intrinsics: &[4.0, 0.0, 2.0, 0.0, 4.0, 2.0, 0.0, 0.0, 1.0],
        frame_width: 4,
        frame_height: 4,
    }
}

/// Caller-owned buffers for the 4-vertex, 4x4, single-camera scene.
struct Frame {
    vertices: wgpu::Buffer,
    colors: wgpu::Buffer,
    sh: wgpu::Buffer,
    face_ids: wgpu::Buffer,
    barycentrics: wgpu::Buffer,
    render_grad: wgpu::Buffer,
    pos_grad: wgpu::Buffer,
    color_grad: wgpu::Buffer,
    sh_grad: wgpu::Buffer,
}

impl Frame {
    fn new(device: &WgpuDevice) -> Self {
        let zeros = |label, bytes| device.create_buffer(label, bytes).unwrap();
        Self {
            vertices: zeros("vertices", 48),
            colors: zeros("colors", 48),
            sh: zeros("sh", 108),
            face_ids: zeros("face ids", 64),
            barycentrics: zeros("barycentrics", 128),
            render_grad: zeros("render grad", 192),
            pos_grad: zeros("pos grad", 48),
            color_grad: zeros("color grad", 48),
            sh_grad: zeros("sh grad", 108),
        }
    }

    fn wire(&self, r: &mut Rasterizer<WgpuDevice>) {
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

// ── storage ───────────────────────────────────────────────────────────────

#[test]
fn upload_and_read_back() {
    let Some(device) = request_device() else {
        return;
    };

    let data = [1.5f32, -2.0, 3.25];
    let buffer = OwnedBuffer::upload(&device, "roundtrip", &data).unwrap();
    assert_eq!(buffer.read::<f32>().unwrap(), data.to_vec());
}

#[test]
fn store_uploads_vertex_face_ranges() {
    let Some(device) = request_device() else {
        return;
    };

    let store = DeviceSceneStore::new(device, &scene(), ValidationPolicy::Permissive).unwrap();
    let topology = store.topology().unwrap();

    assert_eq!(
        topology.vertex_face_ranges.read::<FaceRange>().unwrap(),
        vec![
            FaceRange { offset: 0, count: 2 },
            FaceRange { offset: 2, count: 1 },
            FaceRange { offset: 3, count: 2 },
            FaceRange { offset: 5, count: 1 },
        ]
    );
    assert_eq!(
        topology.face_of_vertex.read::<u32>().unwrap(),
        vec![0, 1, 0, 0, 1, 1]
    );
}

// ── kernels ───────────────────────────────────────────────────────────────

#[test]
fn gradient_kernel_writes_buffers_wired_per_iteration() {
    let Some(device) = request_device() else {
        return;
    };

    let kernel = WgslKernel::new(&device, &fill_gradient(FILL_GRADIENT)).unwrap();
    let mut r =
        Rasterizer::new(device.clone(), &scene(), RasterizerConfig::default(), kernel).unwrap();

    for _ in 0..2 {
        let frame = Frame::new(&device);
        frame.wire(&mut r);
        r.render_gradient_pass().unwrap();

        let out: Vec<f32> = read_pod(&device, &frame.pos_grad, 12).unwrap();
        assert_eq!(out, vec![1.0; 12]);
    }
}

#[test]
fn invalid_wgsl_is_a_kernel_error() {
    let Some(device) = request_device() else {
        return;
    };

    let err = WgslKernel::new(&device, &fill_gradient("fn main( {")).unwrap_err();
    assert!(matches!(err, DeviceError::KernelLaunch { ref kernel, .. } if kernel == "fill gradient"));
}

#[test]
fn binding_set_beyond_device_limit_is_rejected() {
    let Some(device) = request_device() else {
        return;
    };

    let desc = KernelDescriptor {
        bindings: &BINDING_ORDER,
        ..fill_gradient(FILL_GRADIENT)
    };
    let err = WgslKernel::new(&device, &desc).unwrap_err();
    assert!(matches!(err, DeviceError::KernelLaunch { .. }));
}

#[test]
fn caller_buffer_without_storage_usage_fails_the_pass() {
    let Some(device) = request_device() else {
        return;
    };

    let kernel = WgslKernel::new(&device, &fill_gradient(FILL_GRADIENT)).unwrap();
    let mut r =
        Rasterizer::new(device.clone(), &scene(), RasterizerConfig::default(), kernel).unwrap();

    let frame = Frame::new(&device);
    let copy_only = device.device().create_buffer(&wgpu::BufferDescriptor {
        label: Some("copy-only pos grad"),
        size: 48,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC,
        mapped_at_creation: false,
    });
    frame.wire(&mut r);
    r.set_vertex_pos_grad(&copy_only);

    let err = r.render_gradient_pass().unwrap_err();
    assert!(matches!(
        err,
        RasterError::DeviceExecution(DeviceError::KernelLaunch { .. })
    ));
    assert!(!r.bindings().is_wired(BufferSlot::Vertices));
}
