//! GPU compute backend using wgpu.
//!
//! Only dense 2-D GEMM is offloaded; that is where the projection's
//! unfolded convolution spends its time. The shader takes its dimensions
//! from a uniform buffer so one compiled pipeline serves every shape.

use crate::error::{Error, Result};
use ndarray::{s, Array2, ArrayView2, Axis};
use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;
use wgpu::util::DeviceExt;

const WORKGROUP: u32 = 8;

const GEMM_WGSL: &str = r#"
struct Dims {
    m: u32,
    k: u32,
    n: u32,
    _pad: u32,
};

@group(0) @binding(0) var<uniform> dims: Dims;
@group(0) @binding(1) var<storage, read> lhs: array<f32>;
@group(0) @binding(2) var<storage, read> rhs: array<f32>;
@group(0) @binding(3) var<storage, read_write> out: array<f32>;

@compute @workgroup_size(8, 8, 1)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    let row = id.x;
    let col = id.y;
    if (row >= dims.m || col >= dims.n) {
        return;
    }
    var acc = 0.0;
    for (var i = 0u; i < dims.k; i = i + 1u) {
        acc = acc + lhs[row * dims.k + i] * rhs[i * dims.n + col];
    }
    out[row * dims.n + col] = acc;
}
"#;

/// Device, queue and the compiled GEMM pipeline.
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub limits: wgpu::Limits,
    layout: wgpu::BindGroupLayout,
    pipeline: wgpu::ComputePipeline,
}

impl GpuContext {
    fn new() -> Option<Self> {
        pollster::block_on(async {
            let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
            let adapter = instance
                .request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference: wgpu::PowerPreference::HighPerformance,
                    compatible_surface: None,
                    force_fallback_adapter: false,
                })
                .await?;

            tracing::info!(adapter = %adapter.get_info().name, "using GPU adapter");
            let limits = adapter.limits();

            let (device, queue) = adapter
                .request_device(
                    &wgpu::DeviceDescriptor {
                        label: Some("rusty_fuser device"),
                        required_features: wgpu::Features::empty(),
                        required_limits: limits.clone(),
                    },
                    None,
                )
                .await
                .map_err(|e| tracing::warn!(error = %e, "GPU device request failed"))
                .ok()?;

            let (layout, pipeline) = build_gemm_pipeline(&device);
            Some(Self {
                device,
                queue,
                limits,
                layout,
                pipeline,
            })
        })
    }
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn build_gemm_pipeline(device: &wgpu::Device) -> (wgpu::BindGroupLayout, wgpu::ComputePipeline) {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("gemm shader"),
        source: wgpu::ShaderSource::Wgsl(GEMM_WGSL.into()),
    });

    let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("gemm bind group layout"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            storage_entry(1, true),
            storage_entry(2, true),
            storage_entry(3, false),
        ],
    });

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("gemm pipeline layout"),
        bind_group_layouts: &[&layout],
        push_constant_ranges: &[],
    });

    let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some("gemm pipeline"),
        layout: Some(&pipeline_layout),
        module: &shader,
        entry_point: "main",
    });

    (layout, pipeline)
}

/// Lazily initialised on first use; `None` when no adapter is available.
pub static GPU_CONTEXT: Lazy<Option<GpuContext>> = Lazy::new(GpuContext::new);

/// Process-wide switch, off by default. Set by the application at startup.
pub static USE_GPU: AtomicBool = AtomicBool::new(false);

/// Nanoseconds spent waiting on GPU kernels.
pub static TOTAL_GPU_TIME_NS: AtomicU64 = AtomicU64::new(0);

pub fn set_enabled(enabled: bool) {
    USE_GPU.store(enabled, Ordering::Relaxed);
}

/// `a[m, k] x b[k, n]` on the GPU.
///
/// When the right-hand side or the output would exceed the device's storage
/// binding limit, `b` is split into column tiles that are multiplied one at a
/// time and stitched back together on the CPU.
pub fn matmul(
    context: &GpuContext,
    a: ArrayView2<'_, f32>,
    b: ArrayView2<'_, f32>,
) -> Result<Array2<f32>> {
    let limit = context.limits.max_storage_buffer_binding_size as usize;
    matmul_with_limit(context, a, b, limit)
}

fn matmul_with_limit(
    context: &GpuContext,
    a: ArrayView2<'_, f32>,
    b: ArrayView2<'_, f32>,
    limit: usize,
) -> Result<Array2<f32>> {
    let (m, k) = a.dim();
    let (kb, n) = b.dim();
    if k != kb {
        return Err(Error::ShapeMismatch {
            op: "gpu matmul",
            left: vec![m, k],
            right: vec![kb, n],
        });
    }
    if m == 0 || n == 0 || k == 0 {
        return Ok(Array2::zeros((m, n)));
    }

    let n_tile = column_tile(m, k, n, limit)?;
    if n_tile >= n {
        return matmul_tile(context, a, b);
    }

    tracing::debug!(m, k, n, n_tile, "tiling GPU matmul over rhs columns");
    let tiles = (0..n)
        .step_by(n_tile)
        .map(|start| {
            let end = (start + n_tile).min(n);
            matmul_tile(context, a, b.slice(s![.., start..end]))
        })
        .collect::<Result<Vec<_>>>()?;
    let views: Vec<_> = tiles.iter().map(|t| t.view()).collect();
    ndarray::concatenate(Axis(1), &views).map_err(|e| Error::Gpu(e.to_string()))
}

/// Number of rhs columns per dispatch so that both the rhs tile `[k, n_tile]`
/// and the output tile `[m, n_tile]` fit in `limit` bytes.
fn column_tile(m: usize, k: usize, n: usize, limit: usize) -> Result<usize> {
    let f32_bytes = std::mem::size_of::<f32>();
    if m * k * f32_bytes > limit {
        return Err(Error::Gpu(format!(
            "lhs [{m}, {k}] exceeds the {limit} byte binding limit"
        )));
    }
    let bytes_per_column = m.max(k).max(1) * f32_bytes;
    let fits = limit / bytes_per_column;
    if fits == 0 {
        return Err(Error::Gpu(format!(
            "a single column of [{m}, {k}] x [{k}, {n}] exceeds the {limit} byte binding limit"
        )));
    }
    if fits >= n {
        return Ok(n);
    }
    let aligned = (fits / WORKGROUP as usize) * WORKGROUP as usize;
    Ok(if aligned == 0 { fits } else { aligned })
}

fn matmul_tile(
    context: &GpuContext,
    a: ArrayView2<'_, f32>,
    b: ArrayView2<'_, f32>,
) -> Result<Array2<f32>> {
    let (m, k) = a.dim();
    let n = b.ncols();
    let out_bytes = (m * n * std::mem::size_of::<f32>()) as u64;

    let GpuContext {
        device,
        queue,
        layout,
        pipeline,
        ..
    } = context;

    let a = a.as_standard_layout();
    let b = b.as_standard_layout();
    let a_slice = a
        .as_slice()
        .ok_or_else(|| Error::Gpu("lhs is not contiguous".to_string()))?;
    let b_slice = b
        .as_slice()
        .ok_or_else(|| Error::Gpu("rhs is not contiguous".to_string()))?;

    let dims = [m as u32, k as u32, n as u32, 0u32];
    let dims_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("gemm dims"),
        contents: bytemuck::cast_slice(&dims),
        usage: wgpu::BufferUsages::UNIFORM,
    });
    let lhs_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("gemm lhs"),
        contents: bytemuck::cast_slice(a_slice),
        usage: wgpu::BufferUsages::STORAGE,
    });
    let rhs_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("gemm rhs"),
        contents: bytemuck::cast_slice(b_slice),
        usage: wgpu::BufferUsages::STORAGE,
    });
    let out_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("gemm out"),
        size: out_bytes,
        usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        mapped_at_creation: false,
    });
    let staging = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("gemm staging"),
        size: out_bytes,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("gemm bind group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry { binding: 0, resource: dims_buffer.as_entire_binding() },
            wgpu::BindGroupEntry { binding: 1, resource: lhs_buffer.as_entire_binding() },
            wgpu::BindGroupEntry { binding: 2, resource: rhs_buffer.as_entire_binding() },
            wgpu::BindGroupEntry { binding: 3, resource: out_buffer.as_entire_binding() },
        ],
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("gemm encoder"),
    });
    {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("gemm pass"),
            timestamp_writes: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(
            (m as u32).div_ceil(WORKGROUP),
            (n as u32).div_ceil(WORKGROUP),
            1,
        );
    }
    encoder.copy_buffer_to_buffer(&out_buffer, 0, &staging, 0, out_bytes);
    queue.submit(std::iter::once(encoder.finish()));

    let slice = staging.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });

    let wait_start = Instant::now();
    device.poll(wgpu::Maintain::Wait);
    rx.recv()
        .map_err(|e| Error::Gpu(e.to_string()))?
        .map_err(|e| Error::Gpu(e.to_string()))?;
    TOTAL_GPU_TIME_NS.fetch_add(wait_start.elapsed().as_nanos() as u64, Ordering::Relaxed);

    let values: Vec<f32> = {
        let mapped = slice.get_mapped_range();
        bytemuck::cast_slice(&mapped).to_vec()
    };
    staging.unmap();

    Array2::from_shape_vec((m, n), values).map_err(|e| Error::Gpu(e.to_string()))
}
