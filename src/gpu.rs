//! wgpu compute-shader subject: CSR SpMV in single precision.
//!
//! Everything else is declared unsupported through [`Capabilities`], so a
//! sweep against this subject only runs the `mv` cases it can answer.

use crate::dense::{DenseMatrix, Structure, Transform};
use crate::error::{Error, Result};
use crate::provider::{Capabilities, Operation, Subject, Triangle};
use crate::scalar::{ElementType, Scalar};
use crate::sparse::{SparseFormat, SparseMatrix, SparseVector};
use log::{debug, info};
use std::time::Instant;
use wgpu::{
    util::{BufferInitDescriptor, DeviceExt},
    Backends, BindGroupDescriptor, BindGroupEntry, BindGroupLayout, BindGroupLayoutDescriptor,
    BindGroupLayoutEntry, BindingType, Buffer, BufferBindingType, BufferDescriptor, BufferUsages,
    ComputePipeline, ComputePipelineDescriptor, Device, DeviceDescriptor, Features, Instance,
    Maintain, MapMode, PipelineLayoutDescriptor, Queue, ShaderModuleDescriptor,
    ShaderSource, ShaderStages,
};

const WORKGROUP_SIZE: u32 = 64;

pub struct GpuSubject {
    device: Device,
    queue: Queue,
    bind_group_layout: BindGroupLayout,
    pipeline: ComputePipeline,
    adapter_name: String,
}

fn layout_entry(binding: u32, ty: BufferBindingType) -> BindGroupLayoutEntry {
    BindGroupLayoutEntry {
        binding,
        visibility: ShaderStages::COMPUTE,
        ty: BindingType::Buffer {
            ty,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn unsupported<T: Scalar>(operation: &'static str) -> Error {
    Error::Unsupported {
        provider: "wgpu-spmv",
        operation,
        element: T::ELEMENT,
        reason: "only CSR single precision mv is implemented on the device".to_string(),
    }
}

impl GpuSubject {
    /// Acquire an adapter and compile the SpMV pipeline
    pub async fn new() -> Result<Self> {
        let instance = Instance::new(Backends::PRIMARY);
        let adapter = instance
            .request_adapter(&Default::default())
            .await
            .ok_or(Error::NoAdapter)?;
        let adapter_name = adapter.get_info().name;
        let limits = adapter.limits();
        let (device, queue) = adapter
            .request_device(
                &DeviceDescriptor {
                    label: Some("sparse-conformance"),
                    features: Features::empty(),
                    limits,
                },
                None,
            )
            .await?;
        info!("GPU subject on adapter {}", adapter_name);

        let bind_group_layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("spmv"),
            entries: &[
                layout_entry(0, BufferBindingType::Uniform),
                layout_entry(1, BufferBindingType::Storage { read_only: true }),
                layout_entry(2, BufferBindingType::Storage { read_only: true }),
                layout_entry(3, BufferBindingType::Storage { read_only: true }),
                layout_entry(4, BufferBindingType::Storage { read_only: true }),
                layout_entry(5, BufferBindingType::Storage { read_only: false }),
            ],
        });

        let start_instant = Instant::now();
        let module = device.create_shader_module(ShaderModuleDescriptor {
            label: Some("spmv"),
            source: ShaderSource::Wgsl(include_str!("spmv.wgsl").into()),
        });
        debug!("shader compilation {:?}", start_instant.elapsed());

        let pipeline_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some("spmv"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_compute_pipeline(&ComputePipelineDescriptor {
            label: Some("spmv"),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: "main",
        });

        Ok(Self {
            device,
            queue,
            bind_group_layout,
            pipeline,
            adapter_name,
        })
    }

    pub fn new_blocking() -> Result<Self> {
        pollster::block_on(Self::new())
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    fn storage(&self, label: &str, contents: &[u8]) -> Buffer {
        self.device.create_buffer_init(&BufferInitDescriptor {
            label: Some(label),
            contents,
            usage: BufferUsages::STORAGE | BufferUsages::COPY_DST,
        })
    }

    /// `A * x` on the device; `A` has at least one row and one stored entry
    fn spmv(&self, row_ptr: &[u32], col_idx: &[u32], values: &[f32], x: &[f32]) -> Result<Vec<f32>> {
        let nrows = row_ptr.len() - 1;
        let params = [nrows as u32, 0, 0, 0];
        let params_buffer = self.device.create_buffer_init(&BufferInitDescriptor {
            label: Some("params"),
            contents: bytemuck::cast_slice(&params),
            usage: BufferUsages::UNIFORM,
        });
        let row_ptr_buffer = self.storage("row_ptr", bytemuck::cast_slice(row_ptr));
        let col_idx_buffer = self.storage("col_idx", bytemuck::cast_slice(col_idx));
        let values_buffer = self.storage("values", bytemuck::cast_slice(values));
        let x_buffer = self.storage("x", bytemuck::cast_slice(x));

        let size = (nrows * std::mem::size_of::<f32>()) as u64;
        let y_buffer = self.device.create_buffer(&BufferDescriptor {
            label: Some("y"),
            size,
            usage: BufferUsages::STORAGE | BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let output_buffer = self.device.create_buffer(&BufferDescriptor {
            label: Some("y_readback"),
            size,
            usage: BufferUsages::MAP_READ | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group = self.device.create_bind_group(&BindGroupDescriptor {
            label: Some("spmv"),
            layout: &self.bind_group_layout,
            entries: &[
                BindGroupEntry {
                    binding: 0,
                    resource: params_buffer.as_entire_binding(),
                },
                BindGroupEntry {
                    binding: 1,
                    resource: row_ptr_buffer.as_entire_binding(),
                },
                BindGroupEntry {
                    binding: 2,
                    resource: col_idx_buffer.as_entire_binding(),
                },
                BindGroupEntry {
                    binding: 3,
                    resource: values_buffer.as_entire_binding(),
                },
                BindGroupEntry {
                    binding: 4,
                    resource: x_buffer.as_entire_binding(),
                },
                BindGroupEntry {
                    binding: 5,
                    resource: y_buffer.as_entire_binding(),
                },
            ],
        });

        {
            let mut encoder = self.device.create_command_encoder(&Default::default());
            {
                let mut cpass = encoder.begin_compute_pass(&Default::default());
                cpass.set_pipeline(&self.pipeline);
                cpass.set_bind_group(0, &bind_group, &[]);
                cpass.dispatch_workgroups((nrows as u32 + WORKGROUP_SIZE - 1) / WORKGROUP_SIZE, 1, 1);
            }
            encoder.copy_buffer_to_buffer(&y_buffer, 0, &output_buffer, 0, size);
            self.queue.submit(Some(encoder.finish()));
        }

        let buf_slice = output_buffer.slice(..);
        let (sender, receiver) = futures_intrusive::channel::shared::oneshot_channel();
        buf_slice.map_async(MapMode::Read, move |v| {
            let _ = sender.send(v);
        });

        let now = Instant::now();
        self.device.poll(Maintain::Wait);
        debug!("spmv {} rows: {:?} during poll", nrows, now.elapsed());

        match pollster::block_on(receiver.receive()) {
            Some(Ok(())) => {
                let data = {
                    let data_raw = &*buf_slice.get_mapped_range();
                    bytemuck::cast_slice::<u8, f32>(data_raw).to_vec()
                };
                output_buffer.unmap();
                Ok(data)
            }
            Some(Err(err)) => Err(Error::Device(err.to_string())),
            None => Err(Error::Device("could not read data".to_string())),
        }
    }
}

impl Subject for GpuSubject {
    fn name(&self) -> &'static str {
        "wgpu-spmv"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            operations: vec![Operation::MatVec],
            elements: vec![ElementType::F32],
            formats: vec![SparseFormat::Csr],
            transforms: vec![Transform::Identity],
            symmetric_view: false,
            coo_triangular_solve: false,
            complex_adjoint_solve: false,
            transposed_dense_operand: false,
        }
    }

    fn add_diagonal<T: Scalar>(&self, _a: &SparseMatrix<T>, _diag: &[T]) -> Result<SparseMatrix<T>> {
        Err(unsupported::<T>("add_diagonal"))
    }

    fn geam<T: Scalar>(
        &self,
        _alpha: T,
        _a: &SparseMatrix<T>,
        _ta: Transform,
        _beta: T,
        _b: &SparseMatrix<T>,
        _tb: Transform,
    ) -> Result<SparseMatrix<T>> {
        Err(unsupported::<T>("geam"))
    }

    fn axpby<T: Scalar>(&self, _alpha: T, _x: &SparseVector<T>, _beta: T, _y: &mut [T]) -> Result<()> {
        Err(unsupported::<T>("axpby"))
    }

    fn dot<T: Scalar>(&self, _x: &SparseVector<T>, _y: &[T]) -> Result<T> {
        Err(unsupported::<T>("dot"))
    }

    fn dot_rev<T: Scalar>(&self, _y: &[T], _x: &SparseVector<T>) -> Result<T> {
        Err(unsupported::<T>("dot"))
    }

    fn mv<T: Scalar>(
        &self,
        alpha: T,
        a: &SparseMatrix<T>,
        ta: Transform,
        structure: Structure,
        x: &[T],
        beta: T,
        y: &mut [T],
    ) -> Result<()> {
        let csr = match a {
            SparseMatrix::Csr(csr)
                if T::ELEMENT == ElementType::F32
                    && ta == Transform::Identity
                    && structure == Structure::General =>
            {
                csr
            }
            _ => return Err(unsupported::<T>("mv")),
        };
        if x.len() != csr.ncols || y.len() != csr.nrows {
            return Err(Error::ShapeMismatch {
                op: "mv",
                expected: (csr.nrows, csr.ncols),
                got: (y.len(), x.len()),
            });
        }
        let ax = if csr.nrows == 0 || csr.values.is_empty() {
            vec![0.0f32; csr.nrows]
        } else {
            let narrow = |v: &T| v.to_c64().re as f32;
            let row_ptr: Vec<u32> = csr.row_ptr.iter().map(|&p| p as u32).collect();
            let col_idx: Vec<u32> = csr.col_idx.iter().map(|&c| c as u32).collect();
            let values: Vec<f32> = csr.values.iter().map(narrow).collect();
            let xs: Vec<f32> = x.iter().map(narrow).collect();
            self.spmv(&row_ptr, &col_idx, &values, &xs)?
        };
        for (yi, axi) in y.iter_mut().zip(ax) {
            *yi = alpha * T::from_real(axi as f64) + beta * *yi;
        }
        Ok(())
    }

    fn mm<T: Scalar>(
        &self,
        _alpha: T,
        _a: &SparseMatrix<T>,
        _ta: Transform,
        _structure: Structure,
        _b: &DenseMatrix<T>,
        _tb: Transform,
        _beta: T,
        _c: &mut DenseMatrix<T>,
    ) -> Result<()> {
        Err(unsupported::<T>("mm"))
    }

    fn sv<T: Scalar>(
        &self,
        _alpha: T,
        _a: &SparseMatrix<T>,
        _ta: Transform,
        _tri: Triangle,
        _b: &mut [T],
    ) -> Result<()> {
        Err(unsupported::<T>("sv"))
    }

    fn sm<T: Scalar>(
        &self,
        _alpha: T,
        _a: &SparseMatrix<T>,
        _ta: Transform,
        _tri: Triangle,
        _b: &mut DenseMatrix<T>,
    ) -> Result<()> {
        Err(unsupported::<T>("sm"))
    }
}
