//! Static geometry pool.
//!
//! Vertex and index data of every mesh are appended into a CPU staging
//! image of one combined buffer, then copied to a device-local buffer in a
//! single upload. After the upload the pool is sealed and its ranges never
//! change.

use std::sync::Arc;
use std::time::Duration;

use bytemuck::Pod;
use tracing::{debug, info};

use ember_rhi::{
    BufferDesc, BufferUsage, CommandRecorder, CopyRegion, GpuBuffer, GpuDevice, GpuFence,
};

use crate::constant_allocator::align_up;
use crate::error::{RendererError, RendererResult};

/// Alignment of every range in the pool.
pub const STATIC_ALIGNMENT: u64 = 16;

/// How long the upload may take before the device is considered lost.
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// A range of the combined static buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticRange {
    pub offset: u64,
    pub size: u64,
    /// Size of one element.
    pub stride: u32,
    /// Number of elements.
    pub count: u32,
}

impl StaticRange {
    #[inline]
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }
}

/// Append-only pool uploaded once.
pub struct StaticGeometryPool<D: GpuDevice> {
    device: Arc<D>,
    capacity: u64,
    staging: Vec<u8>,
    cursor: u64,
    buffer: Option<D::Buffer>,
    sealed: bool,
}

impl<D: GpuDevice> StaticGeometryPool<D> {
    /// Creates an empty pool of `capacity_bytes`.
    pub fn create_once(device: Arc<D>, capacity_bytes: u64) -> RendererResult<Self> {
        if capacity_bytes == 0 {
            return Err(RendererError::InvalidRequest(
                "static geometry pool needs a non-zero capacity".to_string(),
            ));
        }
        debug!("Static geometry pool created ({} bytes)", capacity_bytes);
        Ok(Self {
            device,
            capacity: capacity_bytes,
            staging: Vec::new(),
            cursor: 0,
            buffer: None,
            sealed: false,
        })
    }

    /// Appends vertex data.
    pub fn alloc_vertex_buffer<V: Pod>(&mut self, vertices: &[V]) -> RendererResult<StaticRange> {
        self.append(bytemuck::cast_slice(vertices), size_of::<V>(), vertices.len())
    }

    /// Appends 32-bit indices.
    pub fn alloc_index_buffer(&mut self, indices: &[u32]) -> RendererResult<StaticRange> {
        self.append(bytemuck::cast_slice(indices), size_of::<u32>(), indices.len())
    }

    fn append(&mut self, bytes: &[u8], stride: usize, count: usize) -> RendererResult<StaticRange> {
        if self.sealed {
            return Err(RendererError::PoolSealed);
        }
        let count = u32::try_from(count).map_err(|_| {
            RendererError::InvalidRequest(format!("{count} elements exceed a 32-bit count"))
        })?;

        let offset = align_up(self.cursor, STATIC_ALIGNMENT);
        let size = bytes.len() as u64;
        let end = offset + size;
        if end > self.capacity {
            return Err(RendererError::PoolCapacityExceeded {
                requested: size,
                offset,
                capacity: self.capacity,
            });
        }

        self.staging.resize(end as usize, 0);
        self.staging[offset as usize..end as usize].copy_from_slice(bytes);
        self.cursor = end;

        Ok(StaticRange {
            offset,
            size,
            stride: stride as u32,
            count,
        })
    }

    /// Copies the staged bytes into a device-local buffer and waits for the
    /// copy to finish, then seals the pool.
    ///
    /// `list` must not be recording; it is reset, filled with the copy and
    /// submitted.
    pub fn upload_and_sync(&mut self, list: &mut D::CommandList) -> RendererResult<()> {
        if self.sealed {
            return Err(RendererError::PoolSealed);
        }
        let used = self.cursor;
        if used == 0 {
            self.sealed = true;
            info!("Static geometry pool sealed empty");
            return Ok(());
        }

        let mut upload = self.device.create_buffer(&BufferDesc {
            label: "static geometry upload",
            size: used,
            usage: BufferUsage::Upload,
        })?;
        upload.write(0, &self.staging)?;

        let buffer = self.device.create_buffer(&BufferDesc {
            label: "static geometry",
            size: used,
            usage: BufferUsage::Geometry,
        })?;

        list.begin()?;
        list.insert_marker("static geometry upload");
        list.copy_buffer(
            &upload,
            &buffer,
            CopyRegion {
                src_offset: 0,
                dst_offset: 0,
                size: used,
            },
        );
        list.end()?;
        self.device.submit(list, None)?;

        let fence = self.device.create_fence("static geometry upload")?;
        let value = fence.signal()?;
        fence
            .wait_until(value, UPLOAD_TIMEOUT)
            .map_err(RendererError::from_fence_wait)?;

        // The upload buffer is released here, after the copy completed.
        drop(upload);
        self.staging = Vec::new();
        self.buffer = Some(buffer);
        self.sealed = true;

        info!("Static geometry uploaded ({} bytes)", used);
        Ok(())
    }

    /// The device-local buffer, once uploaded.
    #[inline]
    pub fn buffer(&self) -> Option<&D::Buffer> {
        self.buffer.as_ref()
    }

    #[inline]
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    #[inline]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Bytes appended so far, including alignment padding.
    #[inline]
    pub fn used(&self) -> u64 {
        self.cursor
    }

    /// Staged bytes of `range`, before the upload.
    pub fn staged(&self, range: &StaticRange) -> Option<&[u8]> {
        self.staging.get(range.offset as usize..range.end() as usize)
    }
}
