//! Backend-neutral value types shared by every [`GpuDevice`](crate::GpuDevice)
//! implementation.

use std::fmt;

/// Width and height of a render target in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent2d {
    pub width: u32,
    pub height: u32,
}

impl Extent2d {
    #[inline]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True when either dimension is zero, as with a minimized window.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Width divided by height, 1.0 for empty extents.
    #[inline]
    pub fn aspect_ratio(&self) -> f32 {
        if self.is_empty() {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }
}

impl fmt::Display for Extent2d {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Viewport rectangle with depth range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    /// Viewport covering the whole extent with a `[0, 1]` depth range.
    pub fn full(extent: Extent2d) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

/// Scissor rectangle in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScissorRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl ScissorRect {
    /// Scissor covering the whole extent.
    pub fn full(extent: Extent2d) -> Self {
        Self {
            x: 0,
            y: 0,
            width: extent.width,
            height: extent.height,
        }
    }
}

/// Logical usage state of a render target.
///
/// Back buffers move `Present -> RenderTarget -> Present` each frame; the
/// depth target moves from `Undefined` to `DepthWrite`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetState {
    Undefined,
    Present,
    RenderTarget,
    DepthWrite,
}

/// Clear values for a pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearValues {
    pub color: [f32; 4],
    pub depth: f32,
    pub stencil: u32,
}

impl ClearValues {
    pub fn with_color(color: [f32; 4]) -> Self {
        Self {
            color,
            depth: 1.0,
            stencil: 0,
        }
    }
}

/// What a buffer is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    /// Device-local vertex and index data, filled by a copy.
    Geometry,
    /// Host-visible uniform data read through dynamic offsets.
    Constants,
    /// Host-visible source of a copy.
    Upload,
    /// Host-visible destination of a copy, for reading results back.
    Readback,
}

impl BufferUsage {
    /// Whether the CPU can map the buffer.
    #[inline]
    pub fn is_host_visible(&self) -> bool {
        !matches!(self, BufferUsage::Geometry)
    }

    pub fn name(&self) -> &'static str {
        match self {
            BufferUsage::Geometry => "Geometry",
            BufferUsage::Constants => "Constants",
            BufferUsage::Upload => "Upload",
            BufferUsage::Readback => "Readback",
        }
    }
}

/// Parameters for [`GpuDevice::create_buffer`](crate::GpuDevice::create_buffer).
#[derive(Debug, Clone, Copy)]
pub struct BufferDesc<'a> {
    pub label: &'a str,
    pub size: u64,
    pub usage: BufferUsage,
}

/// Byte range copied by [`CommandRecorder::copy_buffer`](crate::CommandRecorder::copy_buffer).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyRegion {
    pub src_offset: u64,
    pub dst_offset: u64,
    pub size: u64,
}

/// Pixel formats the harness renders to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Bgra8Srgb,
    Bgra8Unorm,
    Rgba8Srgb,
    Rgba8Unorm,
    Depth32Float,
}

/// Per-vertex attribute formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexFormat {
    Float32x2,
    Float32x3,
    Float32x4,
}

impl VertexFormat {
    pub const fn size(&self) -> u32 {
        match self {
            VertexFormat::Float32x2 => 8,
            VertexFormat::Float32x3 => 12,
            VertexFormat::Float32x4 => 16,
        }
    }
}

/// One attribute of the interleaved vertex layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribute {
    pub location: u32,
    pub format: VertexFormat,
    pub offset: u32,
}

/// Limits the core allocators have to respect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLimits {
    /// Required alignment of dynamic uniform buffer offsets.
    pub min_uniform_offset_alignment: u64,
    /// Largest range a single uniform binding may cover.
    pub max_uniform_range: u64,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            min_uniform_offset_alignment: 256,
            max_uniform_range: 65_536,
        }
    }
}

/// Outcome of presenting a back buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentStatus {
    Presented,
    /// Presented, but the swapchain no longer matches the surface.
    Suboptimal,
    /// Not presented; the swapchain must be recreated.
    OutOfDate,
}

/// Description of the single scene pipeline.
///
/// Constants are bound as two dynamic uniform buffers into
/// `constant_arena`: binding 0 holds per-frame data of
/// `per_frame_size` bytes, binding 1 per-object data of
/// `per_object_size` bytes.
pub struct PipelineDesc<'a, D: crate::GpuDevice> {
    pub label: &'a str,
    pub vertex_spirv: &'a [u8],
    pub fragment_spirv: &'a [u8],
    pub vertex_stride: u32,
    pub vertex_attributes: &'a [VertexAttribute],
    pub color_format: TextureFormat,
    pub depth_format: TextureFormat,
    pub constant_arena: &'a D::Buffer,
    pub per_frame_size: u64,
    pub per_object_size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extent_empty() {
        assert!(Extent2d::new(0, 600).is_empty());
        assert!(Extent2d::new(800, 0).is_empty());
        assert!(!Extent2d::new(800, 600).is_empty());
    }

    #[test]
    fn test_extent_aspect_ratio() {
        assert_eq!(Extent2d::new(1920, 1080).aspect_ratio(), 1920.0 / 1080.0);
        assert_eq!(Extent2d::default().aspect_ratio(), 1.0);
    }

    #[test]
    fn test_full_viewport_and_scissor() {
        let extent = Extent2d::new(800, 600);
        let viewport = Viewport::full(extent);
        assert_eq!(viewport.width, 800.0);
        assert_eq!(viewport.height, 600.0);
        assert_eq!(viewport.max_depth, 1.0);
        assert_eq!(ScissorRect::full(extent).width, 800);
    }

    #[test]
    fn test_host_visibility() {
        assert!(!BufferUsage::Geometry.is_host_visible());
        assert!(BufferUsage::Constants.is_host_visible());
        assert!(BufferUsage::Upload.is_host_visible());
        assert!(BufferUsage::Readback.is_host_visible());
    }
}
