//! Descriptor and view heap bookkeeping.
//!
//! Views are handed out by bump allocation from four fixed-capacity heaps
//! and never freed. The renderer takes one render-target view per back
//! buffer, one depth view and two constant views at startup and keeps them
//! for its whole lifetime; a resize reuses the slots it already holds.

use std::fmt;

use ember_core::config::HeapConfig;

use crate::error::{RendererError, RendererResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeapKind {
    /// Render-target views
    Rtv,
    /// Depth-stencil views
    Dsv,
    /// Constant, shader-resource and unordered-access views
    CbvSrvUav,
    Sampler,
}

impl HeapKind {
    pub const ALL: [HeapKind; 4] = [
        HeapKind::Rtv,
        HeapKind::Dsv,
        HeapKind::CbvSrvUav,
        HeapKind::Sampler,
    ];

    #[inline]
    const fn index(self) -> usize {
        match self {
            HeapKind::Rtv => 0,
            HeapKind::Dsv => 1,
            HeapKind::CbvSrvUav => 2,
            HeapKind::Sampler => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            HeapKind::Rtv => "RTV",
            HeapKind::Dsv => "DSV",
            HeapKind::CbvSrvUav => "CBV/SRV/UAV",
            HeapKind::Sampler => "Sampler",
        }
    }
}

impl fmt::Display for HeapKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Number of slots per heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapCapacities {
    pub rtv: u32,
    pub dsv: u32,
    pub cbv_srv_uav: u32,
    pub sampler: u32,
}

impl HeapCapacities {
    #[inline]
    pub fn get(&self, heap: HeapKind) -> u32 {
        match heap {
            HeapKind::Rtv => self.rtv,
            HeapKind::Dsv => self.dsv,
            HeapKind::CbvSrvUav => self.cbv_srv_uav,
            HeapKind::Sampler => self.sampler,
        }
    }
}

impl From<&HeapConfig> for HeapCapacities {
    fn from(config: &HeapConfig) -> Self {
        Self {
            rtv: config.rtv,
            dsv: config.dsv,
            cbv_srv_uav: config.cbv_srv_uav,
            sampler: config.sampler,
        }
    }
}

/// A view slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorSlot {
    pub heap: HeapKind,
    pub index: u32,
}

/// The four view heaps.
#[derive(Debug, Clone)]
pub struct ViewHeaps {
    capacities: HeapCapacities,
    allocated: [u32; 4],
}

impl ViewHeaps {
    pub fn new(capacities: HeapCapacities) -> Self {
        Self {
            capacities,
            allocated: [0; 4],
        }
    }

    /// Takes the next free slot of `heap`.
    ///
    /// # Errors
    ///
    /// [`RendererError::HeapExhausted`] once every slot is in use.
    pub fn alloc(&mut self, heap: HeapKind) -> RendererResult<DescriptorSlot> {
        let capacity = self.capacities.get(heap);
        let count = &mut self.allocated[heap.index()];
        if *count >= capacity {
            return Err(RendererError::HeapExhausted { heap, capacity });
        }
        let slot = DescriptorSlot {
            heap,
            index: *count,
        };
        *count += 1;
        Ok(slot)
    }

    #[inline]
    pub fn allocated(&self, heap: HeapKind) -> u32 {
        self.allocated[heap.index()]
    }

    #[inline]
    pub fn capacity(&self, heap: HeapKind) -> u32 {
        self.capacities.get(heap)
    }
}
