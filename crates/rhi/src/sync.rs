//! Synchronization primitives for Vulkan.
//!
//! - [`Semaphore`] - binary semaphore for GPU-to-GPU ordering (acquire and
//!   present).
//! - [`TimelineFence`] - timeline semaphore exposed as a monotonically
//!   increasing fence value for GPU-to-CPU waits.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use ember_rhi::device::Device;
//! use ember_rhi::sync::TimelineFence;
//! use ember_rhi::GpuFence;
//!
//! # fn example(device: Arc<Device>) -> Result<(), ember_rhi::RhiError> {
//! let fence = TimelineFence::new(device, "frame")?;
//!
//! // ... submit GPU work ...
//! let value = fence.signal()?;
//! fence.wait_until(value, Duration::from_secs(5))?;
//! # Ok(())
//! # }
//! ```

use std::sync::{Arc, Mutex};
use std::time::Duration;

use ash::vk;
use tracing::{debug, trace};

use crate::backend::GpuFence;
use crate::device::{Device, map_device_lost};
use crate::error::{RhiError, RhiResult};

/// Vulkan binary semaphore wrapper.
///
/// # Thread Safety
///
/// The semaphore is immutable after creation and can be shared between
/// threads.
pub struct Semaphore {
    device: Arc<Device>,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Creates an unsignaled binary semaphore.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::default();
        let semaphore = unsafe { device.handle().create_semaphore(&create_info, None)? };

        Ok(Self { device, semaphore })
    }

    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_semaphore(self.semaphore, None);
        }
    }
}

/// Timeline-semaphore fence.
///
/// [`signal`](GpuFence::signal) enqueues a signal of the next value on the
/// graphics queue, after everything submitted before it. The counter only
/// ever grows, so "value N completed" implies every value below N completed.
pub struct TimelineFence {
    device: Arc<Device>,
    semaphore: vk::Semaphore,
    last_signaled: Mutex<u64>,
    label: String,
}

impl TimelineFence {
    /// Creates a timeline fence starting at zero.
    pub fn new(device: Arc<Device>, label: &str) -> RhiResult<Self> {
        let mut type_info = vk::SemaphoreTypeCreateInfo::default()
            .semaphore_type(vk::SemaphoreType::TIMELINE)
            .initial_value(0);
        let create_info = vk::SemaphoreCreateInfo::default().push_next(&mut type_info);

        let semaphore = unsafe { device.handle().create_semaphore(&create_info, None)? };
        debug!("Created timeline fence '{}'", label);

        Ok(Self {
            device,
            semaphore,
            last_signaled: Mutex::new(0),
            label: label.to_string(),
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }

    /// Last value handed out by `signal`.
    pub fn signaled_value(&self) -> u64 {
        *self.last_signaled.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl GpuFence for TimelineFence {
    fn signal(&self) -> RhiResult<u64> {
        // Held across the submit so values reach the queue in order.
        let mut last = self.last_signaled.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let value = *last + 1;

        let signal_values = [value];
        let signal_semaphores = [self.semaphore];
        let mut timeline_info =
            vk::TimelineSemaphoreSubmitInfo::default().signal_semaphore_values(&signal_values);
        let submit_info = vk::SubmitInfo::default()
            .signal_semaphores(&signal_semaphores)
            .push_next(&mut timeline_info);

        unsafe {
            self.device
                .submit_graphics(std::slice::from_ref(&submit_info), vk::Fence::null())?;
        }
        *last = value;
        trace!("Fence '{}' signal queued at {}", self.label, value);
        Ok(value)
    }

    fn completed_value(&self) -> RhiResult<u64> {
        let value = unsafe {
            self.device
                .handle()
                .get_semaphore_counter_value(self.semaphore)
                .map_err(map_device_lost)?
        };
        Ok(value)
    }

    fn wait_until(&self, value: u64, timeout: Duration) -> RhiResult<()> {
        let semaphores = [self.semaphore];
        let values = [value];
        let wait_info = vk::SemaphoreWaitInfo::default()
            .semaphores(&semaphores)
            .values(&values);
        let timeout_ns = u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX);

        let result = unsafe { self.device.handle().wait_semaphores(&wait_info, timeout_ns) };
        match result {
            Ok(()) => Ok(()),
            Err(vk::Result::TIMEOUT) => Err(RhiError::Timeout {
                value,
                completed: self.completed_value()?,
            }),
            Err(e) => Err(map_device_lost(e)),
        }
    }
}

impl Drop for TimelineFence {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_semaphore(self.semaphore, None);
        }
        debug!("Destroyed timeline fence '{}'", self.label);
    }
}
