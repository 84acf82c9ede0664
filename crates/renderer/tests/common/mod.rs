//! Shared fixtures for the renderer integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use ember_core::EngineConfig;
use ember_renderer::{Renderer, ShaderBytecode};
use ember_rhi::headless::{HeadlessDevice, HeadlessSwapChain};
use ember_rhi::shader::SPIRV_MAGIC;
use ember_rhi::Extent2d;

/// Smallest bytecode that passes header validation.
pub fn shaders() -> ShaderBytecode {
    let mut bytes = SPIRV_MAGIC.to_le_bytes().to_vec();
    bytes.extend_from_slice(&[0; 16]);
    ShaderBytecode::from_bytes(bytes.clone(), bytes).unwrap()
}

pub fn config(frame_count: usize) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.frames.frame_count = frame_count;
    config.frames.fence_timeout_ms = 200;
    config
}

pub struct Harness {
    pub device: Arc<HeadlessDevice>,
    pub swapchain: HeadlessSwapChain,
    pub renderer: Renderer<HeadlessDevice>,
}

pub fn harness(extent: Extent2d) -> Harness {
    harness_with(HeadlessDevice::new(), extent, &config(3))
}

pub fn harness_with(device: HeadlessDevice, extent: Extent2d, config: &EngineConfig) -> Harness {
    let device = Arc::new(device);
    let swapchain = HeadlessSwapChain::new(extent, 3);
    let renderer = Renderer::new(device.clone(), &swapchain, config, &shaders()).unwrap();
    Harness {
        device,
        swapchain,
        renderer,
    }
}
