//! Windowing for the harness.
//!
//! - [`Window`]: winit window plus client-size tracking
//! - [`Surface`]: RAII Vulkan surface for that window
//! - [`InputState`]: per-frame keyboard and mouse state, reduced to an
//!   [`OrbitInput`] for the frame lifecycle

mod input;
mod window;

pub use input::{InputState, KeyCode, MouseButton, OrbitInput, TOGGLE_UI_KEY};
pub use window::{Surface, Window, required_extensions};

pub use winit::event::{ElementState, MouseScrollDelta, WindowEvent};
pub use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
