//! Scene-side inputs of the renderer: the orbit [`Camera`], object
//! [`Transform`]s and [`RenderItem`]s.

pub mod camera;
pub mod render_item;
pub mod transform;

pub use camera::Camera;
pub use render_item::{DrawArgs, RenderItem, RenderItemId};
pub use transform::{Transform, normal_matrix};
