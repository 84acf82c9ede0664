//! Mesh data and procedural primitives.
//!
//! [`MeshData`] is the CPU-side input of the static geometry pool: a list
//! of [`Vertex`](ember_rhi::Vertex) values and 32-bit triangle indices.
//! The [`primitives`] module builds the meshes the sandbox scene uses.

mod error;
mod mesh;

pub mod primitives;

pub use error::{ResourceError, ResourceResult};
pub use mesh::MeshData;
