//! Error types for mesh data.

use thiserror::Error;

/// Error type for mesh validation and conversion.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    /// An index refers past the end of the vertex list.
    #[error("Index {index} out of bounds for {vertex_count} vertices")]
    IndexOutOfBounds { index: u32, vertex_count: usize },

    /// The index list is not a whole number of triangles.
    #[error("Index count {0} is not a multiple of 3")]
    IncompleteTriangle(usize),

    /// An index does not fit the requested narrower index type.
    #[error("Index {index} does not fit in 16 bits")]
    IndexOverflow { index: u32 },

    /// The mesh has more vertices than 32-bit indices can address.
    #[error("Mesh has {0} vertices, more than 32-bit indices can address")]
    TooManyVertices(usize),
}

/// Result type alias for resource operations.
pub type ResourceResult<T> = Result<T, ResourceError>;
