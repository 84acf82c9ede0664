//! Procedural primitive meshes.
//!
//! All generators produce counter-clockwise triangles when viewed from
//! outside the surface, with outward unit normals and unit tangents
//! pointing along increasing `u`.

use std::collections::HashMap;
use std::f32::consts::{PI, TAU};

use glam::{Vec2, Vec3, Vec4};
use tracing::debug;

use ember_rhi::Vertex;

use crate::mesh::MeshData;

/// Highest geosphere subdivision level; level 6 already has 40962 vertices.
pub const MAX_GEOSPHERE_SUBDIVISIONS: u32 = 6;

#[inline]
fn vertex(position: Vec3, normal: Vec3, tangent: Vec3, uv: Vec2) -> Vertex {
    Vertex::new(position, normal, uv, tangent.extend(1.0))
}

/// Axis-aligned cube centered at the origin with the given half extent.
///
/// Each face has its own four vertices so normals stay flat: 24 vertices
/// and 36 indices.
pub fn cube(half_extent: f32) -> MeshData {
    // (normal, u axis, v axis) with u x v == normal.
    const FACES: [(Vec3, Vec3, Vec3); 6] = [
        (Vec3::X, Vec3::NEG_Z, Vec3::Y),
        (Vec3::NEG_X, Vec3::Z, Vec3::Y),
        (Vec3::Y, Vec3::X, Vec3::NEG_Z),
        (Vec3::NEG_Y, Vec3::X, Vec3::Z),
        (Vec3::Z, Vec3::X, Vec3::Y),
        (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
    ];
    const CORNERS: [(f32, f32); 4] = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];

    let mut mesh = MeshData::default();
    mesh.vertices.reserve(24);
    mesh.indices.reserve(36);

    for (face, (normal, u, v)) in FACES.iter().enumerate() {
        let base = (face * 4) as u32;
        for (su, sv) in CORNERS {
            let position = (*normal + *u * su + *v * sv) * half_extent;
            let uv = Vec2::new((su + 1.0) * 0.5, (1.0 - sv) * 0.5);
            mesh.vertices.push(vertex(position, *normal, *u, uv));
        }
        mesh.indices
            .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    debug!("Generated cube: {} vertices", mesh.vertex_count());
    mesh
}

/// Capped cylinder (or truncated cone) along +Y, centered at the origin.
///
/// `slice_count` is clamped to at least 3 and `stack_count` to at least 1.
pub fn cylinder(bottom_radius: f32, top_radius: f32, height: f32, slice_count: u32, stack_count: u32) -> MeshData {
    let slice_count = slice_count.max(3);
    let stack_count = stack_count.max(1);

    let mut mesh = MeshData::default();

    let stack_height = height / stack_count as f32;
    let radius_step = (top_radius - bottom_radius) / stack_count as f32;
    let d_theta = TAU / slice_count as f32;
    let dr = bottom_radius - top_radius;

    // Rings from bottom to top; the seam vertex is duplicated for texturing.
    for i in 0..=stack_count {
        let y = -0.5 * height + i as f32 * stack_height;
        let r = bottom_radius + i as f32 * radius_step;

        for j in 0..=slice_count {
            let (s, c) = (j as f32 * d_theta).sin_cos();

            let tangent = Vec3::new(-s, 0.0, c);
            let bitangent = Vec3::new(dr * c, -height, dr * s);
            let normal = tangent.cross(bitangent).normalize_or_zero();
            let uv = Vec2::new(j as f32 / slice_count as f32, 1.0 - i as f32 / stack_count as f32);

            mesh.vertices
                .push(vertex(Vec3::new(r * c, y, r * s), normal, tangent, uv));
        }
    }

    let ring_vertex_count = slice_count + 1;
    for i in 0..stack_count {
        for j in 0..slice_count {
            let a = i * ring_vertex_count + j;
            let b = (i + 1) * ring_vertex_count + j;
            mesh.indices.extend_from_slice(&[a, b, b + 1, a, b + 1, a + 1]);
        }
    }

    build_cylinder_cap(&mut mesh, bottom_radius, height, slice_count, false);
    build_cylinder_cap(&mut mesh, top_radius, height, slice_count, true);

    debug!(
        "Generated cylinder: {} vertices, {} triangles",
        mesh.vertex_count(),
        mesh.triangle_count()
    );
    mesh
}

fn build_cylinder_cap(mesh: &mut MeshData, radius: f32, height: f32, slice_count: u32, top: bool) {
    let base = mesh.vertices.len() as u32;
    let (y, normal) = if top {
        (0.5 * height, Vec3::Y)
    } else {
        (-0.5 * height, Vec3::NEG_Y)
    };
    let d_theta = TAU / slice_count as f32;

    for i in 0..=slice_count {
        let (s, c) = (i as f32 * d_theta).sin_cos();
        let (x, z) = (radius * c, radius * s);
        // Scale texture coordinates so the cap maps onto the unit square.
        let uv = Vec2::new(x / height + 0.5, z / height + 0.5);
        mesh.vertices.push(vertex(Vec3::new(x, y, z), normal, Vec3::X, uv));
    }
    mesh.vertices
        .push(vertex(Vec3::new(0.0, y, 0.0), normal, Vec3::X, Vec2::splat(0.5)));

    let center = mesh.vertices.len() as u32 - 1;
    for i in 0..slice_count {
        if top {
            mesh.indices.extend_from_slice(&[center, base + i + 1, base + i]);
        } else {
            mesh.indices.extend_from_slice(&[center, base + i, base + i + 1]);
        }
    }
}

/// Sphere approximated by a subdivided icosahedron.
///
/// Each subdivision splits every triangle into four through its edge
/// midpoints; shared midpoints are welded. Levels above
/// [`MAX_GEOSPHERE_SUBDIVISIONS`] are clamped.
pub fn geosphere(radius: f32, subdivisions: u32) -> MeshData {
    const X: f32 = 0.525_731;
    const Z: f32 = 0.850_651;
    const POSITIONS: [Vec3; 12] = [
        Vec3::new(-X, 0.0, Z),
        Vec3::new(X, 0.0, Z),
        Vec3::new(-X, 0.0, -Z),
        Vec3::new(X, 0.0, -Z),
        Vec3::new(0.0, Z, X),
        Vec3::new(0.0, Z, -X),
        Vec3::new(0.0, -Z, X),
        Vec3::new(0.0, -Z, -X),
        Vec3::new(Z, X, 0.0),
        Vec3::new(-Z, X, 0.0),
        Vec3::new(Z, -X, 0.0),
        Vec3::new(-Z, -X, 0.0),
    ];
    const INDICES: [u32; 60] = [
        1, 4, 0, 4, 9, 0, 4, 5, 9, 8, 5, 4, 1, 8, 4, //
        1, 10, 8, 10, 3, 8, 8, 3, 5, 3, 2, 5, 3, 7, 2, //
        3, 10, 7, 10, 6, 7, 6, 11, 7, 6, 0, 11, 6, 1, 0, //
        10, 1, 6, 11, 0, 9, 2, 11, 9, 5, 2, 9, 11, 2, 7,
    ];

    let subdivisions = subdivisions.min(MAX_GEOSPHERE_SUBDIVISIONS);

    let mut positions = POSITIONS.to_vec();
    let mut indices = INDICES.to_vec();
    for _ in 0..subdivisions {
        indices = subdivide(&mut positions, &indices);
    }

    let vertices = positions
        .iter()
        .map(|p| {
            let normal = p.normalize();
            let position = normal * radius;

            // Spherical coordinates, theta in [0, 2pi).
            let mut theta = normal.z.atan2(normal.x);
            if theta < 0.0 {
                theta += TAU;
            }
            let phi = normal.y.clamp(-1.0, 1.0).acos();
            let uv = Vec2::new(theta / TAU, phi / PI);

            // dP/dtheta; undefined at the poles.
            let tangent = Vec3::new(-phi.sin() * theta.sin(), 0.0, phi.sin() * theta.cos())
                .try_normalize()
                .unwrap_or(Vec3::X);

            Vertex::new(position, normal, uv, Vec4::from((tangent, 1.0)))
        })
        .collect();

    let mesh = MeshData::new(vertices, indices);
    debug!(
        "Generated geosphere (level {}): {} vertices, {} triangles",
        subdivisions,
        mesh.vertex_count(),
        mesh.triangle_count()
    );
    mesh
}

/// Splits each triangle into four, returning the new index list.
fn subdivide(positions: &mut Vec<Vec3>, indices: &[u32]) -> Vec<u32> {
    let mut midpoints: HashMap<(u32, u32), u32> = HashMap::new();
    let mut midpoint = |a: u32, b: u32, positions: &mut Vec<Vec3>| -> u32 {
        let key = (a.min(b), a.max(b));
        *midpoints.entry(key).or_insert_with(|| {
            let mid = (positions[a as usize] + positions[b as usize]) * 0.5;
            positions.push(mid);
            positions.len() as u32 - 1
        })
    };

    let mut result = Vec::with_capacity(indices.len() * 4);
    for triangle in indices.chunks_exact(3) {
        let (v0, v1, v2) = (triangle[0], triangle[1], triangle[2]);
        let m0 = midpoint(v0, v1, positions);
        let m1 = midpoint(v1, v2, positions);
        let m2 = midpoint(v0, v2, positions);

        //       v1
        //       *
        //      / \
        //  m0 *---* m1
        //    / \ / \
        //   *---*---*
        //  v0   m2   v2
        result.extend_from_slice(&[v0, m0, m2, m0, m1, m2, m2, m1, v2, m0, v1, m1]);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Every triangle's geometric normal must point away from the origin.
    fn assert_outward_winding(mesh: &MeshData) {
        for triangle in mesh.indices.chunks_exact(3) {
            let a = mesh.vertices[triangle[0] as usize].position;
            let b = mesh.vertices[triangle[1] as usize].position;
            let c = mesh.vertices[triangle[2] as usize].position;
            let face_normal = (b - a).cross(c - a);
            let centroid = (a + b + c) / 3.0;
            assert!(
                face_normal.dot(centroid) > 0.0,
                "triangle {:?} winds inward",
                triangle
            );
        }
    }

    fn assert_unit_normals(mesh: &MeshData) {
        for v in &mesh.vertices {
            assert_relative_eq!(v.normal.length(), 1.0, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_cube_counts() {
        let mesh = cube(1.0);
        assert_eq!(mesh.vertex_count(), 24);
        assert_eq!(mesh.index_count(), 36);
        mesh.validate().unwrap();
    }

    #[test]
    fn test_cube_winding_and_normals() {
        let mesh = cube(0.5);
        assert_outward_winding(&mesh);
        assert_unit_normals(&mesh);
        for v in &mesh.vertices {
            assert_relative_eq!(v.position.abs().max_element(), 0.5);
            assert_relative_eq!(v.position.dot(v.normal), 0.5);
        }
    }

    #[test]
    fn test_cylinder_counts() {
        let (slices, stacks) = (20, 4);
        let mesh = cylinder(0.5, 0.3, 3.0, slices, stacks);
        let side = (stacks + 1) * (slices + 1);
        let caps = 2 * (slices + 2);
        assert_eq!(mesh.vertex_count() as u32, side + caps);
        assert_eq!(mesh.index_count() as u32, stacks * slices * 6 + 2 * slices * 3);
        mesh.validate().unwrap();
    }

    #[test]
    fn test_cylinder_winding_and_normals() {
        let mesh = cylinder(1.0, 1.0, 2.0, 16, 2);
        assert_outward_winding(&mesh);
        assert_unit_normals(&mesh);
    }

    #[test]
    fn test_cylinder_clamps_degenerate_counts() {
        let mesh = cylinder(1.0, 1.0, 1.0, 0, 0);
        assert!(mesh.triangle_count() > 0);
        mesh.validate().unwrap();
    }

    #[test]
    fn test_geosphere_base_is_icosahedron() {
        let mesh = geosphere(2.0, 0);
        assert_eq!(mesh.vertex_count(), 12);
        assert_eq!(mesh.index_count(), 60);
        for v in &mesh.vertices {
            assert_relative_eq!(v.position.length(), 2.0, epsilon = 1e-4);
        }
        assert_outward_winding(&mesh);
    }

    #[test]
    fn test_geosphere_subdivision_counts() {
        for level in 1..=3u32 {
            let mesh = geosphere(1.0, level);
            let faces = 20 * 4usize.pow(level);
            assert_eq!(mesh.triangle_count(), faces);
            // Welded midpoints: V = 10 * 4^n + 2.
            assert_eq!(mesh.vertex_count(), 10 * 4usize.pow(level) + 2);
            mesh.validate().unwrap();
        }
    }

    #[test]
    fn test_geosphere_subdivision_is_capped() {
        let capped = geosphere(1.0, 50);
        assert_eq!(
            capped.triangle_count(),
            20 * 4usize.pow(MAX_GEOSPHERE_SUBDIVISIONS)
        );
    }

    #[test]
    fn test_geosphere_winding_and_uv_range() {
        let mesh = geosphere(1.0, 2);
        assert_outward_winding(&mesh);
        assert_unit_normals(&mesh);
        for v in &mesh.vertices {
            assert!((0.0..=1.0).contains(&v.tex_coord.x));
            assert!((0.0..=1.0).contains(&v.tex_coord.y));
            assert_relative_eq!(v.tangent.truncate().length(), 1.0, epsilon = 1e-4);
        }
    }
}
