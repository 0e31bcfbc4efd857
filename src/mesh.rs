// mesh.rs — UV sphere the panorama is wrapped onto

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SphereVertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
}

#[derive(Debug, Clone)]
pub struct SphereMesh {
    pub vertices: Vec<SphereVertex>,
    pub indices: Vec<u32>,
}

/// Builds a UV sphere with `width_segments` around the equator and
/// `height_segments` from pole to pole.
///
/// With `inward` set the mesh is mirrored on X so the faces (CCW winding) point
/// at the centre, which is where the camera sits.
pub fn build_sphere(
    radius: f32,
    width_segments: usize,
    height_segments: usize,
    inward: bool,
) -> SphereMesh {
    let width_segments = width_segments.max(3);
    let height_segments = height_segments.max(2);

    let mut vertices = Vec::with_capacity((height_segments + 1) * (width_segments + 1));
    let mut indices = Vec::with_capacity(height_segments * width_segments * 6);

    let mirror = if inward { -1.0 } else { 1.0 };

    for i in 0..=height_segments {
        let v = i as f32 / height_segments as f32;
        let polar = std::f32::consts::PI * v;
        let y = radius * polar.cos();
        let ring = radius * polar.sin();

        for j in 0..=width_segments {
            let u = j as f32 / width_segments as f32;
            let azimuth = std::f32::consts::TAU * u;

            let x = -ring * azimuth.cos() * mirror;
            let z = ring * azimuth.sin();

            vertices.push(SphereVertex {
                position: [x, y, z],
                uv: [u, v],
            });
        }
    }

    let stride = (width_segments + 1) as u32;
    for i in 0..height_segments as u32 {
        for j in 0..width_segments as u32 {
            let a = i * stride + j;
            let b = a + stride;

            // Mirroring flips handedness, so the same order serves both sides.
            indices.extend_from_slice(&[a, b, a + 1, b, b + 1, a + 1]);
        }
    }

    SphereMesh { vertices, indices }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn vertex_and_index_counts() {
        let mesh = build_sphere(500.0, 60, 40, true);
        assert_eq!(mesh.vertices.len(), 61 * 41);
        assert_eq!(mesh.indices.len(), 60 * 40 * 6);
        let max = *mesh.indices.iter().max().unwrap() as usize;
        assert!(max < mesh.vertices.len());
    }

    #[test]
    fn every_vertex_lies_on_the_sphere() {
        let mesh = build_sphere(500.0, 16, 8, true);
        for v in &mesh.vertices {
            let [x, y, z] = v.position;
            assert_abs_diff_eq!((x * x + y * y + z * z).sqrt(), 500.0, epsilon = 1e-2);
        }
    }

    // Normal of a triangle in the middle band, dotted with its centroid.
    fn facing(mesh: &SphereMesh, width_segments: usize) -> f32 {
        let start = 3 * width_segments * 6;
        let tri = &mesh.indices[start..start + 3];
        let p = |i: u32| glam::Vec3::from(mesh.vertices[i as usize].position);
        let (a, b, c) = (p(tri[0]), p(tri[1]), p(tri[2]));
        (b - a).cross(c - a).dot((a + b + c) / 3.0)
    }

    #[test]
    fn inward_faces_point_at_the_centre() {
        assert!(facing(&build_sphere(10.0, 12, 6, true), 12) < 0.0);
        assert!(facing(&build_sphere(10.0, 12, 6, false), 12) > 0.0);
    }
}
