// particles.rs — ambient dust floating inside the panorama sphere

use glam::Mat4;
use rand::Rng;

pub const DEFAULT_PARTICLE_COUNT: usize = 1000;
/// Half the edge of the cube the particles are scattered in.
pub const DEFAULT_HALF_EXTENT: f32 = 400.0;
/// Rotation about Y in radians per frame.
pub const SPIN_PER_FRAME: f32 = 0.0005;

#[derive(Debug, Clone)]
pub struct ParticleField {
    positions: Vec<[f32; 3]>,
    rotation_y: f32,
}

impl ParticleField {
    /// Scatters `count` points uniformly in `[-half_extent, half_extent]^3`.
    pub fn random(count: usize, half_extent: f32, rng: &mut impl Rng) -> Self {
        let positions = (0..count)
            .map(|_| {
                [
                    rng.gen_range(-half_extent..=half_extent),
                    rng.gen_range(-half_extent..=half_extent),
                    rng.gen_range(-half_extent..=half_extent),
                ]
            })
            .collect();

        Self {
            positions,
            rotation_y: 0.0,
        }
    }

    pub fn positions(&self) -> &[[f32; 3]] {
        &self.positions
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    #[cfg(test)]
    pub fn rotation(&self) -> f32 {
        self.rotation_y
    }

    /// One frame of ambient spin. Independent of any user input.
    pub fn advance(&mut self) -> f32 {
        self.rotation_y = (self.rotation_y + SPIN_PER_FRAME) % std::f32::consts::TAU;
        self.rotation_y
    }

    pub fn model_matrix(&self) -> Mat4 {
        Mat4::from_rotation_y(self.rotation_y)
    }

    #[cfg(test)]
    pub fn world_position(&self, index: usize) -> Option<glam::Vec3> {
        self.positions
            .get(index)
            .map(|p| self.model_matrix().transform_point3(glam::Vec3::from(*p)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn particles_stay_inside_the_cube() {
        let mut rng = StdRng::seed_from_u64(7);
        let field = ParticleField::random(DEFAULT_PARTICLE_COUNT, DEFAULT_HALF_EXTENT, &mut rng);
        assert_eq!(field.len(), DEFAULT_PARTICLE_COUNT);
        for p in field.positions() {
            assert!(p.iter().all(|c| c.abs() <= DEFAULT_HALF_EXTENT));
        }
    }

    #[test]
    fn advance_spins_about_y_only() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut field = ParticleField::random(4, 100.0, &mut rng);
        let before = field.world_position(0).unwrap();
        for _ in 0..1000 {
            field.advance();
        }
        assert_abs_diff_eq!(field.rotation(), 0.5, epsilon = 1e-3);

        let after = field.world_position(0).unwrap();
        assert_abs_diff_eq!(after.y, before.y, epsilon = 1e-3);
        assert_abs_diff_eq!(after.length(), before.length(), epsilon = 1e-2);
    }
}
