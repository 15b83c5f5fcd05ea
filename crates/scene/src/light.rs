//! Light definitions for the scene.

use glam::Vec3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LightKind {
    /// Parallel rays along `direction`; `position` is unused.
    Directional,
    /// Omnidirectional light at `position`; `direction` is unused.
    Point,
}

/// A punctual light as loaded from a scene file.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Light {
    pub kind: LightKind,
    pub color: Vec3,
    pub intensity: f32,
    pub position: Vec3,
    pub direction: Vec3,
}

impl Light {
    pub fn directional(direction: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            kind: LightKind::Directional,
            color,
            intensity,
            position: Vec3::ZERO,
            direction: direction.normalize_or_zero(),
        }
    }

    pub fn point(position: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            kind: LightKind::Point,
            color,
            intensity,
            position,
            direction: Vec3::ZERO,
        }
    }
}

impl Default for Light {
    fn default() -> Self {
        Self::directional(Vec3::new(0.0, 1.0, 0.0), Vec3::ONE, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directional_normalizes_direction() {
        let light = Light::directional(Vec3::new(0.0, 0.0, -4.0), Vec3::ONE, 2.0);
        assert_eq!(light.kind, LightKind::Directional);
        assert_eq!(light.direction, Vec3::NEG_Z);
        assert_eq!(light.intensity, 2.0);
    }

    #[test]
    fn test_point_light() {
        let light = Light::point(Vec3::new(1.0, 2.0, 3.0), Vec3::X, 10.0);
        assert_eq!(light.kind, LightKind::Point);
        assert_eq!(light.position, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(light.direction, Vec3::ZERO);
    }
}
