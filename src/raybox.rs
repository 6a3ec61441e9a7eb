use cgmath::{EuclideanSpace, Matrix4, Point3, SquareMatrix, Transform, Vector3};

/// Direction components smaller than this are treated as axis-parallel.
const AXIS_EPSILON: f32 = 1e-8;

/// Smallest box dimension reachable through drag resizing.
pub const MIN_BOX_DIMENSION: f32 = 0.1;

#[derive(Copy, Clone, Debug)]
pub struct Ray {
    pub origin: Point3<f32>,
    pub direction: Vector3<f32>,
}

impl Ray {
    pub fn new(origin: Point3<f32>, direction: Vector3<f32>) -> Self {
        Self { origin, direction }
    }

    pub fn point_at(&self, t: f32) -> Point3<f32> {
        self.origin + self.direction * t
    }
}

/// A box described by a world-from-local transform and symmetric
/// half-extents around the local origin.
#[derive(Copy, Clone, Debug)]
pub struct OrientedBox {
    pub world_from_local: Matrix4<f32>,
    pub half_extents: Vector3<f32>,
}

impl OrientedBox {
    pub fn axis_aligned(center: Point3<f32>, half_extents: Vector3<f32>) -> Self {
        Self {
            world_from_local: Matrix4::from_translation(center.to_vec()),
            half_extents,
        }
    }

    pub fn new(world_from_local: Matrix4<f32>, half_extents: Vector3<f32>) -> Self {
        Self {
            world_from_local,
            half_extents,
        }
    }

    /// Slab-method intersection. Returns the world-space entry point at the
    /// nearest parametric distance, which is behind the ray origin when the
    /// origin is inside the box. Rays parallel to a slab miss unless their
    /// origin lies within it.
    pub fn intersect(&self, ray: &Ray) -> Option<Point3<f32>> {
        let local_from_world = self.world_from_local.invert()?;
        let origin = local_from_world.transform_point(ray.origin);
        let direction = local_from_world.transform_vector(ray.direction);

        let mut t_min = f32::MIN;
        let mut t_max = f32::MAX;

        for axis in 0..3 {
            let extent = self.half_extents[axis];
            if direction[axis].abs() < AXIS_EPSILON {
                if origin[axis] < -extent || origin[axis] > extent {
                    return None;
                }
            } else {
                let inv = 1.0 / direction[axis];
                let mut t1 = (-extent - origin[axis]) * inv;
                let mut t2 = (extent - origin[axis]) * inv;
                if t1 > t2 {
                    std::mem::swap(&mut t1, &mut t2);
                }
                t_min = t_min.max(t1);
                t_max = t_max.min(t2);
                if t_min > t_max {
                    return None;
                }
            }
        }

        let local_hit = origin + direction * t_min;
        Some(self.world_from_local.transform_point(local_hit))
    }
}

/// Translate a pointer drag into a box resize: the delta is taken in box
/// local space, applied symmetrically (2x per axis), and the result is kept
/// at a usable minimum size.
pub fn resize_by_drag(dimensions: Vector3<f32>, local_delta: Vector3<f32>) -> Vector3<f32> {
    let resized = dimensions + local_delta * 2.0;
    Vector3::new(
        resized.x.max(MIN_BOX_DIMENSION),
        resized.y.max(MIN_BOX_DIMENSION),
        resized.z.max(MIN_BOX_DIMENSION),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::Deg;

    fn assert_point_close(p: Point3<f32>, expected: (f32, f32, f32)) {
        assert!(
            (p.x - expected.0).abs() < 1e-4
                && (p.y - expected.1).abs() < 1e-4
                && (p.z - expected.2).abs() < 1e-4,
            "{p:?} != {expected:?}"
        );
    }

    #[test]
    fn straight_on_ray_hits_front_face() {
        let ray = Ray::new(Point3::new(0.0, 0.0, -5.0), Vector3::new(0.0, 0.0, 1.0));
        let unit_box =
            OrientedBox::axis_aligned(Point3::origin(), Vector3::new(0.5, 0.5, 0.5));
        let hit = unit_box.intersect(&ray).unwrap();
        assert_point_close(hit, (0.0, 0.0, -0.5));
    }

    #[test]
    fn parallel_ray_outside_slab_never_hits() {
        let unit_box =
            OrientedBox::axis_aligned(Point3::origin(), Vector3::new(0.5, 0.5, 0.5));
        let offsets = [-3.0, -0.6, 0.6, 3.0];
        for &offset in &offsets {
            for &other in &offsets {
                // Parallel to X, displaced outside the Y or Z slab.
                let ray = Ray::new(Point3::new(-5.0, offset, other), Vector3::new(1.0, 0.0, 0.0));
                assert!(unit_box.intersect(&ray).is_none());
                // Parallel to Y.
                let ray = Ray::new(Point3::new(offset, -5.0, other), Vector3::new(0.0, 1.0, 0.0));
                assert!(unit_box.intersect(&ray).is_none());
                // Parallel to Z.
                let ray = Ray::new(Point3::new(offset, other, -5.0), Vector3::new(0.0, 0.0, 1.0));
                assert!(unit_box.intersect(&ray).is_none());
            }
        }
    }

    #[test]
    fn parallel_ray_inside_slabs_hits() {
        let unit_box =
            OrientedBox::axis_aligned(Point3::origin(), Vector3::new(0.5, 0.5, 0.5));
        let ray = Ray::new(Point3::new(-5.0, 0.2, -0.3), Vector3::new(1.0, 0.0, 0.0));
        let hit = unit_box.intersect(&ray).unwrap();
        assert_point_close(hit, (-0.5, 0.2, -0.3));
    }

    #[test]
    fn translated_box_hit_point_is_in_world_space() {
        let elevated =
            OrientedBox::axis_aligned(Point3::new(0.0, 10.0, 0.0), Vector3::new(1.0, 0.5, 1.0));
        let ray = Ray::new(Point3::origin(), Vector3::new(0.0, 1.0, 0.0));
        let hit = elevated.intersect(&ray).unwrap();
        assert_point_close(hit, (0.0, 9.5, 0.0));
    }

    #[test]
    fn rotated_box_is_intersected_in_local_space() {
        // Long local X axis rotated onto world Z.
        let transform = Matrix4::from_angle_y(Deg(90.0));
        let long_box = OrientedBox::new(transform, Vector3::new(2.0, 0.5, 0.5));
        let ray = Ray::new(Point3::new(0.0, 0.0, -5.0), Vector3::new(0.0, 0.0, 1.0));
        let hit = long_box.intersect(&ray).unwrap();
        assert_point_close(hit, (0.0, 0.0, -2.0));
    }

    #[test]
    fn ray_from_inside_reports_backward_entry_point() {
        let unit_box =
            OrientedBox::axis_aligned(Point3::origin(), Vector3::new(0.5, 0.5, 0.5));
        let ray = Ray::new(Point3::origin(), Vector3::new(0.0, 0.0, 1.0));
        let hit = unit_box.intersect(&ray).unwrap();
        assert_point_close(hit, (0.0, 0.0, -0.5));
    }

    #[test]
    fn glancing_miss_past_corner() {
        let unit_box =
            OrientedBox::axis_aligned(Point3::origin(), Vector3::new(0.5, 0.5, 0.5));
        let ray = Ray::new(Point3::new(-5.0, 2.0, 0.0), Vector3::new(1.0, 0.0, 0.0));
        assert!(unit_box.intersect(&ray).is_none());
    }

    #[test]
    fn drag_resize_applies_symmetric_delta() {
        let resized = resize_by_drag(
            Vector3::new(1.0, 1.0, 1.0),
            Vector3::new(0.25, 0.0, -0.1),
        );
        assert_point_close(Point3::from_vec(resized), (1.5, 1.0, 0.8));
    }

    #[test]
    fn drag_resize_clamps_to_minimum_dimension() {
        let resized = resize_by_drag(
            Vector3::new(0.2, 0.2, 0.2),
            Vector3::new(-1.0, -0.04, 0.0),
        );
        assert_point_close(
            Point3::from_vec(resized),
            (MIN_BOX_DIMENSION, 0.12, 0.2),
        );
    }
}
