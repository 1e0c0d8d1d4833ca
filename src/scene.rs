// Scene - camera matrices and the demo geometry

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use crate::backend::mesh::{MeshData, Vertex};
use crate::config::CameraConfig;

/// Uniform block consumed by shader.vert (binding 0)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Mvp {
    pub model: Mat4,
    pub view: Mat4,
    pub projection: Mat4,
}

impl Mvp {
    pub fn new(camera: &CameraConfig, extent: vk::Extent2D) -> Self {
        let aspect = if extent.height == 0 {
            1.0
        } else {
            extent.width as f32 / extent.height as f32
        };

        let mut projection = Mat4::perspective_rh(
            camera.fov_y_degrees.to_radians(),
            aspect,
            camera.near,
            camera.far,
        );
        // Vulkan clip space has Y pointing down
        projection.y_axis.y *= -1.0;

        Self {
            model: Mat4::IDENTITY,
            view: Mat4::look_at_rh(
                Vec3::from_array(camera.eye),
                Vec3::from_array(camera.target),
                Vec3::from_array(camera.up),
            ),
            projection,
        }
    }
}

/// Meshes drawn by the demo: a quad in the z=0 plane and a triangle above it
pub fn default_scene() -> Vec<MeshData> {
    let quad = MeshData::new(
        vec![
            Vertex::new([0.5, 0.5, 0.0], [1.0, 0.0, 0.0]),
            Vertex::new([0.5, -0.5, 0.0], [0.0, 1.0, 0.0]),
            Vertex::new([-0.5, -0.5, 0.0], [0.0, 0.0, 1.0]),
            Vertex::new([-0.5, 0.5, 0.0], [1.0, 1.0, 1.0]),
        ],
        vec![2, 1, 0, 0, 3, 2],
    );

    let triangle = MeshData::new(
        vec![
            Vertex::new([-0.3, -0.3, 0.5], [1.0, 0.5, 0.0]),
            Vertex::new([0.3, -0.3, 0.5], [0.0, 1.0, 1.0]),
            Vertex::new([0.0, 0.3, 0.5], [1.0, 0.0, 1.0]),
        ],
        vec![0, 1, 2],
    );

    vec![quad, triangle]
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    #[test]
    fn mvp_is_three_column_major_matrices() {
        assert_eq!(std::mem::size_of::<Mvp>(), 3 * 64);
        let mvp = Mvp::new(&CameraConfig::default(), extent(800, 600));
        let floats: &[f32] = bytemuck::cast_slice(std::slice::from_ref(&mvp));
        assert_eq!(&floats[..16], &Mat4::IDENTITY.to_cols_array());
    }

    #[test]
    fn projection_flips_y() {
        let camera = CameraConfig::default();
        let mvp = Mvp::new(&camera, extent(800, 600));
        let gl = Mat4::perspective_rh(camera.fov_y_degrees.to_radians(), 800.0 / 600.0, 0.1, 10.0);
        assert!(mvp.projection.y_axis.y < 0.0);
        assert_eq!(mvp.projection.y_axis.y, -gl.y_axis.y);
        assert_eq!(mvp.projection.x_axis, gl.x_axis);
    }

    #[test]
    fn zero_height_uses_unit_aspect() {
        let camera = CameraConfig::default();
        let mvp = Mvp::new(&camera, extent(800, 0));
        let square = Mvp::new(&camera, extent(600, 600));
        assert_eq!(mvp.projection, square.projection);
    }

    #[test]
    fn target_lands_in_front_of_camera() {
        let mvp = Mvp::new(&CameraConfig::default(), extent(800, 600));
        let clip = mvp.projection * mvp.view * mvp.model * Vec4::new(0.0, 0.0, 0.0, 1.0);
        let ndc = clip / clip.w;
        assert!(clip.w > 0.0);
        assert!(ndc.x.abs() < 1e-5 && ndc.y.abs() < 1e-5);
        assert!(ndc.z > 0.0 && ndc.z < 1.0);
    }

    #[test]
    fn default_scene_is_drawable() {
        let scene = default_scene();
        assert_eq!(scene.len(), 2);
        for mesh in &scene {
            assert!(mesh.validate().is_ok());
        }
        assert_eq!(scene[0].indices, vec![2, 1, 0, 0, 3, 2]);
        assert!(scene[1].vertices.iter().all(|v| v.pos.z == 0.5));
    }
}
