// Meshes - vertex/index data uploaded to device-local memory
//
// Upload path: host-visible staging buffer -> one-shot copy on the graphics
// queue -> device-local vertex/index buffer.

use anyhow::{Context, Result};
use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use gpu_allocator::MemoryLocation;
use std::mem::{offset_of, size_of};
use std::sync::Arc;
use super::buffer::{create_buffer_with_data, Buffer};
use super::VulkanDevice;

/// Interleaved vertex: position + colour
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub pos: Vec3,
    pub color: Vec3,
}

impl Vertex {
    pub const fn new(pos: [f32; 3], color: [f32; 3]) -> Self {
        Self {
            pos: Vec3::from_array(pos),
            color: Vec3::from_array(color),
        }
    }

    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 2] {
        [
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: offset_of!(Vertex, pos) as u32,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 1,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: offset_of!(Vertex, color) as u32,
            },
        ]
    }
}

/// CPU-side geometry for an indexed triangle list
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        Self { vertices, indices }
    }

    /// Check the data describes a drawable triangle list
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(!self.vertices.is_empty(), "Mesh has no vertices");
        anyhow::ensure!(!self.indices.is_empty(), "Mesh has no indices");
        anyhow::ensure!(
            self.indices.len() % 3 == 0,
            "Index count {} is not a multiple of 3",
            self.indices.len()
        );
        if let Some(&bad) = self
            .indices
            .iter()
            .find(|&&i| i as usize >= self.vertices.len())
        {
            anyhow::bail!(
                "Index {} out of range for {} vertices",
                bad,
                self.vertices.len()
            );
        }
        Ok(())
    }
}

/// Geometry resident on the GPU
pub struct Mesh {
    vertex_buffer: Buffer,
    index_buffer: Buffer,
    vertex_count: u32,
    index_count: u32,
    device: Arc<VulkanDevice>,
}

impl Mesh {
    pub fn vertex_buffer(&self) -> vk::Buffer {
        self.vertex_buffer.buffer
    }

    pub fn index_buffer(&self) -> vk::Buffer {
        self.index_buffer.buffer
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }
}

impl Drop for Mesh {
    fn drop(&mut self) {
        self.vertex_buffer.destroy(&self.device);
        self.index_buffer.destroy(&self.device);
    }
}

/// Creates meshes; owns the transient command pool used for uploads
pub struct MeshFactory {
    device: Arc<VulkanDevice>,
    command_pool: vk::CommandPool,
}

impl MeshFactory {
    pub fn new(device: Arc<VulkanDevice>) -> Result<Self> {
        let pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(device.graphics_queue_family)
            .flags(vk::CommandPoolCreateFlags::TRANSIENT);

        let command_pool = unsafe { device.device.create_command_pool(&pool_info, None) }
            .context("Failed to create upload command pool")?;

        Ok(Self {
            device,
            command_pool,
        })
    }

    pub fn create_mesh(&self, data: &MeshData) -> Result<Mesh> {
        data.validate()?;

        let vertex_buffer = self.upload(
            "vertex buffer",
            vk::BufferUsageFlags::VERTEX_BUFFER,
            bytemuck::cast_slice(&data.vertices),
        )?;
        let index_buffer = match self.upload(
            "index buffer",
            vk::BufferUsageFlags::INDEX_BUFFER,
            bytemuck::cast_slice(&data.indices),
        ) {
            Ok(b) => b,
            Err(e) => {
                let mut vertex_buffer = vertex_buffer;
                vertex_buffer.destroy(&self.device);
                return Err(e);
            }
        };

        log::debug!(
            "Uploaded mesh: {} vertices, {} indices",
            data.vertices.len(),
            data.indices.len()
        );

        Ok(Mesh {
            vertex_buffer,
            index_buffer,
            vertex_count: data.vertices.len() as u32,
            index_count: data.indices.len() as u32,
            device: self.device.clone(),
        })
    }

    /// Copy `bytes` into a new device-local buffer with `usage`
    fn upload(&self, name: &str, usage: vk::BufferUsageFlags, bytes: &[u8]) -> Result<Buffer> {
        let mut staging = create_buffer_with_data(
            &self.device,
            &format!("{} staging", name),
            vk::BufferUsageFlags::TRANSFER_SRC,
            bytes,
        )?;

        let result = Buffer::new(
            &self.device,
            name,
            staging.size,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            MemoryLocation::GpuOnly,
        )
        .and_then(|mut target| {
            let region = vk::BufferCopy {
                src_offset: 0,
                dst_offset: 0,
                size: staging.size,
            };
            let copied = self.device.submit_immediate(self.command_pool, |device, cmd| unsafe {
                device.cmd_copy_buffer(cmd, staging.buffer, target.buffer, &[region]);
            });
            match copied {
                Ok(()) => Ok(target),
                Err(e) => {
                    target.destroy(&self.device);
                    Err(e)
                }
            }
        });

        staging.destroy(&self.device);
        result.with_context(|| format!("Failed to upload {}", name))
    }
}

impl Drop for MeshFactory {
    fn drop(&mut self) {
        unsafe {
            self.device
                .device
                .destroy_command_pool(self.command_pool, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> MeshData {
        MeshData::new(
            vec![
                Vertex::new([0.5, 0.5, 0.0], [1.0, 0.0, 0.0]),
                Vertex::new([0.5, -0.5, 0.0], [0.0, 1.0, 0.0]),
                Vertex::new([-0.5, -0.5, 0.0], [0.0, 0.0, 1.0]),
                Vertex::new([-0.5, 0.5, 0.0], [1.0, 1.0, 0.0]),
            ],
            vec![2, 1, 0, 0, 3, 2],
        )
    }

    #[test]
    fn vertex_layout_matches_shader_inputs() {
        let binding = Vertex::binding_description();
        assert_eq!(binding.stride, 24);
        assert_eq!(binding.input_rate, vk::VertexInputRate::VERTEX);

        let [pos, color] = Vertex::attribute_descriptions();
        assert_eq!((pos.location, pos.offset), (0, 0));
        assert_eq!((color.location, color.offset), (1, 12));
        assert_eq!(color.format, vk::Format::R32G32B32_SFLOAT);
    }

    #[test]
    fn vertices_cast_to_tightly_packed_floats() {
        let data = quad();
        let bytes: &[u8] = bytemuck::cast_slice(&data.vertices);
        assert_eq!(bytes.len(), 4 * 24);
        let floats: &[f32] = bytemuck::cast_slice(bytes);
        assert_eq!(&floats[..6], &[0.5, 0.5, 0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn quad_is_valid() {
        assert!(quad().validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_index() {
        let mut data = quad();
        data.indices[4] = 4;
        let err = data.validate().unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn rejects_partial_triangle() {
        let mut data = quad();
        data.indices.pop();
        assert!(data.validate().is_err());
    }

    #[test]
    fn rejects_empty_geometry() {
        assert!(MeshData::default().validate().is_err());
        let mut data = quad();
        data.indices.clear();
        assert!(data.validate().is_err());
    }
}
