// Backend module - Vulkan abstraction layer
//
// Thin wrappers around ash. Each wrapper owns its handles and destroys them
// on drop; the device outlives everything through Arc<VulkanDevice>.

pub mod buffer;
pub mod descriptor;
pub mod device;
pub mod mesh;
pub mod pipeline;
pub mod pipeline_state;
pub mod shader;
pub mod swapchain;
pub mod sync;

pub use device::VulkanDevice;
pub use swapchain::Swapchain;
