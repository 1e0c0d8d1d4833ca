// Shader module loading
//
// Vulkan consumes SPIR-V words. Shaders are compiled by build.rs (glslc) and
// read from disk at startup so they can be reloaded without rebuilding.

use anyhow::{Context, Result};
use ash::vk;
use std::io::Cursor;
use std::path::Path;
use super::VulkanDevice;

const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Decode SPIR-V bytes into words, checking length and magic number
pub fn parse_spirv(bytes: &[u8]) -> Result<Vec<u32>> {
    anyhow::ensure!(
        bytes.len() % 4 == 0,
        "SPIR-V length {} is not a multiple of 4",
        bytes.len()
    );

    let header: [u8; 4] = bytes
        .get(..4)
        .and_then(|b| b.try_into().ok())
        .context("Empty SPIR-V module")?;
    let magic = u32::from_le_bytes(header);
    anyhow::ensure!(
        magic == SPIRV_MAGIC || magic.swap_bytes() == SPIRV_MAGIC,
        "Bad SPIR-V magic number {:#010x}",
        magic
    );

    // read_spv handles alignment and byte-swaps big-endian modules
    ash::util::read_spv(&mut Cursor::new(bytes)).context("Failed to read SPIR-V")
}

/// Create a shader module from SPIR-V bytes
pub fn create_shader_module(device: &VulkanDevice, code: &[u8]) -> Result<vk::ShaderModule> {
    let words = parse_spirv(code)?;
    let create_info = vk::ShaderModuleCreateInfo::builder().code(&words);

    unsafe { device.device.create_shader_module(&create_info, None) }
        .context("Failed to create shader module")
}

/// Read a compiled `.spv` file and create a shader module from it
pub fn load_shader_module(device: &VulkanDevice, path: &Path) -> Result<vk::ShaderModule> {
    let bytes = std::fs::read(path).with_context(|| {
        format!(
            "Failed to read shader {:?} (compile it with glslc, see build.rs)",
            path
        )
    })?;
    log::debug!("Loaded shader {:?} ({} bytes)", path, bytes.len());
    create_shader_module(device, &bytes).with_context(|| format!("Invalid shader {:?}", path))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module_bytes(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    #[test]
    fn accepts_valid_header() {
        let bytes = module_bytes(&[SPIRV_MAGIC, 0x0001_0000, 0, 1, 0]);
        let words = parse_spirv(&bytes).unwrap();
        assert_eq!(words.len(), 5);
        assert_eq!(words[0], SPIRV_MAGIC);
    }

    #[test]
    fn swaps_big_endian_modules() {
        let bytes: Vec<u8> = [SPIRV_MAGIC, 0x0001_0000]
            .iter()
            .flat_map(|w| w.to_be_bytes())
            .collect();
        let words = parse_spirv(&bytes).unwrap();
        assert_eq!(words, vec![SPIRV_MAGIC, 0x0001_0000]);
    }

    #[test]
    fn rejects_truncated_input() {
        let mut bytes = module_bytes(&[SPIRV_MAGIC, 1]);
        bytes.pop();
        assert!(parse_spirv(&bytes).is_err());
    }

    #[test]
    fn rejects_wrong_magic() {
        let bytes = module_bytes(&[0xdead_beef, 1]);
        let err = parse_spirv(&bytes).unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.contains("magic"), "{}", message);
        assert!(message.contains("0xdeadbeef"), "{}", message);
    }

    #[test]
    fn rejects_empty_input() {
        let err = parse_spirv(&[]).unwrap_err();
        assert!(format!("{:#}", err).contains("Empty"));
    }
}
