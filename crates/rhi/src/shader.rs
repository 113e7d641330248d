//! Shader loading and VkShaderModule creation.
//!
//! The frame engine ships one SPIR-V module containing both stages; each
//! pipeline stage picks its entry point by name.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use relay_rhi::device::Device;
//! use relay_rhi::shader::{read_shader_file, ShaderModule, ShaderStage};
//!
//! # fn example(device: Arc<Device>) -> Result<(), relay_rhi::RhiError> {
//! let bytes = read_shader_file("shaders/triangle.spv")?;
//! let module = ShaderModule::from_bytes(device, &bytes)?;
//!
//! let stages = [
//!     module.stage_create_info(ShaderStage::Vertex, c"vertexMain"),
//!     module.stage_create_info(ShaderStage::Fragment, c"fragmentMain"),
//! ];
//! # Ok(())
//! # }
//! ```

use std::ffi::CStr;
use std::path::Path;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Entry point of the vertex stage in the bundled module.
pub const VERTEX_ENTRY: &CStr = c"vertexMain";
/// Entry point of the fragment stage in the bundled module.
pub const FRAGMENT_ENTRY: &CStr = c"fragmentMain";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub fn to_vk_stage(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
        }
    }
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Reads a compiled shader file. The bytes are returned as-is.
pub fn read_shader_file(path: impl AsRef<Path>) -> RhiResult<Vec<u8>> {
    let path = path.as_ref();
    debug!("Loading shader bytes from {:?}", path);

    std::fs::read(path).map_err(|e| {
        RhiError::ShaderError(format!("Failed to open shader file {:?}: {}", path, e))
    })
}

/// Reinterprets SPIR-V bytes as little-endian code words.
fn spirv_words(bytes: &[u8]) -> RhiResult<Vec<u32>> {
    if bytes.is_empty() || !bytes.len().is_multiple_of(4) {
        return Err(RhiError::ShaderError(format!(
            "SPIR-V code must be a non-empty multiple of 4 bytes, got {} bytes",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// RAII wrapper for a VkShaderModule holding any number of entry points.
pub struct ShaderModule {
    device: Arc<Device>,
    module: vk::ShaderModule,
}

impl ShaderModule {
    /// Creates a shader module from raw SPIR-V bytes.
    pub fn from_bytes(device: Arc<Device>, bytes: &[u8]) -> RhiResult<Self> {
        let code = spirv_words(bytes)?;
        let create_info = vk::ShaderModuleCreateInfo::default().code(&code);

        // SAFETY: `code` is word-aligned and outlives the call.
        let module = unsafe { device.handle().create_shader_module(&create_info, None)? };

        info!("Created shader module ({} bytes)", bytes.len());

        Ok(Self { device, module })
    }

    #[inline]
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    /// Stage description for pipeline creation using `entry_point`.
    pub fn stage_create_info<'a>(
        &self,
        stage: ShaderStage,
        entry_point: &'a CStr,
    ) -> vk::PipelineShaderStageCreateInfo<'a> {
        vk::PipelineShaderStageCreateInfo::default()
            .stage(stage.to_vk_stage())
            .module(self.module)
            .name(entry_point)
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        // SAFETY: the module was created from this device and is destroyed once.
        unsafe {
            self.device
                .handle()
                .destroy_shader_module(self.module, None);
        }
        debug!("Destroyed shader module");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shader_stage_to_vk_stage() {
        assert_eq!(
            ShaderStage::Vertex.to_vk_stage(),
            vk::ShaderStageFlags::VERTEX
        );
        assert_eq!(
            ShaderStage::Fragment.to_vk_stage(),
            vk::ShaderStageFlags::FRAGMENT
        );
    }

    #[test]
    fn test_shader_stage_display() {
        assert_eq!(format!("{}", ShaderStage::Vertex), "vertex");
        assert_eq!(format!("{}", ShaderStage::Fragment), "fragment");
    }

    #[test]
    fn test_spirv_words_little_endian() {
        let bytes = [0x03, 0x02, 0x23, 0x07, 0x00, 0x00, 0x01, 0x00];
        assert_eq!(spirv_words(&bytes).unwrap(), vec![0x0723_0203, 0x0001_0000]);
    }

    #[test]
    fn test_spirv_words_rejects_misaligned() {
        assert!(matches!(
            spirv_words(&[1, 2, 3]),
            Err(RhiError::ShaderError(_))
        ));
        assert!(spirv_words(&[]).is_err());
    }

    #[test]
    fn test_read_shader_file_missing() {
        let err = read_shader_file("definitely/not/here.spv").unwrap_err();
        assert!(err.to_string().contains("Failed to open shader file"));
    }

    #[test]
    fn test_read_shader_file_returns_raw_bytes() {
        let path = std::env::temp_dir().join(format!("relay-shader-{}.bin", std::process::id()));
        // Not valid SPIR-V: the loader does no validation
        std::fs::write(&path, [1u8, 2, 3]).unwrap();
        let bytes = read_shader_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(bytes, vec![1, 2, 3]);
    }
}
