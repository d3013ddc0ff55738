// SPDX-License-Identifier: CEPL-1.0
use std::io::Cursor;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ash::util::read_spv;
use shaderapi_device::ShaderStage;
use tracing::info;

use crate::error::DeviceError;

const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Supplies raw SPIR-V for the batch pipeline's two stages.
pub trait ShaderBinaryLoader {
    fn load(&self, stage: ShaderStage) -> Result<Vec<u8>>;

    fn describe(&self, stage: ShaderStage) -> String;
}

/// Reads `<root>/shaders/vert.spv` and `<root>/shaders/frag.spv`.
#[derive(Clone, Debug)]
pub struct FileShaderLoader {
    root: PathBuf,
}

impl FileShaderLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self, stage: ShaderStage) -> PathBuf {
        let file = match stage {
            ShaderStage::Vertex => "vert.spv",
            ShaderStage::Fragment => "frag.spv",
        };
        self.root.join("shaders").join(file)
    }
}

impl ShaderBinaryLoader for FileShaderLoader {
    fn load(&self, stage: ShaderStage) -> Result<Vec<u8>> {
        let path = self.path(stage);
        std::fs::read(&path).with_context(|| format!("read {}", path.display()))
    }

    fn describe(&self, stage: ShaderStage) -> String {
        self.path(stage).display().to_string()
    }
}

/// SPIR-V compiled from `shaders/*.{vert,frag}` by the build script.
#[cfg(feature = "embed-shaders")]
#[derive(Clone, Copy, Debug, Default)]
pub struct EmbeddedShaderLoader;

#[cfg(feature = "embed-shaders")]
impl ShaderBinaryLoader for EmbeddedShaderLoader {
    fn load(&self, stage: ShaderStage) -> Result<Vec<u8>> {
        Ok(match stage {
            ShaderStage::Vertex => include_bytes!(concat!(env!("OUT_DIR"), "/vert.spv")).to_vec(),
            ShaderStage::Fragment => include_bytes!(concat!(env!("OUT_DIR"), "/frag.spv")).to_vec(),
        })
    }

    fn describe(&self, stage: ShaderStage) -> String {
        format!("embedded {stage:?} shader")
    }
}

/// The loader this build uses for the batch pipeline.
#[cfg(feature = "embed-shaders")]
pub fn default_loader(_root: &Path) -> Box<dyn ShaderBinaryLoader> {
    Box::new(EmbeddedShaderLoader)
}

#[cfg(not(feature = "embed-shaders"))]
pub fn default_loader(root: &Path) -> Box<dyn ShaderBinaryLoader> {
    Box::new(FileShaderLoader::new(root))
}

/// Decodes SPIR-V bytes into words, rejecting anything without the magic
/// number.
pub fn decode_spirv(bytes: &[u8], name: &str) -> Result<Vec<u32>> {
    let words = read_spv(&mut Cursor::new(bytes))
        .map_err(|_| DeviceError::InvalidShader(name.to_owned()))?;
    if words.first() != Some(&SPIRV_MAGIC) {
        return Err(DeviceError::InvalidShader(name.to_owned()).into());
    }
    Ok(words)
}

/// Vertex and fragment words for the batch pipeline. Loaded once at init so
/// swapchain recreation does not touch the filesystem.
#[derive(Clone, Debug)]
pub struct ShaderBinaries {
    pub vertex: Vec<u32>,
    pub fragment: Vec<u32>,
}

impl ShaderBinaries {
    pub fn load(loader: &dyn ShaderBinaryLoader) -> Result<Self> {
        let get = |stage| -> Result<Vec<u32>> {
            let name = loader.describe(stage);
            decode_spirv(&loader.load(stage)?, &name)
        };
        let bins = Self {
            vertex: get(ShaderStage::Vertex)?,
            fragment: get(ShaderStage::Fragment)?,
        };
        info!(
            "vk: shaders loaded ({} + {} words)",
            bins.vertex.len(),
            bins.fragment.len()
        );
        Ok(bins)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module_bytes(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    struct Fixed(Vec<u8>, Vec<u8>);

    impl ShaderBinaryLoader for Fixed {
        fn load(&self, stage: ShaderStage) -> Result<Vec<u8>> {
            Ok(match stage {
                ShaderStage::Vertex => self.0.clone(),
                ShaderStage::Fragment => self.1.clone(),
            })
        }

        fn describe(&self, stage: ShaderStage) -> String {
            format!("{stage:?}")
        }
    }

    #[test]
    fn file_loader_uses_fixed_relative_pair() {
        let l = FileShaderLoader::new("assets");
        assert_eq!(
            l.path(ShaderStage::Vertex),
            Path::new("assets").join("shaders").join("vert.spv")
        );
        assert_eq!(
            l.path(ShaderStage::Fragment),
            Path::new("assets").join("shaders").join("frag.spv")
        );
    }

    #[test]
    fn missing_file_names_the_path() {
        let l = FileShaderLoader::new("/nonexistent-shaderapi-root");
        let err = l.load(ShaderStage::Vertex).unwrap_err();
        assert!(format!("{err:#}").contains("vert.spv"));
    }

    #[test]
    fn decode_checks_length_and_magic() {
        let good = module_bytes(&[SPIRV_MAGIC, 0x0001_0000, 0, 1, 0]);
        assert_eq!(decode_spirv(&good, "ok").unwrap().len(), 5);
        assert!(decode_spirv(&good[..7], "short").is_err());
        assert!(decode_spirv(&module_bytes(&[0xdead_beef, 0]), "bad").is_err());
        assert!(decode_spirv(&[], "empty").is_err());
    }

    #[cfg(feature = "embed-shaders")]
    #[test]
    fn shipped_shaders_load_through_default_loader() {
        let loader = default_loader(Path::new("/nonexistent-shaderapi-root"));
        let bins = ShaderBinaries::load(loader.as_ref()).unwrap();
        assert_eq!(bins.vertex[0], SPIRV_MAGIC);
        assert_eq!(bins.fragment[0], SPIRV_MAGIC);
        assert!(bins.vertex.len() > 5 && bins.fragment.len() > 5);
    }

    #[test]
    fn binaries_load_both_stages() {
        let v = module_bytes(&[SPIRV_MAGIC, 1, 2]);
        let f = module_bytes(&[SPIRV_MAGIC, 3]);
        let bins = ShaderBinaries::load(&Fixed(v, f)).unwrap();
        assert_eq!(bins.vertex, [SPIRV_MAGIC, 1, 2]);
        assert_eq!(bins.fragment, [SPIRV_MAGIC, 3]);

        let err = ShaderBinaries::load(&Fixed(vec![0; 8], vec![])).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DeviceError>(),
            Some(DeviceError::InvalidShader(n)) if n == "Vertex"
        ));
    }
}
