use std::fs::File;
use std::path::{Path, PathBuf};

use kiln_gfx::error::{GfxError, GfxResult};

/// 根据逻辑名称提供 SPIR-V
pub trait ShaderLoader {
    fn load_spirv(&self, name: &str) -> GfxResult<Vec<u32>>;
}

/// 从目录中读取 `<name>.spv`
pub struct DirShaderLoader {
    dir: PathBuf,
}

impl DirShaderLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[inline]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn shader_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.spv"))
    }
}

impl ShaderLoader for DirShaderLoader {
    fn load_spirv(&self, name: &str) -> GfxResult<Vec<u32>> {
        let path = self.shader_path(name);
        let shader_load_err = |reason: String| GfxError::ShaderLoad {
            name: name.to_string(),
            reason,
        };

        let mut file = File::open(&path).map_err(|e| shader_load_err(format!("{}: {e}", path.display())))?;
        let code = ash::util::read_spv(&mut file).map_err(|e| shader_load_err(e.to_string()))?;
        log::debug!("shader `{}` loaded from {:?}, {} words", name, path, code.len());
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("kiln-shader-loader-{name}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_load_spirv() {
        let dir = temp_dir("ok");
        // magic number + 一个任意的 word
        let words: [u32; 2] = [0x0723_0203, 0x0001_0000];
        let bytes = words.iter().flat_map(|w| w.to_le_bytes()).collect::<Vec<u8>>();
        std::fs::write(dir.join("triangle.vert.spv"), bytes).unwrap();

        let loader = DirShaderLoader::new(&dir);
        assert_eq!(loader.load_spirv("triangle.vert").unwrap(), words.to_vec());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_shader() {
        let loader = DirShaderLoader::new(temp_dir("missing"));
        let err = loader.load_spirv("nope").unwrap_err();
        assert!(matches!(err, GfxError::ShaderLoad { ref name, .. } if name == "nope"));
    }

    #[test]
    fn test_misaligned_spirv() {
        let dir = temp_dir("misaligned");
        std::fs::write(dir.join("bad.spv"), [1_u8, 2, 3]).unwrap();
        let loader = DirShaderLoader::new(&dir);
        assert!(loader.load_spirv("bad").is_err());
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
