use std::path::{Path, PathBuf};

/// 统一路径管理
///
/// 所有路径基于工作区根目录（通过 `CARGO_MANIFEST_DIR` 推导）。
///
/// # 使用示例
/// ```ignore
/// let config = KilnPath::config_path("kiln.toml");   // config/kiln.toml
/// let shaders = KilnPath::shader_build_path();       // shader/.build
/// ```
pub struct KilnPath {}
// 核心路径
impl KilnPath {
    /// 获取工作区根目录
    pub fn workspace_path() -> PathBuf {
        let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
        manifest_dir.parent().unwrap_or(manifest_dir).to_path_buf()
    }

    pub fn target_path() -> PathBuf {
        Self::workspace_path().join("target")
    }
}
// 根目录下
impl KilnPath {
    /// 获取 `config/` 目录下的文件路径
    pub fn config_path(filename: &str) -> PathBuf {
        Self::workspace_path().join("config").join(filename)
    }

    /// 编译后的 SPIR-V 所在目录：`shader/.build/`
    pub fn shader_build_path() -> PathBuf {
        Self::workspace_path().join("shader").join(".build")
    }
}
