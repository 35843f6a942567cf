use std::fs;
use std::path::{Path, PathBuf};

use kiln_crate_tools::resource::KilnPath;
use kiln_gfx::error::{GfxError, GfxResult};
use serde::{Deserialize, Serialize};

use crate::swap_interval::SwapInterval;

/// 后端的运行时配置，由宿主程序从 TOML 文件读取
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// 写入 `VkApplicationInfo`
    pub app_name: String,

    pub swap_interval: SwapInterval,

    /// 请求的 MSAA 采样数，会被限制在设备支持的范围内；1 表示关闭
    pub msaa_samples: u32,

    /// 是否开启 validation layer 以及 debug utils
    pub validation: bool,

    /// SPIR-V 所在目录，相对路径基于工作区根目录
    pub shader_dir: PathBuf,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            app_name: "kiln".to_string(),
            swap_interval: SwapInterval::Vsync,
            msaa_samples: 1,
            validation: cfg!(debug_assertions),
            shader_dir: KilnPath::shader_build_path(),
        }
    }
}

impl BackendConfig {
    pub fn from_toml_str(content: &str) -> GfxResult<Self> {
        let mut config: BackendConfig = toml::from_str(content).map_err(|e| GfxError::Config(e.to_string()))?;
        if config.shader_dir.is_relative() {
            config.shader_dir = KilnPath::workspace_path().join(&config.shader_dir);
        }
        Ok(config)
    }

    /// 从 TOML 文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> GfxResult<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// 文件不存在或者解析失败时使用默认配置
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            log::info!("config file {:?} not found, use default config", path);
            return Self::default();
        }
        match Self::from_file(path) {
            Ok(config) => {
                log::info!("config loaded from {:?}", path);
                config
            }
            Err(e) => {
                log::warn!("failed to load config {:?}: {}, use default config", path, e);
                Self::default()
            }
        }
    }

    pub fn to_toml_string(&self) -> GfxResult<String> {
        toml::to_string_pretty(self).map_err(|e| GfxError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_partial() {
        let config = BackendConfig::from_toml_str(
            r#"
            app_name = "demo"
            swap_interval = "adaptive_vsync"
            msaa_samples = 4
            "#,
        )
        .unwrap();
        assert_eq!(config.app_name, "demo");
        assert_eq!(config.swap_interval, SwapInterval::AdaptiveVsync);
        assert_eq!(config.msaa_samples, 4);
        assert_eq!(config.validation, BackendConfig::default().validation);
    }

    #[test]
    fn test_relative_shader_dir() {
        let config = BackendConfig::from_toml_str(r#"shader_dir = "shader/spv""#).unwrap();
        assert_eq!(config.shader_dir, KilnPath::workspace_path().join("shader/spv"));
    }

    #[test]
    fn test_invalid_config() {
        let err = BackendConfig::from_toml_str(r#"swap_interval = "sometimes""#).unwrap_err();
        assert!(matches!(err, GfxError::Config(_)));
    }

    #[test]
    fn test_missing_file_uses_default() {
        let config = BackendConfig::load_or_default(KilnPath::config_path("does-not-exist.toml"));
        assert_eq!(config, BackendConfig::default());
    }

    #[test]
    fn test_serialize_and_parse() {
        let config = BackendConfig {
            msaa_samples: 8,
            swap_interval: SwapInterval::Immediate,
            ..Default::default()
        };
        let text = config.to_toml_string().unwrap();
        assert_eq!(BackendConfig::from_toml_str(&text).unwrap(), config);
    }
}
