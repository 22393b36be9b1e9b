//! 捕捉配置

use crate::mode::SnapMode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 配置加载错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid snap radius: {0}")]
    InvalidRadius(f64),
}

/// 捕捉配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapConfig {
    /// 请求的捕捉模式
    pub modes: SnapMode,
    /// 捕捉半径（屏幕像素）
    pub radius_px: f64,
    /// 是否剔除背面
    pub use_backface_culling: bool,
    /// 记录射线穿过的全部命中
    pub hit_all: bool,
    /// 表面最近点搜索的步数
    pub nearest_steps: u32,
}

impl Default for SnapConfig {
    fn default() -> Self {
        Self {
            modes: SnapMode::VERTEX | SnapMode::EDGE | SnapMode::FACE,
            radius_px: 15.0, // 15像素
            use_backface_culling: false,
            hit_all: false,
            nearest_steps: 4,
        }
    }
}

impl SnapConfig {
    /// 从JSON加载，缺失字段使用默认值
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: SnapConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.radius_px.is_finite() || self.radius_px < 0.0 {
            return Err(ConfigError::InvalidRadius(self.radius_px));
        }
        Ok(())
    }

    /// 初始的像素距离平方阈值
    pub fn radius_sq(&self) -> f64 {
        self.radius_px * self.radius_px
    }

    pub fn with_modes(mut self, modes: SnapMode) -> Self {
        self.modes = modes;
        self
    }

    pub fn with_radius(mut self, radius_px: f64) -> Self {
        self.radius_px = radius_px;
        self
    }

    pub fn with_backface_culling(mut self, enabled: bool) -> Self {
        self.use_backface_culling = enabled;
        self
    }

    pub fn with_hit_all(mut self, enabled: bool) -> Self {
        self.hit_all = enabled;
        self
    }
}
