//! 引擎配置

use serde::{Deserialize, Serialize};

/// 放置引擎配置
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// 缩放分量小于该值时视为退化，求解前替换为 1
    pub degenerate_scale_epsilon: f64,

    /// 几何比较容差（参考方向回退、仿射检查等）
    pub tolerance: f64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            degenerate_scale_epsilon: 1e-10,
            tolerance: crate::math::EPSILON,
        }
    }
}
