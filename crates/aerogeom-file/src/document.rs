//! 文档：模型数据加元数据

use aerogeom_core::configuration::Configuration;
use aerogeom_core::data::ModelData;
use aerogeom_core::error::ModelError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 文档元数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl Default for DocumentMetadata {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            title: "Untitled".to_string(),
            author: String::new(),
            description: String::new(),
            created_at: now,
            modified_at: now,
        }
    }
}

/// 可保存的文档
///
/// 文档只保存字段数据，对象图在需要时由 `configuration()` 重建。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub metadata: DocumentMetadata,
    pub model: ModelData,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_configuration(config: &Configuration) -> Self {
        Self {
            metadata: DocumentMetadata::default(),
            model: config.to_data(),
        }
    }

    /// 构建对象图，引用和定位定义在此校验
    pub fn configuration(&self) -> Result<Configuration, ModelError> {
        Configuration::from_data(&self.model)
    }

    /// 用构型的当前字段替换模型数据并更新修改时间
    pub fn update(&mut self, config: &Configuration) {
        self.model = config.to_data();
        self.metadata.modified_at = Utc::now();
    }

    pub fn element_count(&self) -> usize {
        self.model.element_count()
    }
}
