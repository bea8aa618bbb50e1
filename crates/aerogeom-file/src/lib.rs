//! AeroGeom 文件格式处理
//!
//! 支持：
//! - `.agm` 原生格式（MessagePack + Zstd）
//! - `.json` 交换格式，便于手工编辑和版本管理

pub mod document;
pub mod error;
pub mod json;
pub mod native;

pub use document::{Document, DocumentMetadata};
pub use error::FileError;

use std::path::Path;

/// 按扩展名选择格式加载文档
pub fn open(path: &Path) -> Result<Document, FileError> {
    match extension(path).as_deref() {
        Some("agm") => native::load(path),
        Some("json") => json::import_json(path),
        _ => Err(FileError::UnsupportedExtension(path.display().to_string())),
    }
}

/// 按扩展名选择格式保存文档
pub fn save_as(document: &Document, path: &Path) -> Result<(), FileError> {
    match extension(path).as_deref() {
        Some("agm") => native::save(document, path),
        Some("json") => json::export_json(document, path),
        _ => Err(FileError::UnsupportedExtension(path.display().to_string())),
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_extension() {
        let document = Document::new();
        let path = std::env::temp_dir().join("aerogeom_test_model.step");
        assert!(matches!(
            save_as(&document, &path),
            Err(FileError::UnsupportedExtension(_))
        ));
        assert!(matches!(open(&path), Err(FileError::UnsupportedExtension(_))));
    }
}
