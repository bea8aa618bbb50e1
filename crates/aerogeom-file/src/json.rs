//! JSON 交换格式
//!
//! 与原生格式保存相同的内容，便于手工编辑或与其他工具交换。

use crate::document::Document;
use crate::error::FileError;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// 导出为带缩进的 JSON
pub fn export_json(document: &Document, path: &Path) -> Result<(), FileError> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, document)?;
    writer.flush()?;

    tracing::info!(
        "Exported {} components to {}",
        document.model.components.len(),
        path.display()
    );
    Ok(())
}

pub fn import_json(path: &Path) -> Result<Document, FileError> {
    let reader = BufReader::new(File::open(path)?);
    let document: Document = serde_json::from_reader(reader)?;

    tracing::info!(
        "Imported {} components, {} section elements from {}",
        document.model.components.len(),
        document.element_count(),
        path.display()
    );
    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::tests::sample_document;

    #[test]
    fn test_export_import() {
        let file_path = std::env::temp_dir().join("aerogeom_test_document.json");
        let document = sample_document();

        export_json(&document, &file_path).expect("Failed to export");
        let imported = import_json(&file_path).expect("Failed to import");

        assert_eq!(imported.metadata.title, "Test Aircraft");
        assert_eq!(imported.model.components.len(), 2);
        assert_eq!(imported.element_count(), 3);
        assert_eq!(
            imported.model.components[1].parent_uid,
            document.model.components[1].parent_uid
        );
        assert!(imported.configuration().is_ok());

        std::fs::remove_file(&file_path).ok();
    }

    #[test]
    fn test_demo_model() {
        let document: Document =
            serde_json::from_str(include_str!("../../../demos/simple_wing.json")).unwrap();
        let config = document.configuration().unwrap();
        assert_eq!(config.fuselages().len(), 1);
        assert_eq!(config.wings().len(), 1);
        assert_eq!(config.wings()[0].parent_uid(), "F1");
    }

    #[test]
    fn test_malformed_json() {
        let file_path = std::env::temp_dir().join("aerogeom_test_malformed.json");
        std::fs::write(&file_path, "{ \"metadata\": 1 }").expect("Failed to write");

        assert!(matches!(import_json(&file_path), Err(FileError::Json(_))));

        std::fs::remove_file(&file_path).ok();
    }
}
