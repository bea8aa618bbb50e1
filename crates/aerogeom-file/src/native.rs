//! AeroGeom原生文件格式（.agm）
//!
//! 16 字节文件头之后是 Zstd 压缩的 MessagePack 数据：
//!
//! ```text
//! "AGEO" | version: u32 | flags: u32 | compressed_size: u32 | body
//! ```
//!
//! 所有整数均为小端序。

use crate::document::{Document, DocumentMetadata};
use crate::error::FileError;
use aerogeom_core::data::ModelData;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// 文件魔数 "AGEO"
const MAGIC: &[u8; 4] = b"AGEO";

/// 当前文件格式版本
const FORMAT_VERSION: u32 = 1;

/// Zstd 压缩级别
const COMPRESSION_LEVEL: i32 = 3;

#[derive(Debug)]
struct FileHeader {
    magic: [u8; 4],
    version: u32,
    /// 预留
    flags: u32,
    compressed_size: u32,
}

impl FileHeader {
    fn new(compressed_size: u32) -> Self {
        Self {
            magic: *MAGIC,
            version: FORMAT_VERSION,
            flags: 0,
            compressed_size,
        }
    }

    fn write(&self, writer: &mut impl Write) -> Result<(), std::io::Error> {
        writer.write_all(&self.magic)?;
        for field in [self.version, self.flags, self.compressed_size] {
            writer.write_all(&field.to_le_bytes())?;
        }
        Ok(())
    }

    fn read(reader: &mut impl Read) -> Result<Self, FileError> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(FileError::InvalidFormat(
                "Invalid magic number, not an AeroGeom model".to_string(),
            ));
        }

        let mut next_u32 = || -> Result<u32, std::io::Error> {
            let mut buf = [0u8; 4];
            reader.read_exact(&mut buf)?;
            Ok(u32::from_le_bytes(buf))
        };
        let version = next_u32()?;
        let flags = next_u32()?;
        let compressed_size = next_u32()?;

        Ok(Self {
            magic,
            version,
            flags,
            compressed_size,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct FileContent {
    metadata: DocumentMetadata,
    model: ModelData,
}

/// 保存文档到文件
pub fn save(document: &Document, path: &Path) -> Result<(), FileError> {
    let content = FileContent {
        metadata: document.metadata.clone(),
        model: document.model.clone(),
    };

    let msgpack_data = rmp_serde::to_vec(&content)?;
    let compressed_data = zstd::encode_all(msgpack_data.as_slice(), COMPRESSION_LEVEL)?;
    let compressed_size = u32::try_from(compressed_data.len()).map_err(|_| {
        FileError::InvalidFormat(format!(
            "compressed model of {} bytes exceeds the format limit",
            compressed_data.len()
        ))
    })?;

    let mut writer = BufWriter::new(File::create(path)?);
    FileHeader::new(compressed_size).write(&mut writer)?;
    writer.write_all(&compressed_data)?;
    writer.flush()?;

    tracing::info!(
        "Saved {} components, {} profiles to {} ({} bytes compressed)",
        content.model.components.len(),
        content.model.profiles.len(),
        path.display(),
        compressed_size
    );

    Ok(())
}

/// 从文件加载文档
///
/// 只检查文件格式；模型引用在 `Document::configuration` 构建对象图时校验。
pub fn load(path: &Path) -> Result<Document, FileError> {
    let mut reader = BufReader::new(File::open(path)?);
    let header = FileHeader::read(&mut reader)?;

    if header.version > FORMAT_VERSION {
        return Err(FileError::UnsupportedVersion(format!(
            "File version {} is newer than supported version {}",
            header.version, FORMAT_VERSION
        )));
    }

    // 按实际读到的字节分配，不信任文件头中的长度
    let mut compressed_data = Vec::new();
    reader
        .take(u64::from(header.compressed_size))
        .read_to_end(&mut compressed_data)?;
    if compressed_data.len() != header.compressed_size as usize {
        return Err(FileError::InvalidFormat(format!(
            "Truncated model body: header declares {} bytes, found {}",
            header.compressed_size,
            compressed_data.len()
        )));
    }
    let msgpack_data = zstd::decode_all(compressed_data.as_slice())?;
    let content: FileContent = rmp_serde::from_slice(&msgpack_data)?;

    tracing::info!(
        "Loaded {} components, {} section elements from {}",
        content.model.components.len(),
        content.model.element_count(),
        path.display()
    );

    Ok(Document {
        metadata: content.metadata,
        model: content.model,
    })
}
