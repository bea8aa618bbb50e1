//! 模型错误定义

use thiserror::Error;

/// 放置引擎错误
///
/// 结构/图错误（重复或缺失的UID、循环定位）无法在本地恢复，会直接返回给调用者；
/// 退化缩放在求解器内部按固定策略恢复，不会以错误形式出现。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("UID '{uid}' is already registered to an instance of {existing}")]
    DuplicateUid { uid: String, existing: &'static str },

    #[error("No object is registered for uid '{0}'")]
    UidNotFound(String),

    #[error("Object with uid '{uid}' is not a {expected} but a {found}")]
    UidTypeMismatch {
        uid: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Recursive definition of positionings: {}", .0.join(" -> "))]
    CyclicPositioningDefinition(Vec<String>),

    #[error("Illegal definition of positionings: {0}")]
    MalformedPositioning(String),

    #[error("Positioning to '{to}' starts at section '{from}' which no positioning ends at")]
    UnresolvedPositioningReference { from: String, to: String },

    #[error("Recursive parent definition of components: {}", .0.join(" -> "))]
    CyclicComponentParent(Vec<String>),

    #[error("Degenerate transformation: {0}")]
    DegenerateTransform(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Object '{0}' is no longer attached to its parent")]
    DetachedObject(String),
}

pub type Result<T> = std::result::Result<T, ModelError>;
