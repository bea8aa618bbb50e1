//! AeroGeom 放置与失效引擎
//!
//! 为参数化飞行器几何维护截面元素的位置：每个元素的放置由定位规则、截面变换和
//! 元素变换三部分复合而成，三者可以独立编辑。
//!
//! # 架构设计
//!
//! - `UidRegistry`: 模型内的 `uid -> 对象` 目录以及反向引用表，驱动失效级联
//! - `PositioningTree`: 定位规则组成的森林，解析出每个截面的基点
//! - `CacheCell`: 惰性缓存，失效后在下一次查询时重建
//! - `SectionElement`: 复合变换并提供反向求解（设置宽度、中心、法向等）
//!
//! 对象图是单线程的：容器通过 `Rc` 拥有子对象，注册表和反向引用只持有 `Weak`。
//!
//! # 示例
//!
//! ```rust
//! use aerogeom_core::prelude::*;
//!
//! let mut config = Configuration::default();
//! config
//!     .add_profile("P1", "square", vec![
//!         Point3::new(0.0, 0.0, 0.0),
//!         Point3::new(1.0, 0.0, 0.0),
//!         Point3::new(1.0, 0.0, 1.0),
//!         Point3::new(0.0, 0.0, 1.0),
//!     ])
//!     .unwrap();
//! let wing = config.add_component("W1", "wing", ComponentKind::Wing).unwrap();
//! let section = wing.add_section("W1_Sec1", "", Transformation::identity()).unwrap();
//! let element = section
//!     .add_element("W1_Sec1_Elem1", "", "P1", Transformation::identity())
//!     .unwrap();
//!
//! element.set_width(2.0, ReferenceFrame::Global).unwrap();
//! assert!((element.area(ReferenceFrame::Global).unwrap() - 2.0).abs() < 1e-9);
//! ```

pub mod cache;
pub mod component;
pub mod configuration;
pub mod data;
pub mod element;
pub mod error;
pub mod math;
pub mod positioning;
pub mod profile;
pub mod section;
pub mod segment;
pub mod settings;
pub mod transform;
pub mod uid;

#[cfg(test)]
mod test_support;

pub mod prelude {
    //! 常用类型的便捷导入
    pub use crate::cache::CacheCell;
    pub use crate::component::{Component, ComponentKind};
    pub use crate::configuration::Configuration;
    pub use crate::data::ModelData;
    pub use crate::element::{ReferenceFrame, SectionElement};
    pub use crate::error::{ModelError, Result};
    pub use crate::math::{Matrix4, Point3, Vector3};
    pub use crate::positioning::{Positioning, PositioningNode, PositioningTree};
    pub use crate::profile::Profile;
    pub use crate::section::Section;
    pub use crate::segment::Segment;
    pub use crate::settings::EngineSettings;
    pub use crate::transform::{AffineDecomposition, Transformation};
    pub use crate::uid::{UidObject, UidRegistry};
}
