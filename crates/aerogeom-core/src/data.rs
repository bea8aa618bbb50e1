//! 模型数据交换结构
//!
//! 对象图中的 `Rc`/`Weak` 链接无法直接序列化，读写都经过这里的纯数据结构：
//! `Configuration::from_data` 根据它构建对象图，`Configuration::to_data` 把字段写回。

use crate::component::{Component, ComponentKind};
use crate::configuration::Configuration;
use crate::element::SectionElement;
use crate::error::Result;
use crate::math::{Point3, Vector3};
use crate::positioning::Positioning;
use crate::profile::Profile;
use crate::section::Section;
use crate::segment::Segment;
use crate::settings::EngineSettings;
use crate::transform::Transformation;
use serde::{Deserialize, Serialize};
use tracing::info;

/// 变换字段，以数组形式存储便于阅读
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformationData {
    pub translation: [f64; 3],
    pub rotation: [f64; 3],
    pub scaling: [f64; 3],
    pub shear: [f64; 3],
}

impl Default for TransformationData {
    fn default() -> Self {
        Transformation::identity().into()
    }
}

impl From<Transformation> for TransformationData {
    fn from(t: Transformation) -> Self {
        Self {
            translation: t.translation.into(),
            rotation: t.rotation.into(),
            scaling: t.scaling.into(),
            shear: t.shear.into(),
        }
    }
}

impl From<TransformationData> for Transformation {
    fn from(data: TransformationData) -> Self {
        Self {
            translation: Vector3::from(data.translation),
            rotation: Vector3::from(data.rotation),
            scaling: Vector3::from(data.scaling),
            shear: Vector3::from(data.shear),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileData {
    pub uid: String,
    #[serde(default)]
    pub name: String,
    pub points: Vec<[f64; 3]>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementData {
    pub uid: String,
    #[serde(default)]
    pub name: String,
    pub profile_uid: String,
    #[serde(default)]
    pub transformation: TransformationData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionData {
    pub uid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub transformation: TransformationData,
    #[serde(default)]
    pub elements: Vec<ElementData>,
}

/// 定位规则；`from_section_uid` 为空表示根定位
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositioningData {
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub from_section_uid: String,
    pub to_section_uid: String,
    pub length: f64,
    #[serde(default)]
    pub sweep_angle: f64,
    #[serde(default)]
    pub dihedral_angle: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentData {
    pub uid: String,
    #[serde(default)]
    pub name: String,
    pub from_element_uid: String,
    pub to_element_uid: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentData {
    pub uid: String,
    #[serde(default)]
    pub name: String,
    pub kind: ComponentKind,
    #[serde(default)]
    pub parent_uid: String,
    #[serde(default)]
    pub transformation: TransformationData,
    #[serde(default)]
    pub sections: Vec<SectionData>,
    #[serde(default)]
    pub positionings: Vec<PositioningData>,
    #[serde(default)]
    pub segments: Vec<SegmentData>,
}

/// 完整模型
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelData {
    #[serde(default)]
    pub settings: EngineSettings,
    #[serde(default)]
    pub profiles: Vec<ProfileData>,
    #[serde(default)]
    pub components: Vec<ComponentData>,
}

impl ModelData {
    pub fn element_count(&self) -> usize {
        self.components
            .iter()
            .flat_map(|c| &c.sections)
            .map(|s| s.elements.len())
            .sum()
    }
}

impl From<&Profile> for ProfileData {
    fn from(profile: &Profile) -> Self {
        Self {
            uid: profile.uid(),
            name: profile.name(),
            points: profile.points().iter().map(|p| [p.x, p.y, p.z]).collect(),
        }
    }
}

impl From<&SectionElement> for ElementData {
    fn from(element: &SectionElement) -> Self {
        Self {
            uid: element.uid(),
            name: element.name(),
            profile_uid: element.profile_uid(),
            transformation: element.transformation().into(),
        }
    }
}

impl From<&Section> for SectionData {
    fn from(section: &Section) -> Self {
        Self {
            uid: section.uid(),
            name: section.name(),
            transformation: section.transformation().into(),
            elements: section.elements().iter().map(|e| e.as_ref().into()).collect(),
        }
    }
}

impl From<&Positioning> for PositioningData {
    fn from(positioning: &Positioning) -> Self {
        Self {
            uid: positioning.uid(),
            name: positioning.name(),
            from_section_uid: positioning.from_section_uid(),
            to_section_uid: positioning.to_section_uid(),
            length: positioning.length(),
            sweep_angle: positioning.sweep_angle(),
            dihedral_angle: positioning.dihedral_angle(),
        }
    }
}

impl From<&Segment> for SegmentData {
    fn from(segment: &Segment) -> Self {
        Self {
            uid: segment.uid(),
            name: segment.name(),
            from_element_uid: segment.from_element_uid(),
            to_element_uid: segment.to_element_uid(),
        }
    }
}

impl From<&Component> for ComponentData {
    fn from(component: &Component) -> Self {
        Self {
            uid: component.uid(),
            name: component.name(),
            kind: component.kind(),
            parent_uid: component.parent_uid(),
            transformation: component.transformation().into(),
            sections: component.sections().iter().map(|s| s.as_ref().into()).collect(),
            positionings: component
                .positionings()
                .iter()
                .map(|p| p.as_ref().into())
                .collect(),
            segments: component.segments().iter().map(|s| s.as_ref().into()).collect(),
        }
    }
}

impl Configuration {
    /// 由交换数据构建构型
    ///
    /// 重复 UID 在注册时报告；父部件、轮廓、元素引用和定位定义在所有对象
    /// 创建完毕后统一校验，因此数据中的声明顺序无关紧要。
    pub fn from_data(data: &ModelData) -> Result<Self> {
        let mut config = Configuration::new(data.settings);

        for profile in &data.profiles {
            let points = profile.points.iter().map(|p| Point3::from(*p)).collect();
            config.add_profile(&profile.uid, &profile.name, points)?;
        }

        for component_data in &data.components {
            let component =
                config.add_component(&component_data.uid, &component_data.name, component_data.kind)?;
            component.set_transformation(component_data.transformation.into())?;

            for section_data in &component_data.sections {
                let section = component.add_section(
                    &section_data.uid,
                    &section_data.name,
                    section_data.transformation.into(),
                )?;
                for element in &section_data.elements {
                    section.add_element(
                        &element.uid,
                        &element.name,
                        &element.profile_uid,
                        element.transformation.into(),
                    )?;
                }
            }

            for p in &component_data.positionings {
                component.add_positioning(
                    &p.uid,
                    &p.name,
                    &p.from_section_uid,
                    &p.to_section_uid,
                    p.length,
                    p.sweep_angle,
                    p.dihedral_angle,
                )?;
            }

            for segment in &component_data.segments {
                component.add_segment(
                    &segment.uid,
                    &segment.name,
                    &segment.from_element_uid,
                    &segment.to_element_uid,
                )?;
            }
        }

        // 父部件可能声明在子部件之后
        for component_data in &data.components {
            if !component_data.parent_uid.is_empty() {
                config
                    .component(&component_data.uid)?
                    .assign_parent_uid(&component_data.parent_uid);
            }
        }

        config.validate()?;
        info!(
            "Built configuration: {} profiles, {} components, {} section elements",
            data.profiles.len(),
            data.components.len(),
            data.element_count()
        );
        Ok(config)
    }

    /// 把当前字段写回交换数据
    pub fn to_data(&self) -> ModelData {
        ModelData {
            settings: self.settings(),
            profiles: self.profiles().iter().map(|p| p.as_ref().into()).collect(),
            components: self.components().iter().map(|c| c.as_ref().into()).collect(),
        }
    }
}
