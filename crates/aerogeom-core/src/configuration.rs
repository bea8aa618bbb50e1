//! 飞行器构型
//!
//! 构型是对象树的根：拥有注册表、引擎配置、轮廓和部件。

use crate::component::{Component, ComponentKind};
use crate::element::SectionElement;
use crate::error::{ModelError, Result};
use crate::math::Point3;
use crate::profile::Profile;
use crate::section::Section;
use crate::settings::EngineSettings;
use crate::uid::{UidObject, UidRegistry};
use std::rc::Rc;
use tracing::info;

/// 飞行器构型
#[derive(Debug)]
pub struct Configuration {
    registry: Rc<UidRegistry>,
    settings: EngineSettings,
    profiles: Vec<Rc<Profile>>,
    components: Vec<Rc<Component>>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new(EngineSettings::default())
    }
}

impl Configuration {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            registry: UidRegistry::new(),
            settings,
            profiles: Vec::new(),
            components: Vec::new(),
        }
    }

    pub fn registry(&self) -> &Rc<UidRegistry> {
        &self.registry
    }

    pub fn settings(&self) -> EngineSettings {
        self.settings
    }

    // === 轮廓 ===

    pub fn profiles(&self) -> &[Rc<Profile>] {
        &self.profiles
    }

    pub fn profile(&self, uid: &str) -> Result<Rc<Profile>> {
        self.registry.resolve_as::<Profile>(uid)
    }

    pub fn add_profile(&mut self, uid: &str, name: &str, points: Vec<Point3>) -> Result<Rc<Profile>> {
        let profile = Profile::new(&self.registry, uid, name, points)?;
        self.profiles.push(Rc::clone(&profile));
        Ok(profile)
    }

    /// 移除轮廓；引用它的元素失效，之后查询报告 `UidNotFound`
    pub fn remove_profile(&mut self, uid: &str) -> Result<()> {
        let index = self
            .profiles
            .iter()
            .position(|p| *p.link().uid_ref() == uid)
            .ok_or_else(|| ModelError::UidNotFound(uid.to_string()))?;
        let profile = self.profiles.remove(index);
        profile.invalidate(None);
        profile.detach();
        Ok(())
    }

    // === 部件 ===

    pub fn components(&self) -> &[Rc<Component>] {
        &self.components
    }

    pub fn component(&self, uid: &str) -> Result<Rc<Component>> {
        self.registry.resolve_as::<Component>(uid)
    }

    pub fn components_of_kind(&self, kind: ComponentKind) -> Vec<Rc<Component>> {
        self.components
            .iter()
            .filter(|c| c.kind() == kind)
            .cloned()
            .collect()
    }

    pub fn fuselages(&self) -> Vec<Rc<Component>> {
        self.components_of_kind(ComponentKind::Fuselage)
    }

    pub fn wings(&self) -> Vec<Rc<Component>> {
        self.components_of_kind(ComponentKind::Wing)
    }

    pub fn add_component(&mut self, uid: &str, name: &str, kind: ComponentKind) -> Result<Rc<Component>> {
        let component = Component::new(&self.registry, uid, name, kind, self.settings)?;
        self.components.push(Rc::clone(&component));
        Ok(component)
    }

    /// 移除部件及其全部子对象；以它为父部件的部件随之失效
    pub fn remove_component(&mut self, uid: &str) -> Result<()> {
        let index = self
            .components
            .iter()
            .position(|c| *c.link().uid_ref() == uid)
            .ok_or_else(|| ModelError::UidNotFound(uid.to_string()))?;
        let component = self.components.remove(index);
        component.invalidate(None);
        component.detach();
        Ok(())
    }

    // === 查找 ===

    pub fn section(&self, uid: &str) -> Result<Rc<Section>> {
        self.registry.resolve_as::<Section>(uid)
    }

    pub fn element(&self, uid: &str) -> Result<Rc<SectionElement>> {
        self.registry.resolve_as::<SectionElement>(uid)
    }

    /// 检查所有引用和定位定义，返回遇到的第一个错误
    pub fn validate(&self) -> Result<()> {
        for component in &self.components {
            component.global_transformation()?;
            component.positioning_tree()?;
            for section in component.sections() {
                for element in section.elements() {
                    element.profile()?;
                }
            }
            for segment in component.segments() {
                segment.inner_element()?;
                segment.outer_element()?;
            }
        }
        info!(
            "Configuration validated: {} profiles, {} components",
            self.profiles.len(),
            self.components.len()
        );
        Ok(())
    }
}
