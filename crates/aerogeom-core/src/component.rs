//! 结构部件（机身、机翼）
//!
//! 部件拥有截面、定位规则和翼段，并缓存两项派生数据：
//! - 已解析的定位树
//! - 全局变换（父部件的全局变换与自身变换的复合）

use crate::cache::CacheCell;
use crate::error::{ModelError, Result};
use crate::math::{Matrix4, Point3};
use crate::positioning::{Positioning, PositioningTree};
use crate::section::Section;
use crate::segment::Segment;
use crate::settings::EngineSettings;
use crate::transform::Transformation;
use crate::uid::{UidLink, UidObject, UidRegistry};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use tracing::debug;

/// 部件类型，决定截面元素的参考方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentKind {
    Fuselage,
    Wing,
}

impl ComponentKind {
    pub fn name(&self) -> &'static str {
        match self {
            ComponentKind::Fuselage => "Fuselage",
            ComponentKind::Wing => "Wing",
        }
    }
}

/// 结构部件
pub struct Component {
    link: UidLink,
    kind: ComponentKind,
    settings: EngineSettings,
    name: RefCell<String>,
    parent_uid: RefCell<String>,
    transformation: RefCell<Transformation>,
    sections: RefCell<Vec<Rc<Section>>>,
    positionings: RefCell<Vec<Rc<Positioning>>>,
    segments: RefCell<Vec<Rc<Segment>>>,
    positioning_tree: CacheCell<PositioningTree, Component, ModelError>,
    global_transformation: CacheCell<Matrix4, Component, ModelError>,
}

impl Component {
    pub(crate) fn new(
        registry: &Rc<UidRegistry>,
        uid: &str,
        name: &str,
        kind: ComponentKind,
        settings: EngineSettings,
    ) -> Result<Rc<Self>> {
        let component = Rc::new_cyclic(|this: &Weak<Component>| Component {
            link: UidLink::new(registry, this.clone(), uid, true),
            kind,
            settings,
            name: RefCell::new(name.to_string()),
            parent_uid: RefCell::new(String::new()),
            transformation: RefCell::new(Transformation::identity()),
            sections: RefCell::new(Vec::new()),
            positionings: RefCell::new(Vec::new()),
            segments: RefCell::new(Vec::new()),
            positioning_tree: CacheCell::fallible(|c: &Component| {
                let nodes = c.positionings.borrow().iter().map(|p| p.node()).collect();
                PositioningTree::build(nodes)
            }),
            global_transformation: CacheCell::fallible(Component::compute_global_transformation),
        });
        component.link.register()?;
        Ok(component)
    }

    pub fn uid(&self) -> String {
        self.link.uid()
    }

    pub fn set_uid(&self, uid: &str) -> Result<()> {
        self.link.set_uid(uid)
    }

    pub fn kind(&self) -> ComponentKind {
        self.kind
    }

    pub fn settings(&self) -> EngineSettings {
        self.settings
    }

    pub fn name(&self) -> String {
        self.name.borrow().clone()
    }

    pub fn set_name(&self, name: &str) {
        *self.name.borrow_mut() = name.to_string();
    }

    // === 部件变换 ===

    pub fn transformation(&self) -> Transformation {
        *self.transformation.borrow()
    }

    pub fn set_transformation(&self, transformation: Transformation) -> Result<()> {
        if !transformation.is_finite() {
            return Err(ModelError::InvalidArgument(
                "component transformation must be finite".to_string(),
            ));
        }
        *self.transformation.borrow_mut() = transformation;
        self.invalidate(None);
        Ok(())
    }

    pub fn parent_uid(&self) -> String {
        self.parent_uid.borrow().clone()
    }

    /// 设置父部件；父部件必须存在且不能形成环
    pub fn set_parent_uid(&self, parent_uid: &str) -> Result<()> {
        if !parent_uid.is_empty() {
            let own = self.uid();
            let registry = self.link.registry();
            let mut chain = vec![own.clone()];
            let mut current = parent_uid.to_string();
            while !current.is_empty() {
                if current == own {
                    chain.push(current);
                    return Err(ModelError::CyclicComponentParent(chain));
                }
                if chain.contains(&current) {
                    // 已有的链自身成环，由查询时报告
                    break;
                }
                chain.push(current.clone());
                current = registry.resolve_as::<Component>(&current)?.parent_uid();
            }
        }

        let old = self.parent_uid.replace(parent_uid.to_string());
        self.link.replace_reference(&old, parent_uid);
        self.invalidate(None);
        Ok(())
    }

    /// 数据导入时直接写入父部件引用，合法性在 `Configuration::validate` 中检查
    pub(crate) fn assign_parent_uid(&self, parent_uid: &str) {
        let old = self.parent_uid.replace(parent_uid.to_string());
        self.link.replace_reference(&old, parent_uid);
        self.invalidate(None);
    }

    /// 部件到世界坐标的变换（含父部件链）
    pub fn global_transformation(&self) -> Result<Matrix4> {
        Ok(*self.global_transformation.try_value(self)?)
    }

    fn compute_global_transformation(&self) -> Result<Matrix4> {
        let own = self.transformation.borrow().matrix();
        let parent_uid = self.parent_uid();
        if parent_uid.is_empty() {
            return Ok(own);
        }
        self.check_parent_chain()?;
        let parent = self.link.registry().resolve_as::<Component>(&parent_uid)?;
        debug!("Component {} composes parent transformation of {}", self.uid(), parent_uid);
        Ok(parent.global_transformation()? * own)
    }

    /// 沿父链检查环
    fn check_parent_chain(&self) -> Result<()> {
        let registry = self.link.registry();
        let mut chain = vec![self.uid()];
        let mut current = self.parent_uid();
        while !current.is_empty() {
            if let Some(start) = chain.iter().position(|uid| *uid == current) {
                let mut cycle = chain[start..].to_vec();
                cycle.push(current);
                return Err(ModelError::CyclicComponentParent(cycle));
            }
            chain.push(current.clone());
            current = registry.resolve_as::<Component>(&current)?.parent_uid();
        }
        Ok(())
    }

    // === 定位 ===

    pub fn positioning_tree(&self) -> Result<Rc<PositioningTree>> {
        self.positioning_tree.try_value(self)
    }

    /// 截面的定位变换
    pub fn positioning_transformation(&self, section_uid: &str) -> Result<Matrix4> {
        Ok(self.positioning_tree()?.transformation(section_uid))
    }

    /// 以截面为目标的定位规则的内、外端点
    pub fn positioning_points(&self, section_uid: &str) -> Result<Option<(Point3, Point3)>> {
        Ok(self
            .positioning_tree()?
            .node_for_section(section_uid)
            .map(|node| (node.inner_point, node.outer_point)))
    }

    pub fn positionings(&self) -> Vec<Rc<Positioning>> {
        self.positionings.borrow().clone()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_positioning(
        self: &Rc<Self>,
        uid: &str,
        name: &str,
        from_section_uid: &str,
        to_section_uid: &str,
        length: f64,
        sweep_angle: f64,
        dihedral_angle: f64,
    ) -> Result<Rc<Positioning>> {
        let positioning = Positioning::new(
            self,
            uid,
            name,
            from_section_uid,
            to_section_uid,
            length,
            sweep_angle,
            dihedral_angle,
        )?;
        self.positionings.borrow_mut().push(Rc::clone(&positioning));
        self.invalidate(None);
        Ok(positioning)
    }

    pub fn remove_positioning(&self, index: usize) -> Result<()> {
        let positioning = {
            let positionings = self.positionings.borrow();
            positionings.get(index).cloned().ok_or_else(|| {
                ModelError::InvalidArgument(format!(
                    "positioning index {} out of range ({} positionings)",
                    index,
                    positionings.len()
                ))
            })?
        };
        positioning.invalidate(None);
        positioning.detach();
        self.positionings.borrow_mut().remove(index);
        Ok(())
    }

    // === 截面 ===

    pub fn sections(&self) -> Vec<Rc<Section>> {
        self.sections.borrow().clone()
    }

    pub fn section(&self, uid: &str) -> Result<Rc<Section>> {
        self.sections
            .borrow()
            .iter()
            .find(|s| *s.link().uid_ref() == uid)
            .cloned()
            .ok_or_else(|| ModelError::UidNotFound(uid.to_string()))
    }

    pub fn add_section(
        self: &Rc<Self>,
        uid: &str,
        name: &str,
        transformation: Transformation,
    ) -> Result<Rc<Section>> {
        let section = Section::new(self, uid, name, transformation)?;
        self.sections.borrow_mut().push(Rc::clone(&section));
        Ok(section)
    }

    /// 移除截面：先使其失效（级联到元素、翼段和定位规则），再注销
    pub fn remove_section(&self, uid: &str) -> Result<()> {
        let section = self.section(uid)?;
        section.invalidate(None);
        section.detach();
        self.sections.borrow_mut().retain(|s| !Rc::ptr_eq(s, &section));
        Ok(())
    }

    // === 翼段 ===

    pub fn segments(&self) -> Vec<Rc<Segment>> {
        self.segments.borrow().clone()
    }

    pub fn segment(&self, uid: &str) -> Result<Rc<Segment>> {
        self.segments
            .borrow()
            .iter()
            .find(|s| *s.link().uid_ref() == uid)
            .cloned()
            .ok_or_else(|| ModelError::UidNotFound(uid.to_string()))
    }

    pub fn add_segment(
        self: &Rc<Self>,
        uid: &str,
        name: &str,
        from_element_uid: &str,
        to_element_uid: &str,
    ) -> Result<Rc<Segment>> {
        let segment = Segment::new(self, uid, name, from_element_uid, to_element_uid)?;
        self.segments.borrow_mut().push(Rc::clone(&segment));
        Ok(segment)
    }

    pub fn remove_segment(&self, uid: &str) -> Result<()> {
        let segment = self.segment(uid)?;
        segment.invalidate(None);
        segment.detach();
        self.segments.borrow_mut().retain(|s| !Rc::ptr_eq(s, &segment));
        Ok(())
    }

    pub(crate) fn detach(&self) {
        for section in self.sections.borrow().iter() {
            section.detach();
        }
        for positioning in self.positionings.borrow().iter() {
            positioning.detach();
        }
        for segment in self.segments.borrow().iter() {
            segment.detach();
        }
        self.link.detach();
    }
}

impl UidObject for Component {
    fn link(&self) -> &UidLink {
        &self.link
    }

    fn type_name(&self) -> &'static str {
        "Component"
    }

    fn invalidate_impl(&self, _source: Option<&str>) {
        self.positioning_tree.clear();
        self.global_transformation.clear();

        let uid = self.uid();
        let sections = self.sections();
        for section in sections {
            section.invalidate(Some(&uid));
        }
    }

    fn notify_uid_change(&self, old: &str, new: &str) {
        if *self.parent_uid.borrow() == old {
            *self.parent_uid.borrow_mut() = new.to_string();
        }
    }

    fn as_any_rc(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}

impl std::fmt::Debug for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Component")
            .field("uid", &self.uid())
            .field("kind", &self.kind)
            .field("parent", &self.parent_uid())
            .field("sections", &self.sections.borrow().len())
            .field("positionings", &self.positionings.borrow().len())
            .field("segments", &self.segments.borrow().len())
            .finish()
    }
}
