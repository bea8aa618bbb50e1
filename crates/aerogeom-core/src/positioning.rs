//! 定位规则与定位依赖树
//!
//! 一条定位规则把截面 `to` 放在截面 `from` 的外端点之后，偏移量由长度、
//! 后掠角和上反角给出：
//!
//! ```text
//! outer = inner + Rx(dihedral) · Rz(-sweep) · (0, length, 0)
//! ```
//!
//! 没有 `from` 的规则从原点出发，所有规则组成一个森林。

use crate::component::Component;
use crate::error::{ModelError, Result};
use crate::math::{translation, Matrix4, Point3, Rotation3, Vector3};
use crate::uid::{attached, UidLink, UidObject};
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use tracing::debug;

// === 定位依赖树 ===

/// 定位树中的一个节点
#[derive(Debug, Clone, PartialEq)]
pub struct PositioningNode {
    /// 起始截面（空字符串表示从原点出发）
    pub from_uid: String,
    /// 目标截面
    pub to_uid: String,
    pub length: f64,
    /// 后掠角（角度制）
    pub sweep_angle: f64,
    /// 上反角（角度制）
    pub dihedral_angle: f64,
    pub inner_point: Point3,
    pub outer_point: Point3,
    /// 子节点在节点列表中的下标
    pub children: Vec<usize>,
}

impl PositioningNode {
    pub fn new(
        from_uid: impl Into<String>,
        to_uid: impl Into<String>,
        length: f64,
        sweep_angle: f64,
        dihedral_angle: f64,
    ) -> Self {
        Self {
            from_uid: from_uid.into(),
            to_uid: to_uid.into(),
            length,
            sweep_angle,
            dihedral_angle,
            inner_point: Point3::origin(),
            outer_point: Point3::origin(),
            children: Vec::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.from_uid.is_empty()
    }

    /// 从内端点到外端点的偏移
    pub fn offset(&self) -> Vector3 {
        let dihedral = Rotation3::from_axis_angle(&Vector3::x_axis(), self.dihedral_angle.to_radians());
        let sweep = Rotation3::from_axis_angle(&Vector3::z_axis(), -self.sweep_angle.to_radians());
        dihedral * sweep * Vector3::new(0.0, self.length, 0.0)
    }
}

/// 已解析的定位森林
#[derive(Debug, Clone, Default)]
pub struct PositioningTree {
    nodes: Vec<PositioningNode>,
    roots: Vec<usize>,
    by_target: HashMap<String, usize>,
}

impl PositioningTree {
    /// 建立森林并计算所有端点
    pub fn build(mut nodes: Vec<PositioningNode>) -> Result<Self> {
        let mut by_target = HashMap::with_capacity(nodes.len());
        for (index, node) in nodes.iter_mut().enumerate() {
            node.children.clear();
            if node.to_uid.is_empty() {
                return Err(ModelError::MalformedPositioning(format!(
                    "positioning from '{}' has no target section",
                    node.from_uid
                )));
            }
            if by_target.insert(node.to_uid.clone(), index).is_some() {
                return Err(ModelError::MalformedPositioning(format!(
                    "section '{}' is the target of more than one positioning",
                    node.to_uid
                )));
            }
        }

        let mut parents: Vec<Option<usize>> = Vec::with_capacity(nodes.len());
        for node in &nodes {
            if node.is_root() {
                parents.push(None);
                continue;
            }
            let parent = by_target.get(&node.from_uid).copied().ok_or_else(|| {
                ModelError::UnresolvedPositioningReference {
                    from: node.from_uid.clone(),
                    to: node.to_uid.clone(),
                }
            })?;
            parents.push(Some(parent));
        }

        detect_cycle(&nodes, &parents)?;

        let mut roots = Vec::new();
        for (index, parent) in parents.iter().enumerate() {
            match parent {
                Some(parent) => nodes[*parent].children.push(index),
                None => roots.push(index),
            }
        }

        let mut tree = Self {
            nodes,
            roots,
            by_target,
        };
        tree.resolve();
        Ok(tree)
    }

    /// 重新计算端点：内端点归零后从每个根深度优先传播
    pub fn resolve(&mut self) {
        for node in &mut self.nodes {
            node.inner_point = Point3::origin();
        }

        let mut stack: Vec<usize> = self.roots.iter().rev().copied().collect();
        while let Some(index) = stack.pop() {
            let outer = self.nodes[index].inner_point + self.nodes[index].offset();
            self.nodes[index].outer_point = outer;
            let children = self.nodes[index].children.clone();
            for &child in children.iter().rev() {
                self.nodes[child].inner_point = outer;
                stack.push(child);
            }
        }
        debug!("Resolved positioning forest: {} nodes, {} roots", self.nodes.len(), self.roots.len());
    }

    pub fn nodes(&self) -> &[PositioningNode] {
        &self.nodes
    }

    pub fn roots(&self) -> &[usize] {
        &self.roots
    }

    /// 以 `section_uid` 为目标的节点
    pub fn node_for_section(&self, section_uid: &str) -> Option<&PositioningNode> {
        self.by_target.get(section_uid).map(|&index| &self.nodes[index])
    }

    /// 截面的定位变换：平移到对应节点的外端点，没有节点时为单位矩阵
    pub fn transformation(&self, section_uid: &str) -> Matrix4 {
        match self.node_for_section(section_uid) {
            Some(node) => translation(&node.outer_point.coords),
            None => Matrix4::identity(),
        }
    }
}

/// 沿父指针检测环，报告环上的截面序列
fn detect_cycle(nodes: &[PositioningNode], parents: &[Option<usize>]) -> Result<()> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        OnPath,
        Done,
    }

    let mut marks = vec![Mark::Unvisited; nodes.len()];
    for start in 0..nodes.len() {
        let mut path = Vec::new();
        let mut current = Some(start);
        while let Some(index) = current {
            match marks[index] {
                Mark::Done => break,
                Mark::OnPath => {
                    let begin = path.iter().position(|&i| i == index).unwrap_or(0);
                    // 路径方向为子 -> 父，倒转后为定位方向
                    let cycle: Vec<usize> = path[begin..].iter().rev().copied().collect();
                    let mut uids = vec![nodes[cycle[0]].from_uid.clone()];
                    uids.extend(cycle.iter().map(|&i| nodes[i].to_uid.clone()));
                    return Err(ModelError::CyclicPositioningDefinition(uids));
                }
                Mark::Unvisited => {
                    marks[index] = Mark::OnPath;
                    path.push(index);
                    current = parents[index];
                }
            }
        }
        for index in path {
            marks[index] = Mark::Done;
        }
    }
    Ok(())
}

// === 定位规则对象 ===

/// 部件中的一条定位规则
pub struct Positioning {
    link: UidLink,
    component: Weak<Component>,
    name: RefCell<String>,
    from_section_uid: RefCell<String>,
    to_section_uid: RefCell<String>,
    length: Cell<f64>,
    sweep_angle: Cell<f64>,
    dihedral_angle: Cell<f64>,
}

impl Positioning {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        component: &Rc<Component>,
        uid: &str,
        name: &str,
        from_section_uid: &str,
        to_section_uid: &str,
        length: f64,
        sweep_angle: f64,
        dihedral_angle: f64,
    ) -> Result<Rc<Self>> {
        if to_section_uid.is_empty() {
            return Err(ModelError::MalformedPositioning(format!(
                "positioning '{}' has no target section",
                uid
            )));
        }
        check_finite(&[length, sweep_angle, dihedral_angle])?;

        let registry = component.link().registry();
        let positioning = Rc::new_cyclic(|this: &Weak<Positioning>| Positioning {
            link: UidLink::new(registry, this.clone(), uid, false),
            component: Rc::downgrade(component),
            name: RefCell::new(name.to_string()),
            from_section_uid: RefCell::new(from_section_uid.to_string()),
            to_section_uid: RefCell::new(to_section_uid.to_string()),
            length: Cell::new(length),
            sweep_angle: Cell::new(sweep_angle),
            dihedral_angle: Cell::new(dihedral_angle),
        });
        positioning.link.register()?;
        positioning.link.add_reference(from_section_uid);
        positioning.link.add_reference(to_section_uid);
        Ok(positioning)
    }

    pub fn uid(&self) -> String {
        self.link.uid()
    }

    pub fn set_uid(&self, uid: &str) -> Result<()> {
        self.link.set_uid(uid)
    }

    pub fn name(&self) -> String {
        self.name.borrow().clone()
    }

    pub fn set_name(&self, name: &str) {
        *self.name.borrow_mut() = name.to_string();
    }

    pub fn component(&self) -> Result<Rc<Component>> {
        attached(&self.component, &self.link)
    }

    pub fn from_section_uid(&self) -> String {
        self.from_section_uid.borrow().clone()
    }

    pub fn to_section_uid(&self) -> String {
        self.to_section_uid.borrow().clone()
    }

    pub fn length(&self) -> f64 {
        self.length.get()
    }

    pub fn sweep_angle(&self) -> f64 {
        self.sweep_angle.get()
    }

    pub fn dihedral_angle(&self) -> f64 {
        self.dihedral_angle.get()
    }

    pub fn set_length(&self, length: f64) -> Result<()> {
        check_finite(&[length])?;
        self.length.set(length);
        self.invalidate(None);
        Ok(())
    }

    pub fn set_sweep_angle(&self, angle: f64) -> Result<()> {
        check_finite(&[angle])?;
        self.sweep_angle.set(angle);
        self.invalidate(None);
        Ok(())
    }

    pub fn set_dihedral_angle(&self, angle: f64) -> Result<()> {
        check_finite(&[angle])?;
        self.dihedral_angle.set(angle);
        self.invalidate(None);
        Ok(())
    }

    /// 修改起始截面，空字符串表示从原点出发
    pub fn set_from_section_uid(&self, uid: &str) {
        let old = self.from_section_uid.replace(uid.to_string());
        self.link.replace_reference(&old, uid);
        self.invalidate(None);
    }

    pub fn set_to_section_uid(&self, uid: &str) -> Result<()> {
        if uid.is_empty() {
            return Err(ModelError::MalformedPositioning(format!(
                "positioning '{}' has no target section",
                self.uid()
            )));
        }
        let old = self.to_section_uid.replace(uid.to_string());
        self.link.replace_reference(&old, uid);
        self.invalidate(None);
        Ok(())
    }

    /// 未解析的树节点
    pub fn node(&self) -> PositioningNode {
        PositioningNode::new(
            self.from_section_uid(),
            self.to_section_uid(),
            self.length(),
            self.sweep_angle(),
            self.dihedral_angle(),
        )
    }

    pub(crate) fn detach(&self) {
        self.link.detach();
    }
}

impl UidObject for Positioning {
    fn link(&self) -> &UidLink {
        &self.link
    }

    fn type_name(&self) -> &'static str {
        "Positioning"
    }

    fn invalidate_impl(&self, source: Option<&str>) {
        // 截面自身的变换不影响定位点；只有规则本身改变时才需要重建定位树
        if source.is_none() {
            if let Some(component) = self.component.upgrade() {
                let uid = self.uid();
                component.invalidate(Some(&uid));
            }
        }
    }

    fn notify_uid_change(&self, old: &str, new: &str) {
        for field in [&self.from_section_uid, &self.to_section_uid] {
            if *field.borrow() == old {
                *field.borrow_mut() = new.to_string();
            }
        }
        // 定位树按截面 uid 建立索引
        if let Some(component) = self.component.upgrade() {
            component.invalidate(None);
        }
    }

    fn as_any_rc(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}

impl std::fmt::Debug for Positioning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Positioning")
            .field("uid", &self.uid())
            .field("from", &self.from_section_uid())
            .field("to", &self.to_section_uid())
            .field("length", &self.length())
            .field("sweep", &self.sweep_angle())
            .field("dihedral", &self.dihedral_angle())
            .finish()
    }
}

fn check_finite(values: &[f64]) -> Result<()> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(ModelError::InvalidArgument(
            "positioning parameters must be finite".to_string(),
        ))
    }
}
