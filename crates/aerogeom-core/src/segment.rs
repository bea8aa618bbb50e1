//! 翼段/机身段
//!
//! 段连接两个截面元素，缓存两端的全局轮廓和中心，供放样等下游消费者读取。

use crate::cache::CacheCell;
use crate::component::Component;
use crate::element::{ReferenceFrame, SectionElement};
use crate::error::{ModelError, Result};
use crate::math::Point3;
use crate::uid::{attached, UidLink, UidObject};
use std::any::Any;
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use tracing::debug;

/// 段两端的几何
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentGeometry {
    pub inner_wire: Vec<Point3>,
    pub outer_wire: Vec<Point3>,
    pub inner_center: Point3,
    pub outer_center: Point3,
}

pub struct Segment {
    link: UidLink,
    component: Weak<Component>,
    name: RefCell<String>,
    from_element_uid: RefCell<String>,
    to_element_uid: RefCell<String>,
    geometry: CacheCell<SegmentGeometry, Segment, ModelError>,
}

impl Segment {
    pub(crate) fn new(
        component: &Rc<Component>,
        uid: &str,
        name: &str,
        from_element_uid: &str,
        to_element_uid: &str,
    ) -> Result<Rc<Self>> {
        let segment = Rc::new_cyclic(|this: &Weak<Segment>| Segment {
            link: UidLink::new(component.link().registry(), this.clone(), uid, true),
            component: Rc::downgrade(component),
            name: RefCell::new(name.to_string()),
            from_element_uid: RefCell::new(from_element_uid.to_string()),
            to_element_uid: RefCell::new(to_element_uid.to_string()),
            geometry: CacheCell::fallible(Segment::build_geometry),
        });
        segment.link.register()?;
        segment.link.add_reference(from_element_uid);
        segment.link.add_reference(to_element_uid);
        Ok(segment)
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

    pub fn from_element_uid(&self) -> String {
        self.from_element_uid.borrow().clone()
    }

    pub fn to_element_uid(&self) -> String {
        self.to_element_uid.borrow().clone()
    }

    pub fn set_from_element_uid(&self, uid: &str) {
        let old = self.from_element_uid.replace(uid.to_string());
        self.link.replace_reference(&old, uid);
        self.invalidate(None);
    }

    pub fn set_to_element_uid(&self, uid: &str) {
        let old = self.to_element_uid.replace(uid.to_string());
        self.link.replace_reference(&old, uid);
        self.invalidate(None);
    }

    pub fn inner_element(&self) -> Result<Rc<SectionElement>> {
        let uid = self.from_element_uid();
        self.link.registry().resolve_as::<SectionElement>(&uid)
    }

    pub fn outer_element(&self) -> Result<Rc<SectionElement>> {
        let uid = self.to_element_uid();
        self.link.registry().resolve_as::<SectionElement>(&uid)
    }

    fn build_geometry(&self) -> Result<SegmentGeometry> {
        let inner = self.inner_element()?;
        let outer = self.outer_element()?;
        debug!("Rebuilding geometry of segment {}", self.uid());
        Ok(SegmentGeometry {
            inner_wire: inner.wire(ReferenceFrame::Global)?,
            outer_wire: outer.wire(ReferenceFrame::Global)?,
            inner_center: inner.center(ReferenceFrame::Global)?,
            outer_center: outer.center(ReferenceFrame::Global)?,
        })
    }

    pub fn geometry(&self) -> Result<Rc<SegmentGeometry>> {
        self.geometry.try_value(self)
    }

    pub fn inner_wire(&self) -> Result<Vec<Point3>> {
        Ok(self.geometry()?.inner_wire.clone())
    }

    pub fn outer_wire(&self) -> Result<Vec<Point3>> {
        Ok(self.geometry()?.outer_wire.clone())
    }

    /// 两端中心之间的距离
    pub fn length(&self) -> Result<f64> {
        let geometry = self.geometry()?;
        Ok((geometry.outer_center - geometry.inner_center).norm())
    }

    /// 两端中心连线上参数 `eta ∈ [0, 1]` 处的点
    pub fn center_at(&self, eta: f64) -> Result<Point3> {
        if !(0.0..=1.0).contains(&eta) {
            return Err(ModelError::InvalidArgument(format!(
                "eta must lie in [0, 1], got {}",
                eta
            )));
        }
        let geometry = self.geometry()?;
        Ok(geometry.inner_center + (geometry.outer_center - geometry.inner_center) * eta)
    }

    pub(crate) fn detach(&self) {
        self.link.detach();
    }
}

impl UidObject for Segment {
    fn link(&self) -> &UidLink {
        &self.link
    }

    fn type_name(&self) -> &'static str {
        "Segment"
    }

    fn invalidate_impl(&self, _source: Option<&str>) {
        self.geometry.clear();
    }

    fn notify_uid_change(&self, old: &str, new: &str) {
        for field in [&self.from_element_uid, &self.to_element_uid] {
            if *field.borrow() == old {
                *field.borrow_mut() = new.to_string();
            }
        }
    }

    fn as_any_rc(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("uid", &self.uid())
            .field("from", &self.from_element_uid())
            .field("to", &self.to_element_uid())
            .finish()
    }
}
