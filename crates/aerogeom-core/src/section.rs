//! 截面
//!
//! 截面持有一组截面元素和一份变换，变换被其所有元素共享。

use crate::component::Component;
use crate::element::SectionElement;
use crate::error::{ModelError, Result};
use crate::math::Matrix4;
use crate::transform::Transformation;
use crate::uid::{attached, UidLink, UidObject};
use std::any::Any;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// 部件中的截面
pub struct Section {
    link: UidLink,
    component: Weak<Component>,
    name: RefCell<String>,
    transformation: RefCell<Transformation>,
    elements: RefCell<Vec<Rc<SectionElement>>>,
}

impl Section {
    pub(crate) fn new(
        component: &Rc<Component>,
        uid: &str,
        name: &str,
        transformation: Transformation,
    ) -> Result<Rc<Self>> {
        check_transformation(&transformation)?;
        let section = Rc::new_cyclic(|this: &Weak<Section>| Section {
            link: UidLink::new(component.link().registry(), this.clone(), uid, true),
            component: Rc::downgrade(component),
            name: RefCell::new(name.to_string()),
            transformation: RefCell::new(transformation),
            elements: RefCell::new(Vec::new()),
        });
        section.link.register()?;
        Ok(section)
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

    pub fn transformation(&self) -> Transformation {
        *self.transformation.borrow()
    }

    pub fn matrix(&self) -> Matrix4 {
        self.transformation.borrow().matrix()
    }

    /// 修改截面变换，本截面的所有元素随之失效
    pub fn set_transformation(&self, transformation: Transformation) -> Result<()> {
        check_transformation(&transformation)?;
        *self.transformation.borrow_mut() = transformation;
        self.invalidate(None);
        Ok(())
    }

    /// 写入变换但不触发失效，由调用者负责随后失效
    pub(crate) fn store_transformation(&self, transformation: Transformation) {
        *self.transformation.borrow_mut() = transformation;
    }

    // === 元素 ===

    pub fn elements(&self) -> Vec<Rc<SectionElement>> {
        self.elements.borrow().clone()
    }

    pub fn element(&self, uid: &str) -> Result<Rc<SectionElement>> {
        self.elements
            .borrow()
            .iter()
            .find(|e| *e.link().uid_ref() == uid)
            .cloned()
            .ok_or_else(|| ModelError::UidNotFound(uid.to_string()))
    }

    pub fn add_element(
        self: &Rc<Self>,
        uid: &str,
        name: &str,
        profile_uid: &str,
        transformation: Transformation,
    ) -> Result<Rc<SectionElement>> {
        let element = SectionElement::new(self, uid, name, profile_uid, transformation)?;
        self.elements.borrow_mut().push(Rc::clone(&element));
        Ok(element)
    }

    /// 移除元素：引用它的翼段先失效，然后注销
    pub fn remove_element(&self, uid: &str) -> Result<()> {
        let element = self.element(uid)?;
        element.invalidate(None);
        element.detach();
        self.elements.borrow_mut().retain(|e| !Rc::ptr_eq(e, &element));
        Ok(())
    }

    pub(crate) fn detach(&self) {
        for element in self.elements.borrow().iter() {
            element.detach();
        }
        self.link.detach();
    }
}

impl UidObject for Section {
    fn link(&self) -> &UidLink {
        &self.link
    }

    fn type_name(&self) -> &'static str {
        "Section"
    }

    fn invalidate_impl(&self, _source: Option<&str>) {
        let uid = self.uid();
        for element in self.elements() {
            element.invalidate(Some(&uid));
        }
    }

    fn as_any_rc(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}

impl std::fmt::Debug for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Section")
            .field("uid", &self.uid())
            .field("transformation", &self.transformation())
            .field("elements", &self.elements.borrow().len())
            .finish()
    }
}

pub(crate) fn check_transformation(transformation: &Transformation) -> Result<()> {
    if transformation.is_finite() {
        Ok(())
    } else {
        Err(ModelError::InvalidArgument(
            "transformation fields must be finite".to_string(),
        ))
    }
}
