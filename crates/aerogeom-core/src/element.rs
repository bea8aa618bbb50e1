//! 截面元素与放置求解
//!
//! 元素的最终放置由三级变换按固定顺序复合：
//!
//! ```text
//! Total = Positioning(section) · Section · Element
//! ```
//!
//! 在全局坐标系中还要左乘部件的全局变换。正向查询（原点、中心、法向、
//! 宽高、面积等）都由 `Total` 和轮廓计算得到；反向设置只修改截面和元素变换，
//! 定位变换和部件变换保持不变。
//!
//! # 拆分策略
//!
//! 大多数设置器保留截面变换，把新的复合变换 `C'` 写入元素：`E' = S⁻¹ · C'`。
//! `set_total_transformation` 以及截面变换奇异时，对 `C'` 做 QR 分解，
//! 平移和旋转归截面，缩放和剪切归元素。

use crate::cache::CacheCell;
use crate::component::{Component, ComponentKind};
use crate::error::{ModelError, Result};
use crate::math::{
    directional_scaling_about, is_affine, linear_part, rotated_about, rotation_about,
    transform_points, translation, uniform_scaling_about, Matrix4, Point3, Rotation3, Unit,
    Vector3,
};
use crate::profile::{perimeter, vector_area, Profile};
use crate::section::{check_transformation, Section};
use crate::settings::EngineSettings;
use crate::transform::{AffineDecomposition, Transformation};
use crate::uid::{attached, UidLink, UidObject};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use tracing::{debug, warn};

/// 查询与设置所用的参考坐标系
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ReferenceFrame {
    /// 世界坐标系（含部件变换及父部件链）
    #[default]
    Global,
    /// 所属部件的坐标系
    Component,
}

/// 缓存的放置数据
#[derive(Debug, Clone)]
struct Placement {
    kind: ComponentKind,
    settings: EngineSettings,
    global: Matrix4,
    positioning: Matrix4,
    section: Matrix4,
    element: Matrix4,
    points: Vec<Point3>,
    centroid: Point3,
}

impl Placement {
    fn prefix(&self, frame: ReferenceFrame) -> Matrix4 {
        match frame {
            ReferenceFrame::Global => self.global * self.positioning,
            ReferenceFrame::Component => self.positioning,
        }
    }

    /// 截面与元素的复合 `S · E`
    fn combined(&self) -> Matrix4 {
        self.section * self.element
    }

    fn geometry(&self, total: Matrix4) -> PlacedProfile<'_> {
        PlacedProfile {
            kind: self.kind,
            settings: self.settings,
            total,
            points: &self.points,
            centroid: self.centroid,
        }
    }
}

/// 放置后的轮廓，所有正向查询的计算核心
struct PlacedProfile<'a> {
    kind: ComponentKind,
    settings: EngineSettings,
    total: Matrix4,
    points: &'a [Point3],
    centroid: Point3,
}

impl PlacedProfile<'_> {
    fn origin(&self) -> Point3 {
        self.total.transform_point(&Point3::origin())
    }

    fn center(&self) -> Point3 {
        self.total.transform_point(&self.centroid)
    }

    /// 局部 X 与 Z 轴像的叉积方向；退化时为零向量
    fn normal(&self) -> Vector3 {
        let x = self.total.transform_vector(&Vector3::x());
        let z = self.total.transform_vector(&Vector3::z());
        let n = x.cross(&z);
        let norm = n.norm();
        if norm < self.settings.degenerate_scale_epsilon {
            Vector3::zeros()
        } else {
            n / norm
        }
    }

    fn has_normal(&self) -> bool {
        self.normal() != Vector3::zeros()
    }

    /// 高度方向（归一化的参考方向）
    fn height_axis(&self) -> Vector3 {
        reference_direction(self.kind, &self.normal(), self.settings.tolerance).normalize()
    }

    /// 宽度方向 `h × n`；法向退化时为零向量
    fn width_axis(&self) -> Vector3 {
        let w = self.height_axis().cross(&self.normal());
        let norm = w.norm();
        if norm < self.settings.tolerance {
            Vector3::zeros()
        } else {
            w / norm
        }
    }

    fn rotation_around_normal(&self) -> f64 {
        let n = self.normal();
        if n == Vector3::zeros() {
            return 0.0;
        }
        let reference = self.height_axis();
        let z = self.total.transform_vector(&Vector3::z());
        n.dot(&reference.cross(&z)).atan2(reference.dot(&z)).to_degrees()
    }

    fn wire(&self) -> Vec<Point3> {
        transform_points(&self.total, self.points)
    }

    fn extent(&self, axis: &Vector3) -> f64 {
        if *axis == Vector3::zeros() {
            return 0.0;
        }
        let (min, max) = self
            .wire()
            .iter()
            .map(|p| p.coords.dot(axis))
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
        if min.is_finite() {
            max - min
        } else {
            0.0
        }
    }

    fn width(&self) -> f64 {
        self.extent(&self.width_axis())
    }

    fn height(&self) -> f64 {
        self.extent(&self.height_axis())
    }

    fn area(&self) -> f64 {
        vector_area(&self.wire()).norm()
    }

    fn circumference(&self) -> f64 {
        perimeter(&self.wire())
    }
}

/// 部件类型对应的参考方向（位于法平面内，未归一化）
///
/// 机身：法平面与直线 `(x, 0, 1)` 的交点方向，退化时取 `(1, 0, z)`，
/// 法向沿 Y 时取 `(0, 0, 1)`。机翼：直线 `(0, y, 1)`，退化时取 `(0, 1, z)`，
/// 法向沿 X 时取 `(0, 0, 1)`。
pub fn reference_direction(kind: ComponentKind, normal: &Vector3, tolerance: f64) -> Vector3 {
    let (nx, ny, nz) = (normal.x, normal.y, normal.z);
    match kind {
        ComponentKind::Fuselage => {
            if nx.abs() < tolerance && nz.abs() < tolerance {
                Vector3::z()
            } else if nx.abs() < tolerance {
                Vector3::x()
            } else {
                Vector3::new(-nz / nx, 0.0, 1.0)
            }
        }
        ComponentKind::Wing => {
            if ny.abs() < tolerance && nz.abs() < tolerance {
                Vector3::z()
            } else if ny.abs() < tolerance {
                Vector3::y()
            } else {
                Vector3::new(0.0, -nz / ny, 1.0)
            }
        }
    }
}

/// 截面元素
pub struct SectionElement {
    link: UidLink,
    section: Weak<Section>,
    name: RefCell<String>,
    profile_uid: RefCell<String>,
    transformation: RefCell<Transformation>,
    placement: CacheCell<Placement, SectionElement, ModelError>,
}

impl SectionElement {
    pub(crate) fn new(
        section: &Rc<Section>,
        uid: &str,
        name: &str,
        profile_uid: &str,
        transformation: Transformation,
    ) -> Result<Rc<Self>> {
        check_transformation(&transformation)?;
        let element = Rc::new_cyclic(|this: &Weak<SectionElement>| SectionElement {
            link: UidLink::new(section.link().registry(), this.clone(), uid, true),
            section: Rc::downgrade(section),
            name: RefCell::new(name.to_string()),
            profile_uid: RefCell::new(profile_uid.to_string()),
            transformation: RefCell::new(transformation),
            placement: CacheCell::fallible(SectionElement::build_placement),
        });
        element.link.register()?;
        element.link.add_reference(profile_uid);
        Ok(element)
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

    pub fn section(&self) -> Result<Rc<Section>> {
        attached(&self.section, &self.link)
    }

    pub fn component(&self) -> Result<Rc<Component>> {
        self.section()?.component()
    }

    pub fn profile_uid(&self) -> String {
        self.profile_uid.borrow().clone()
    }

    pub fn profile(&self) -> Result<Rc<Profile>> {
        let uid = self.profile_uid();
        self.link.registry().resolve_as::<Profile>(&uid)
    }

    /// 更换轮廓
    pub fn set_profile_uid(&self, profile_uid: &str) {
        let old = self.profile_uid.replace(profile_uid.to_string());
        self.link.replace_reference(&old, profile_uid);
        self.invalidate(None);
    }

    /// 元素自身的变换字段
    pub fn transformation(&self) -> Transformation {
        *self.transformation.borrow()
    }

    pub fn set_transformation(&self, transformation: Transformation) -> Result<()> {
        check_transformation(&transformation)?;
        *self.transformation.borrow_mut() = transformation;
        self.invalidate(None);
        Ok(())
    }

    /// 所属截面的变换字段
    pub fn section_transformation(&self) -> Result<Transformation> {
        Ok(self.section()?.transformation())
    }

    fn build_placement(&self) -> Result<Placement> {
        let section = self.section()?;
        let component = section.component()?;
        let profile = self.profile()?;
        let shape = profile.shape();
        debug!("Rebuilding placement of element {}", self.uid());
        Ok(Placement {
            kind: component.kind(),
            settings: component.settings(),
            global: component.global_transformation()?,
            positioning: component.positioning_transformation(&section.uid())?,
            section: section.matrix(),
            element: self.transformation.borrow().matrix(),
            points: profile.points(),
            centroid: shape.centroid,
        })
    }

    fn placement(&self) -> Result<Rc<Placement>> {
        self.placement.try_value(self)
    }

    #[cfg(test)]
    pub(crate) fn placement_build_count(&self) -> usize {
        self.placement.build_count()
    }

    // === 正向查询 ===

    /// 复合变换 `Positioning · Section · Element`（全局坐标系再左乘部件变换）
    pub fn total_transformation(&self, frame: ReferenceFrame) -> Result<Matrix4> {
        let placement = self.placement()?;
        Ok(placement.prefix(frame) * placement.combined())
    }

    pub fn origin(&self, frame: ReferenceFrame) -> Result<Point3> {
        self.query(frame, |g| g.origin())
    }

    /// 轮廓质心的像
    pub fn center(&self, frame: ReferenceFrame) -> Result<Point3> {
        self.query(frame, |g| g.center())
    }

    /// 单位法向；变换退化时为零向量
    pub fn normal(&self, frame: ReferenceFrame) -> Result<Vector3> {
        self.query(frame, |g| g.normal())
    }

    /// 绕法向从参考方向到局部 Z 轴像的有向角（角度制）
    pub fn rotation_around_normal(&self, frame: ReferenceFrame) -> Result<f64> {
        self.query(frame, |g| g.rotation_around_normal())
    }

    pub fn width(&self, frame: ReferenceFrame) -> Result<f64> {
        self.query(frame, |g| g.width())
    }

    pub fn height(&self, frame: ReferenceFrame) -> Result<f64> {
        self.query(frame, |g| g.height())
    }

    pub fn area(&self, frame: ReferenceFrame) -> Result<f64> {
        self.query(frame, |g| g.area())
    }

    pub fn circumference(&self, frame: ReferenceFrame) -> Result<f64> {
        self.query(frame, |g| g.circumference())
    }

    /// 变换后的轮廓点
    pub fn wire(&self, frame: ReferenceFrame) -> Result<Vec<Point3>> {
        self.query(frame, |g| g.wire())
    }

    fn query<T>(&self, frame: ReferenceFrame, f: impl FnOnce(&PlacedProfile<'_>) -> T) -> Result<T> {
        let placement = self.placement()?;
        let total = placement.prefix(frame) * placement.combined();
        Ok(f(&placement.geometry(total)))
    }

    // === 反向设置 ===

    /// 平移元素，使原点落在 `origin`
    pub fn set_origin(&self, origin: &Point3, frame: ReferenceFrame) -> Result<()> {
        check_point(origin)?;
        let current = self.origin(frame)?;
        self.translate(origin - current, frame)
    }

    /// 平移元素，使轮廓质心落在 `center`
    pub fn set_center(&self, center: &Point3, frame: ReferenceFrame) -> Result<()> {
        check_point(center)?;
        let current = self.center(frame)?;
        self.translate(center - current, frame)
    }

    /// 以中心为不动点沿宽度方向缩放
    pub fn set_width(&self, width: f64, frame: ReferenceFrame) -> Result<()> {
        check_extent(width, "width")?;
        self.directional_scale(frame, width, "width", |g| (g.width(), g.width_axis()))
    }

    /// 以中心为不动点沿高度方向缩放
    pub fn set_height(&self, height: f64, frame: ReferenceFrame) -> Result<()> {
        check_extent(height, "height")?;
        self.directional_scale(frame, height, "height", |g| (g.height(), g.height_axis()))
    }

    /// 以中心为不动点均匀缩放到指定面积
    pub fn set_area(&self, area: f64, frame: ReferenceFrame) -> Result<()> {
        check_extent(area, "area")?;
        let context = self.edit_context(frame)?;
        let combined = self.recovered_combined(&context.placement, true)?;
        let geometry = context.placement.geometry(context.prefix * combined);

        let current = geometry.area();
        if current <= context.placement.settings.tolerance {
            return Err(zero_extent("area"));
        }
        let scaling = uniform_scaling_about(&geometry.center(), (area / current).sqrt());
        self.commit(&context, scaling * geometry.total)
    }

    /// 以中心为不动点均匀缩放
    pub fn scale_uniformly(&self, factor: f64, frame: ReferenceFrame) -> Result<()> {
        if !factor.is_finite() {
            return Err(ModelError::InvalidArgument(
                "scale factor must be finite".to_string(),
            ));
        }
        let context = self.edit_context(frame)?;
        let geometry = context.placement.geometry(context.prefix * context.placement.combined());
        let scaling = uniform_scaling_about(&geometry.center(), factor);
        self.commit(&context, scaling * geometry.total)
    }

    /// 绕原点旋转使法向变为 `normal`，并保持绕法向的转角不变
    pub fn set_normal(&self, normal: &Vector3, frame: ReferenceFrame) -> Result<()> {
        if !normal.iter().all(|c| c.is_finite()) || normal.norm() < f64::EPSILON {
            return Err(ModelError::InvalidArgument(
                "normal must be a finite non-zero vector".to_string(),
            ));
        }
        let target = normal.normalize();
        let context = self.edit_context(frame)?;
        let total = self.oriented_total(&context)?;
        let geometry = context.placement.geometry(total);

        let origin = geometry.origin();
        let current = geometry.normal();
        let angle = geometry.rotation_around_normal();

        let rotation = Rotation3::rotation_between(&current, &target).unwrap_or_else(|| {
            // 反向：绕高度方向转半圈
            Rotation3::from_axis_angle(
                &Unit::new_normalize(geometry.height_axis()),
                std::f64::consts::PI,
            )
        });
        let turned = rotated_about(&origin, &rotation) * total;

        let restored = context.placement.geometry(turned).rotation_around_normal();
        let axis = Unit::new_normalize(target);
        let total = rotation_about(&origin, &axis, (angle - restored).to_radians()) * turned;
        self.commit(&context, total)
    }

    /// 绕法向（过原点）旋转到指定转角
    pub fn set_rotation_around_normal(&self, angle: f64, frame: ReferenceFrame) -> Result<()> {
        if !angle.is_finite() {
            return Err(ModelError::InvalidArgument(
                "rotation angle must be finite".to_string(),
            ));
        }
        let context = self.edit_context(frame)?;
        let total = self.oriented_total(&context)?;
        let geometry = context.placement.geometry(total);

        let axis = Unit::new_normalize(geometry.normal());
        let delta = angle - geometry.rotation_around_normal();
        let rotation = rotation_about(&geometry.origin(), &axis, delta.to_radians());
        self.commit(&context, rotation * total)
    }

    /// 设置复合变换，定位和部件变换保持不变
    ///
    /// `Positioning⁻¹ · M` 按 QR 分解拆分：平移和旋转写入截面，缩放和剪切写入元素。
    /// 同一截面中的其他元素会随截面一起移动。
    pub fn set_total_transformation(&self, matrix: &Matrix4, frame: ReferenceFrame) -> Result<()> {
        let context = self.edit_context(frame)?;
        if !is_affine(matrix, context.placement.settings.tolerance) {
            return Err(ModelError::InvalidArgument(
                "total transformation must be a finite affine matrix".to_string(),
            ));
        }
        self.commit_split(context.prefix_inverse * matrix)
    }

    // === 设置器内部实现 ===

    fn edit_context(&self, frame: ReferenceFrame) -> Result<EditContext> {
        let placement = self.placement()?;
        let prefix = placement.prefix(frame);
        let prefix_inverse = prefix.try_inverse().ok_or_else(|| {
            ModelError::DegenerateTransform(format!(
                "the positioning or component transformation of element '{}' is singular",
                self.uid()
            ))
        })?;
        Ok(EditContext {
            placement,
            prefix,
            prefix_inverse,
        })
    }

    /// 复合变换 `S · E`；存在退化缩放时按 1 处理并保持轮廓中心不动
    fn recovered_combined(&self, placement: &Placement, recover: bool) -> Result<Matrix4> {
        let combined = placement.combined();
        if !recover {
            return Ok(combined);
        }
        let epsilon = placement.settings.degenerate_scale_epsilon;
        let decomposition = AffineDecomposition::of(&combined)?;
        if !decomposition.has_degenerate_scaling(epsilon) {
            return Ok(combined);
        }

        warn!(
            "Element {} has near-zero scaling {:?}, replacing it with 1",
            self.uid(),
            decomposition.scaling
        );
        let recovered = decomposition
            .with_degenerate_scaling_replaced(epsilon)
            .recompose();
        let shift = combined.transform_point(&placement.centroid)
            - recovered.transform_point(&placement.centroid);
        Ok(translation(&shift) * recovered)
    }

    /// 法向可用的复合变换；法向退化时先做缩放恢复
    fn oriented_total(&self, context: &EditContext) -> Result<Matrix4> {
        let total = context.prefix * context.placement.combined();
        if context.placement.geometry(total).has_normal() {
            return Ok(total);
        }
        let total = context.prefix * self.recovered_combined(&context.placement, true)?;
        if context.placement.geometry(total).has_normal() {
            Ok(total)
        } else {
            Err(ModelError::InvalidArgument(format!(
                "the normal of element '{}' is undefined",
                self.uid()
            )))
        }
    }

    fn directional_scale(
        &self,
        frame: ReferenceFrame,
        target: f64,
        what: &str,
        measure: impl Fn(&PlacedProfile<'_>) -> (f64, Vector3),
    ) -> Result<()> {
        let context = self.edit_context(frame)?;
        let combined = self.recovered_combined(&context.placement, true)?;
        let geometry = context.placement.geometry(context.prefix * combined);

        let (current, axis) = measure(&geometry);
        if current <= context.placement.settings.tolerance || axis == Vector3::zeros() {
            return Err(zero_extent(what));
        }
        let scaling = directional_scaling_about(
            &geometry.center(),
            &Unit::new_normalize(axis),
            target / current,
        );
        self.commit(&context, scaling * geometry.total)
    }

    /// 仅平移：元素的旋转、缩放和剪切字段保持不变
    fn translate(&self, delta: Vector3, frame: ReferenceFrame) -> Result<()> {
        let context = self.edit_context(frame)?;
        let local = linear_part(&context.prefix_inverse) * delta;
        match linear_part(&context.placement.section).try_inverse() {
            Some(section_inverse) => {
                let mut transformation = self.transformation();
                transformation.translation += section_inverse * local;
                check_transformation(&transformation)?;
                *self.transformation.borrow_mut() = transformation;
                self.invalidate(None);
                Ok(())
            }
            None => self.commit_split(translation(&local) * context.placement.combined()),
        }
    }

    /// 写回新的复合变换 `prefix · C'`：保留截面，`E' = S⁻¹ · C'`
    fn commit(&self, context: &EditContext, total: Matrix4) -> Result<()> {
        let combined = context.prefix_inverse * total;
        match context.placement.section.try_inverse() {
            Some(section_inverse) => {
                let transformation = Transformation::from_matrix(&(section_inverse * combined))?;
                check_transformation(&transformation)?;
                *self.transformation.borrow_mut() = transformation;
                self.invalidate(None);
                Ok(())
            }
            None => self.commit_split(combined),
        }
    }

    /// 把 `C'` 拆成截面（平移、旋转）和元素（缩放、剪切）
    fn commit_split(&self, combined: Matrix4) -> Result<()> {
        let section = self.section()?;
        let decomposition = AffineDecomposition::of(&combined)?;
        let rigid = Transformation::from_matrix(&decomposition.rigid())?;
        let deformation = Transformation {
            translation: Vector3::zeros(),
            rotation: Vector3::zeros(),
            scaling: decomposition.scaling,
            shear: decomposition.shear,
        };
        let section_transformation = Transformation {
            scaling: Vector3::new(1.0, 1.0, 1.0),
            shear: Vector3::zeros(),
            ..rigid
        };
        check_transformation(&section_transformation)?;
        check_transformation(&deformation)?;

        section.store_transformation(section_transformation);
        *self.transformation.borrow_mut() = deformation;
        section.invalidate(None);
        Ok(())
    }

    pub(crate) fn detach(&self) {
        self.link.detach();
    }
}

struct EditContext {
    placement: Rc<Placement>,
    prefix: Matrix4,
    prefix_inverse: Matrix4,
}

impl UidObject for SectionElement {
    fn link(&self) -> &UidLink {
        &self.link
    }

    fn type_name(&self) -> &'static str {
        "SectionElement"
    }

    fn invalidate_impl(&self, _source: Option<&str>) {
        self.placement.clear();
    }

    fn notify_uid_change(&self, old: &str, new: &str) {
        if *self.profile_uid.borrow() == old {
            *self.profile_uid.borrow_mut() = new.to_string();
        }
    }

    fn as_any_rc(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}

impl std::fmt::Debug for SectionElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SectionElement")
            .field("uid", &self.uid())
            .field("profile", &self.profile_uid())
            .field("transformation", &self.transformation())
            .finish()
    }
}

fn check_point(point: &Point3) -> Result<()> {
    if point.coords.iter().all(|c| c.is_finite()) {
        Ok(())
    } else {
        Err(ModelError::InvalidArgument("point must be finite".to_string()))
    }
}

fn check_extent(value: f64, what: &str) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ModelError::InvalidArgument(format!(
            "{} must be finite and non-negative, got {}",
            what, value
        )))
    }
}

fn zero_extent(what: &str) -> ModelError {
    ModelError::InvalidArgument(format!(
        "cannot set the {} of an element whose profile has zero {}",
        what, what
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::Configuration;
    use crate::math::{matrices_near, points_near};
    use crate::test_support::{simple_wing, straight_component, WingFixture};
    use ReferenceFrame::{Component as Local, Global};

    const TOL: f64 = 1e-9;

    fn vectors_near(a: &Vector3, b: &Vector3, tolerance: f64) -> bool {
        (a - b).norm() <= tolerance
    }

    fn root_element(fixture: &WingFixture) -> Rc<SectionElement> {
        fixture
            .wing
            .section("W1_Sec1")
            .unwrap()
            .element("W1_Sec1_Elem1")
            .unwrap()
    }

    fn tip_element(fixture: &WingFixture) -> Rc<SectionElement> {
        fixture
            .wing
            .section("W1_Sec2")
            .unwrap()
            .element("W1_Sec2_Elem1")
            .unwrap()
    }

    fn twisted(element: &SectionElement) {
        element
            .set_transformation(
                Transformation::identity()
                    .with_translation(Vector3::new(0.3, -0.2, 0.1))
                    .with_rotation(Vector3::new(10.0, 20.0, 30.0))
                    .with_scaling(Vector3::new(1.5, 1.0, 0.8)),
            )
            .unwrap();
    }

    #[test]
    fn test_forward_queries() {
        let fixture = simple_wing();
        let element = root_element(&fixture);

        assert!(points_near(&element.origin(Global).unwrap(), &Point3::origin(), TOL));
        assert!(points_near(&element.center(Global).unwrap(), &Point3::new(1.0, 0.0, 0.0), TOL));
        assert!(vectors_near(&element.normal(Global).unwrap(), &-Vector3::y(), TOL));
        assert!((element.rotation_around_normal(Global).unwrap()).abs() < TOL);
        assert!((element.width(Global).unwrap() - 2.0).abs() < TOL);
        assert!((element.height(Global).unwrap() - 0.5).abs() < TOL);
        assert!((element.area(Global).unwrap() - 1.0).abs() < TOL);
        assert!((element.circumference(Global).unwrap() - 5.0).abs() < TOL);

        let tip = tip_element(&fixture);
        assert!(points_near(&tip.origin(Local).unwrap(), &Point3::new(0.0, 5.0, 0.0), TOL));
    }

    #[test]
    fn test_component_frame_excludes_component_transform() {
        let fixture = simple_wing();
        fixture
            .wing
            .set_transformation(Transformation::from_translation(Vector3::new(0.0, 0.0, 2.0)))
            .unwrap();
        let tip = tip_element(&fixture);
        assert!(points_near(&tip.origin(Global).unwrap(), &Point3::new(0.0, 5.0, 2.0), TOL));
        assert!(points_near(&tip.origin(Local).unwrap(), &Point3::new(0.0, 5.0, 0.0), TOL));
    }

    #[test]
    fn test_total_transformation_round_trip() {
        let fixture = simple_wing();
        fixture
            .wing
            .set_transformation(
                Transformation::identity()
                    .with_translation(Vector3::new(3.0, 0.0, -1.0))
                    .with_rotation(Vector3::new(0.0, 0.0, 15.0))
                    .with_scaling(Vector3::new(2.0, 2.0, 2.0)),
            )
            .unwrap();
        let element = tip_element(&fixture);

        let mut m = Transformation::identity()
            .with_translation(Vector3::new(1.0, 7.0, 0.5))
            .with_rotation(Vector3::new(-5.0, 12.0, 40.0))
            .with_scaling(Vector3::new(0.5, 1.2, 3.0))
            .with_shear(Vector3::new(0.1, 0.0, -0.2))
            .matrix();
        m[(2, 0)] += 0.05;

        for frame in [Global, Local] {
            element.set_total_transformation(&m, frame).unwrap();
            assert!(matrices_near(&element.total_transformation(frame).unwrap(), &m, TOL));
        }

        // 定位和部件变换不变
        let (_, outer) = fixture.wing.positioning_points("W1_Sec2").unwrap().unwrap();
        assert!(points_near(&outer, &Point3::new(0.0, 5.0, 0.0), TOL));
        assert_eq!(
            fixture.wing.transformation().translation,
            Vector3::new(3.0, 0.0, -1.0)
        );

        // 截面只含平移和旋转，元素只含缩放和剪切
        let section = element.section_transformation().unwrap();
        assert_eq!(section.scaling, Vector3::new(1.0, 1.0, 1.0));
        assert_eq!(section.shear, Vector3::zeros());
        let own = element.transformation();
        assert_eq!(own.translation, Vector3::zeros());
        assert_eq!(own.rotation, Vector3::zeros());
    }

    #[test]
    fn test_non_affine_total_rejected() {
        let fixture = simple_wing();
        let element = root_element(&fixture);
        let mut m = Matrix4::identity();
        m[(3, 1)] = 0.5;
        assert!(matches!(
            element.set_total_transformation(&m, Global),
            Err(ModelError::InvalidArgument(_))
        ));
        assert_eq!(element.transformation(), Transformation::identity());
    }

    #[test]
    fn test_set_origin_changes_translation_only() {
        let fixture = simple_wing();
        let element = tip_element(&fixture);
        twisted(&element);
        let before = element.transformation();
        let section_before = element.section_transformation().unwrap();

        let target = Point3::new(-1.0, 4.0, 2.5);
        element.set_origin(&target, Global).unwrap();

        assert!(points_near(&element.origin(Global).unwrap(), &target, TOL));
        let after = element.transformation();
        assert_eq!(after.rotation, before.rotation);
        assert_eq!(after.scaling, before.scaling);
        assert_eq!(after.shear, before.shear);
        assert_eq!(element.section_transformation().unwrap(), section_before);
    }

    #[test]
    fn test_set_center() {
        let fixture = simple_wing();
        let element = root_element(&fixture);
        twisted(&element);
        let normal = element.normal(Local).unwrap();

        let target = Point3::new(0.5, 0.5, 0.5);
        element.set_center(&target, Local).unwrap();
        assert!(points_near(&element.center(Local).unwrap(), &target, TOL));
        assert!(vectors_near(&element.normal(Local).unwrap(), &normal, TOL));
    }

    #[test]
    fn test_set_width_keeps_center_normal_and_height() {
        let fixture = simple_wing();
        let element = tip_element(&fixture);
        twisted(&element);

        let center = element.center(Global).unwrap();
        let normal = element.normal(Global).unwrap();
        let height = element.height(Global).unwrap();

        element.set_width(3.0, Global).unwrap();

        assert!((element.width(Global).unwrap() - 3.0).abs() < TOL);
        assert!(points_near(&element.center(Global).unwrap(), &center, TOL));
        assert!(vectors_near(&element.normal(Global).unwrap(), &normal, TOL));
        assert!((element.height(Global).unwrap() - height).abs() < TOL);
    }

    #[test]
    fn test_set_height_keeps_center_and_width() {
        let fixture = simple_wing();
        let element = root_element(&fixture);
        twisted(&element);

        let center = element.center(Local).unwrap();
        let width = element.width(Local).unwrap();

        element.set_height(0.1, Local).unwrap();

        assert!((element.height(Local).unwrap() - 0.1).abs() < TOL);
        assert!((element.width(Local).unwrap() - width).abs() < TOL);
        assert!(points_near(&element.center(Local).unwrap(), &center, TOL));
    }

    #[test]
    fn test_set_area() {
        let fixture = simple_wing();
        let element = root_element(&fixture);
        twisted(&element);
        let center = element.center(Global).unwrap();

        element.set_area(4.0, Global).unwrap();
        assert!((element.area(Global).unwrap() - 4.0).abs() < TOL);
        assert!(points_near(&element.center(Global).unwrap(), &center, TOL));
    }

    #[test]
    fn test_scale_uniformly() {
        let fixture = simple_wing();
        let element = root_element(&fixture);
        element.scale_uniformly(2.0, Global).unwrap();
        assert!((element.width(Global).unwrap() - 4.0).abs() < TOL);
        assert!((element.area(Global).unwrap() - 4.0).abs() < TOL);
        assert!(points_near(&element.center(Global).unwrap(), &Point3::new(1.0, 0.0, 0.0), TOL));
    }

    #[test]
    fn test_set_normal_preserves_origin_and_rotation() {
        let fixture = simple_wing();
        let element = tip_element(&fixture);
        twisted(&element);

        let origin = element.origin(Global).unwrap();
        let rotation = element.rotation_around_normal(Global).unwrap();
        let target = Vector3::new(0.2, -1.0, 0.3).normalize();

        element.set_normal(&target, Global).unwrap();

        assert!(vectors_near(&element.normal(Global).unwrap(), &target, TOL));
        assert!(points_near(&element.origin(Global).unwrap(), &origin, TOL));
        assert!((element.rotation_around_normal(Global).unwrap() - rotation).abs() < 1e-7);
    }

    #[test]
    fn test_set_normal_antiparallel() {
        let fixture = simple_wing();
        let element = root_element(&fixture);
        element.set_normal(&Vector3::y(), Global).unwrap();
        assert!(vectors_near(&element.normal(Global).unwrap(), &Vector3::y(), TOL));
        assert!(points_near(&element.origin(Global).unwrap(), &Point3::origin(), TOL));
    }

    #[test]
    fn test_set_rotation_around_normal() {
        let fixture = simple_wing();
        let element = root_element(&fixture);
        let normal = element.normal(Global).unwrap();

        element.set_rotation_around_normal(25.0, Global).unwrap();
        assert!((element.rotation_around_normal(Global).unwrap() - 25.0).abs() < 1e-7);
        assert!(vectors_near(&element.normal(Global).unwrap(), &normal, TOL));
        assert!(points_near(&element.origin(Global).unwrap(), &Point3::origin(), TOL));
    }

    #[test]
    fn test_zero_width_round_trip() {
        let fixture = simple_wing();
        let element = root_element(&fixture);
        let normal = element.normal(Global).unwrap();

        element.set_width(0.0, Global).unwrap();
        assert!(element.width(Global).unwrap().abs() < TOL);
        assert_eq!(element.normal(Global).unwrap(), Vector3::zeros());

        // 退化缩放按 1 恢复，朝向与中心保持不变
        element.set_width(2.0, Global).unwrap();
        assert!((element.width(Global).unwrap() - 2.0).abs() < TOL);
        assert!((element.height(Global).unwrap() - 0.5).abs() < TOL);
        assert!(vectors_near(&element.normal(Global).unwrap(), &normal, TOL));
        assert!(points_near(&element.center(Global).unwrap(), &Point3::new(1.0, 0.0, 0.0), TOL));
    }

    #[test]
    fn test_degenerate_normal_recovered_for_rotation() {
        let fixture = simple_wing();
        let element = root_element(&fixture);
        element.set_height(0.0, Global).unwrap();
        assert_eq!(element.normal(Global).unwrap(), Vector3::zeros());

        element.set_rotation_around_normal(10.0, Global).unwrap();
        assert!((element.rotation_around_normal(Global).unwrap() - 10.0).abs() < 1e-7);
    }

    #[test]
    fn test_invalid_arguments_leave_state_untouched() {
        let fixture = simple_wing();
        let element = root_element(&fixture);

        assert!(matches!(element.set_width(-1.0, Global), Err(ModelError::InvalidArgument(_))));
        assert!(matches!(element.set_height(f64::NAN, Global), Err(ModelError::InvalidArgument(_))));
        assert!(matches!(element.set_area(f64::INFINITY, Global), Err(ModelError::InvalidArgument(_))));
        assert!(matches!(
            element.set_normal(&Vector3::zeros(), Global),
            Err(ModelError::InvalidArgument(_))
        ));
        assert!(matches!(
            element.set_origin(&Point3::new(f64::NAN, 0.0, 0.0), Global),
            Err(ModelError::InvalidArgument(_))
        ));
        assert_eq!(element.transformation(), Transformation::identity());
    }

    #[test]
    fn test_zero_extent_profile() {
        let fixture = simple_wing();
        fixture
            .profile
            .set_points(vec![Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0)])
            .unwrap();
        let element = root_element(&fixture);
        assert!(matches!(element.set_height(1.0, Global), Err(ModelError::InvalidArgument(_))));
        assert!(matches!(element.set_area(1.0, Global), Err(ModelError::InvalidArgument(_))));
    }

    #[test]
    fn test_singular_component_transform() {
        let fixture = simple_wing();
        fixture
            .wing
            .set_transformation(Transformation::identity().with_scaling(Vector3::new(1.0, 0.0, 1.0)))
            .unwrap();
        let element = root_element(&fixture);
        assert!(matches!(
            element.set_origin(&Point3::new(1.0, 1.0, 1.0), Global),
            Err(ModelError::DegenerateTransform(_))
        ));
        // 部件坐标系不受影响
        element.set_origin(&Point3::new(1.0, 1.0, 1.0), Local).unwrap();
        assert!(points_near(&element.origin(Local).unwrap(), &Point3::new(1.0, 1.0, 1.0), TOL));
    }

    #[test]
    fn test_singular_section_uses_split() {
        let fixture = simple_wing();
        let section = fixture.wing.section("W1_Sec1").unwrap();
        section
            .set_transformation(Transformation::identity().with_scaling(Vector3::new(1.0, 1.0, 0.0)))
            .unwrap();
        let element = root_element(&fixture);

        let target = Point3::new(0.0, 3.0, 0.0);
        element.set_origin(&target, Local).unwrap();
        assert!(points_near(&element.origin(Local).unwrap(), &target, TOL));
        assert_eq!(section.transformation().scaling, Vector3::new(1.0, 1.0, 1.0));
        assert!(element.transformation().scaling.z.abs() < TOL);
    }

    #[test]
    fn test_placement_memoized() {
        let fixture = simple_wing();
        let element = root_element(&fixture);

        let _ = element.origin(Global).unwrap();
        let _ = element.width(Global).unwrap();
        let _ = element.normal(Local).unwrap();
        assert_eq!(element.placement_build_count(), 1);

        element.set_origin(&Point3::new(0.0, 0.0, 1.0), Global).unwrap();
        assert_eq!(element.placement_build_count(), 1);
        let _ = element.origin(Global).unwrap();
        assert_eq!(element.placement_build_count(), 2);

        // 同截面外的元素不受影响
        let tip = tip_element(&fixture);
        let _ = tip.origin(Global).unwrap();
        element.set_origin(&Point3::origin(), Global).unwrap();
        let _ = tip.origin(Global).unwrap();
        assert_eq!(tip.placement_build_count(), 1);
    }

    #[test]
    fn test_profile_edit_and_rename_propagate() {
        let fixture = simple_wing();
        let element = root_element(&fixture);
        assert!((element.area(Global).unwrap() - 1.0).abs() < TOL);

        let doubled: Vec<Point3> = fixture
            .profile
            .points()
            .iter()
            .map(|p| Point3::from(p.coords * 2.0))
            .collect();
        fixture.profile.set_points(doubled).unwrap();
        assert!((element.area(Global).unwrap() - 4.0).abs() < TOL);

        fixture.profile.set_uid("P_renamed").unwrap();
        assert_eq!(element.profile_uid(), "P_renamed");
        assert!(element.profile().is_ok());
    }

    #[test]
    fn test_positioning_edit_moves_elements() {
        let fixture = simple_wing();
        let tip = tip_element(&fixture);
        fixture.wing.positionings()[1].set_sweep_angle(90.0).unwrap();
        assert!(points_near(&tip.origin(Global).unwrap(), &Point3::new(5.0, 0.0, 0.0), TOL));
    }

    const KINDS: [ComponentKind; 2] = [ComponentKind::Fuselage, ComponentKind::Wing];

    /// 两角度差折算到 (-180, 180] 后比较
    fn angles_near(a: f64, b: f64, tolerance: f64) -> bool {
        let d = (a - b).rem_euclid(360.0);
        d.min(360.0 - d) <= tolerance
    }

    /// 部件旋转且非均匀缩放、截面旋转并缩放、元素带剪切的梢截面元素
    fn deformed_tip(kind: ComponentKind) -> (Configuration, Rc<SectionElement>) {
        let (config, component, _) = straight_component(kind, "C1");
        component
            .set_transformation(
                Transformation::identity()
                    .with_translation(Vector3::new(1.0, -2.0, 0.5))
                    .with_rotation(Vector3::new(5.0, -10.0, 25.0))
                    .with_scaling(Vector3::new(2.0, 1.5, 0.7)),
            )
            .unwrap();
        let section = component.section("C1_Sec2").unwrap();
        section
            .set_transformation(
                Transformation::identity()
                    .with_translation(Vector3::new(0.2, 0.1, -0.3))
                    .with_rotation(Vector3::new(0.0, 15.0, -20.0))
                    .with_scaling(Vector3::new(1.2, 1.2, 0.9)),
            )
            .unwrap();
        let element = section.element("C1_Sec2_Elem1").unwrap();
        element
            .set_transformation(
                Transformation::identity()
                    .with_rotation(Vector3::new(10.0, 20.0, 30.0))
                    .with_scaling(Vector3::new(1.5, 1.0, 0.8))
                    .with_shear(Vector3::new(0.2, 0.0, -0.1)),
            )
            .unwrap();
        (config, element)
    }

    fn each_case(check: impl Fn(&SectionElement, ReferenceFrame)) {
        for kind in KINDS {
            for frame in [Global, Local] {
                let (_config, element) = deformed_tip(kind);
                check(&element, frame);
            }
        }
    }

    #[test]
    fn test_set_width_every_kind_and_frame() {
        each_case(|element, frame| {
            let center = element.center(frame).unwrap();
            let normal = element.normal(frame).unwrap();
            let height = element.height(frame).unwrap();

            element.set_width(3.0, frame).unwrap();

            assert!((element.width(frame).unwrap() - 3.0).abs() < TOL);
            assert!(points_near(&element.center(frame).unwrap(), &center, TOL));
            assert!(vectors_near(&element.normal(frame).unwrap(), &normal, TOL));
            assert!((element.height(frame).unwrap() - height).abs() < TOL);
        });
    }

    #[test]
    fn test_set_origin_every_kind_and_frame() {
        each_case(|element, frame| {
            let before = element.transformation();
            let section_before = element.section_transformation().unwrap();
            let target = Point3::new(-1.0, 4.0, 2.5);

            element.set_origin(&target, frame).unwrap();

            assert!(points_near(&element.origin(frame).unwrap(), &target, TOL));
            let after = element.transformation();
            assert_eq!(after.rotation, before.rotation);
            assert_eq!(after.scaling, before.scaling);
            assert_eq!(after.shear, before.shear);
            assert_eq!(element.section_transformation().unwrap(), section_before);
        });
    }

    #[test]
    fn test_set_area_every_kind_and_frame() {
        each_case(|element, frame| {
            let center = element.center(frame).unwrap();
            let normal = element.normal(frame).unwrap();

            element.set_area(4.0, frame).unwrap();

            assert!((element.area(frame).unwrap() - 4.0).abs() < TOL);
            assert!(points_near(&element.center(frame).unwrap(), &center, TOL));
            assert!(vectors_near(&element.normal(frame).unwrap(), &normal, TOL));
        });
    }

    #[test]
    fn test_set_normal_every_kind_and_frame() {
        each_case(|element, frame| {
            let origin = element.origin(frame).unwrap();
            let rotation = element.rotation_around_normal(frame).unwrap();
            let target = (element.normal(frame).unwrap() + Vector3::new(0.3, 0.2, -0.4)).normalize();

            element.set_normal(&target, frame).unwrap();

            assert!(vectors_near(&element.normal(frame).unwrap(), &target, TOL));
            assert!(points_near(&element.origin(frame).unwrap(), &origin, TOL));
            assert!(angles_near(element.rotation_around_normal(frame).unwrap(), rotation, 1e-7));
        });
    }

    #[test]
    fn test_set_rotation_around_normal_every_kind_and_frame() {
        each_case(|element, frame| {
            let origin = element.origin(frame).unwrap();
            let normal = element.normal(frame).unwrap();

            element.set_rotation_around_normal(-35.0, frame).unwrap();

            assert!(angles_near(element.rotation_around_normal(frame).unwrap(), -35.0, 1e-7));
            assert!(vectors_near(&element.normal(frame).unwrap(), &normal, TOL));
            assert!(points_near(&element.origin(frame).unwrap(), &origin, TOL));
        });
    }

    #[test]
    fn test_set_total_transformation_every_kind_and_frame() {
        let mut m = Transformation::identity()
            .with_translation(Vector3::new(1.0, 7.0, 0.5))
            .with_rotation(Vector3::new(-5.0, 12.0, 40.0))
            .with_scaling(Vector3::new(0.5, 1.2, 3.0))
            .with_shear(Vector3::new(0.1, 0.0, -0.2))
            .matrix();
        m[(2, 0)] += 0.05;

        each_case(|element, frame| {
            element.set_total_transformation(&m, frame).unwrap();
            assert!(matrices_near(&element.total_transformation(frame).unwrap(), &m, TOL));
        });
    }

    #[test]
    fn test_zero_extent_round_trips_every_kind_and_frame() {
        type Setter = fn(&SectionElement, f64, ReferenceFrame) -> Result<()>;
        type Getter = fn(&SectionElement, ReferenceFrame) -> Result<f64>;
        let cases: [(Setter, Getter, f64); 3] = [
            (SectionElement::set_width, SectionElement::width, 3.0),
            (SectionElement::set_height, SectionElement::height, 0.4),
            (SectionElement::set_area, SectionElement::area, 2.0),
        ];

        for (set, get, target) in cases {
            each_case(|element, frame| {
                set(element, 0.0, frame).unwrap();
                assert!(element.area(frame).unwrap() < TOL);
                assert_eq!(element.normal(frame).unwrap(), Vector3::zeros());

                set(element, target, frame).unwrap();
                assert!((get(element, frame).unwrap() - target).abs() < TOL);
                assert!((element.normal(frame).unwrap().norm() - 1.0).abs() < TOL);
            });
        }
    }

    #[test]
    fn test_height_axis_follows_component_kind() {
        // 法向在 XZ 平面内：机身取 (-nz/nx, 0, 1)，机翼取 Y 轴
        let normal = Vector3::new(0.6, 0.0, 0.8);
        let expected = [
            (ComponentKind::Fuselage, Vector3::new(-0.8, 0.0, 0.6)),
            (ComponentKind::Wing, Vector3::y()),
        ];

        for (kind, height_axis) in expected {
            let (_config, component, _) = straight_component(kind, "C1");
            let element = component
                .section("C1_Sec1")
                .unwrap()
                .element("C1_Sec1_Elem1")
                .unwrap();
            assert!((element.height(Global).unwrap() - 0.5).abs() < TOL);

            element.set_normal(&normal, Global).unwrap();
            element.set_rotation_around_normal(0.0, Global).unwrap();

            let z = element
                .total_transformation(Global)
                .unwrap()
                .transform_vector(&Vector3::z());
            assert!(vectors_near(&z, &height_axis, TOL));
            assert!((element.height(Global).unwrap() - 0.5).abs() < TOL);
            assert!((element.width(Global).unwrap() - 2.0).abs() < TOL);
        }
    }

    #[derive(Clone, Default)]
    struct LogBuffer(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_log_messages_are_ascii() {
        let buffer = LogBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let fixture = simple_wing();
            let element = root_element(&fixture);
            element.set_width(0.0, Global).unwrap();
            element.set_width(2.0, Global).unwrap();
            fixture.profile.set_uid("P_renamed").unwrap();
            let _ = fixture.wing.positioning_tree().unwrap();
        });

        let log = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        assert!(log.contains("Rebuilding placement of element W1_Sec1_Elem1"));
        assert!(log.contains("near-zero scaling"));
        assert!(log.contains("Renaming UID P_rect -> P_renamed"));
        assert!(log.is_ascii(), "non-ASCII log output:\n{}", log);
    }

    #[test]
    fn test_reference_direction() {
        let tol = 1e-8;
        assert_eq!(
            reference_direction(ComponentKind::Fuselage, &Vector3::y(), tol),
            Vector3::z()
        );
        assert_eq!(
            reference_direction(ComponentKind::Fuselage, &Vector3::new(0.0, 0.6, 0.8), tol),
            Vector3::x()
        );
        assert_eq!(
            reference_direction(ComponentKind::Fuselage, &Vector3::new(0.5, 0.0, 0.5), tol),
            Vector3::new(-1.0, 0.0, 1.0)
        );
        assert_eq!(
            reference_direction(ComponentKind::Wing, &Vector3::x(), tol),
            Vector3::z()
        );
        assert_eq!(
            reference_direction(ComponentKind::Wing, &Vector3::new(0.6, 0.0, 0.8), tol),
            Vector3::y()
        );
        assert_eq!(
            reference_direction(ComponentKind::Wing, &Vector3::new(0.0, 0.5, 0.5), tol),
            Vector3::new(0.0, -1.0, 1.0)
        );
    }
}
