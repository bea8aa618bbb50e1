//! 截面轮廓
//!
//! 轮廓是元素局部坐标系中的闭合折线，通常位于局部 XZ 平面。
//! 质心和面积向量缓存在轮廓上，被所有引用它的截面元素共享。

use crate::cache::CacheCell;
use crate::error::{ModelError, Result};
use crate::math::{Point3, Vector3};
use crate::uid::{UidLink, UidObject, UidRegistry};
use std::any::Any;
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use tracing::debug;

/// 轮廓的派生形状量
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfileShape {
    /// 面积质心；退化轮廓取顶点平均值
    pub centroid: Point3,
    /// 面积向量（模为面积，方向为法向）
    pub vector_area: Vector3,
}

/// 截面轮廓
pub struct Profile {
    link: UidLink,
    name: RefCell<String>,
    points: RefCell<Vec<Point3>>,
    shape: CacheCell<ProfileShape, Profile>,
}

impl Profile {
    pub fn new(
        registry: &Rc<UidRegistry>,
        uid: &str,
        name: &str,
        points: Vec<Point3>,
    ) -> Result<Rc<Self>> {
        check_points(&points)?;
        let profile = Rc::new_cyclic(|this: &Weak<Profile>| Profile {
            link: UidLink::new(registry, this.clone(), uid, true),
            name: RefCell::new(name.to_string()),
            points: RefCell::new(points),
            shape: CacheCell::new(|profile: &Profile| shape_of(&profile.points.borrow())),
        });
        profile.link.register()?;
        Ok(profile)
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

    pub fn points(&self) -> Vec<Point3> {
        self.points.borrow().clone()
    }

    /// 替换轮廓点，引用该轮廓的元素随之失效
    pub fn set_points(&self, points: Vec<Point3>) -> Result<()> {
        check_points(&points)?;
        *self.points.borrow_mut() = points;
        self.invalidate(None);
        Ok(())
    }

    pub fn shape(&self) -> ProfileShape {
        *self.shape.value(self)
    }

    pub fn centroid(&self) -> Point3 {
        self.shape().centroid
    }

    /// 局部坐标系下的面积
    pub fn area(&self) -> f64 {
        self.shape().vector_area.norm()
    }

    pub(crate) fn detach(&self) {
        self.link.detach();
    }
}

impl UidObject for Profile {
    fn link(&self) -> &UidLink {
        &self.link
    }

    fn type_name(&self) -> &'static str {
        "Profile"
    }

    fn invalidate_impl(&self, _source: Option<&str>) {
        self.shape.clear();
    }

    fn as_any_rc(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}

impl std::fmt::Debug for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Profile")
            .field("uid", &self.uid())
            .field("points", &self.points.borrow().len())
            .finish()
    }
}

fn check_points(points: &[Point3]) -> Result<()> {
    if points.is_empty() {
        return Err(ModelError::InvalidArgument(
            "a profile needs at least one point".to_string(),
        ));
    }
    if points.iter().any(|p| !p.coords.iter().all(|c| c.is_finite())) {
        return Err(ModelError::InvalidArgument(
            "profile points must be finite".to_string(),
        ));
    }
    Ok(())
}

/// 闭合多边形的面积向量：`1/2 · Σ pᵢ × pᵢ₊₁`
pub fn vector_area(points: &[Point3]) -> Vector3 {
    let n = points.len();
    if n < 3 {
        return Vector3::zeros();
    }
    let mut sum = Vector3::zeros();
    for i in 0..n {
        let a = points[i].coords;
        let b = points[(i + 1) % n].coords;
        sum += a.cross(&b);
    }
    sum * 0.5
}

/// 闭合折线的周长
pub fn perimeter(points: &[Point3]) -> f64 {
    let n = points.len();
    if n < 2 {
        return 0.0;
    }
    (0..n)
        .map(|i| (points[(i + 1) % n] - points[i]).norm())
        .sum()
}

/// 面积质心：以首点为公共顶点的三角形扇按有向面积加权
pub fn shape_of(points: &[Point3]) -> ProfileShape {
    debug!("Rebuilding profile shape from {} points", points.len());
    let vector_area = vector_area(points);
    let mean = points
        .iter()
        .fold(Vector3::zeros(), |acc, p| acc + p.coords)
        / points.len().max(1) as f64;

    let area = vector_area.norm();
    if area <= f64::EPSILON {
        return ProfileShape {
            centroid: Point3::from(mean),
            vector_area,
        };
    }

    let normal = vector_area / area;
    let p0 = points[0];
    let mut weighted = Vector3::zeros();
    let mut total = 0.0;
    for i in 1..points.len() - 1 {
        let a = points[i] - p0;
        let b = points[i + 1] - p0;
        let weight = 0.5 * a.cross(&b).dot(&normal);
        let center = (p0.coords + points[i].coords + points[i + 1].coords) / 3.0;
        weighted += center * weight;
        total += weight;
    }

    let centroid = if total.abs() > f64::EPSILON {
        Point3::from(weighted / total)
    } else {
        Point3::from(mean)
    };
    ProfileShape {
        centroid,
        vector_area,
    }
}
