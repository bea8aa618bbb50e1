//! 数学基础类型与辅助函数
//!
//! 基于 nalgebra 的三维点、向量和齐次矩阵。

pub use nalgebra::Unit;

pub type Point3 = nalgebra::Point3<f64>;
pub type Vector3 = nalgebra::Vector3<f64>;
pub type Matrix3 = nalgebra::Matrix3<f64>;
pub type Matrix4 = nalgebra::Matrix4<f64>;
pub type Rotation3 = nalgebra::Rotation3<f64>;

/// 默认比较容差
pub const EPSILON: f64 = 1e-8;

/// 两个标量是否在容差内相等
pub fn is_near(a: f64, b: f64, tolerance: f64) -> bool {
    (a - b).abs() <= tolerance
}

/// 两个点是否在容差内重合
pub fn points_near(a: &Point3, b: &Point3, tolerance: f64) -> bool {
    (a - b).norm() <= tolerance
}

/// 两个矩阵是否逐元素在容差内相等
pub fn matrices_near(a: &Matrix4, b: &Matrix4, tolerance: f64) -> bool {
    a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() <= tolerance)
}

/// 平移矩阵
pub fn translation(v: &Vector3) -> Matrix4 {
    Matrix4::new_translation(v)
}

/// 由3x3线性部分和平移组成齐次矩阵
pub fn affine(linear: &Matrix3, t: &Vector3) -> Matrix4 {
    let mut m = Matrix4::identity();
    m.fixed_view_mut::<3, 3>(0, 0).copy_from(linear);
    m.fixed_view_mut::<3, 1>(0, 3).copy_from(t);
    m
}

/// 齐次矩阵的线性部分
pub fn linear_part(m: &Matrix4) -> Matrix3 {
    m.fixed_view::<3, 3>(0, 0).into_owned()
}

/// 齐次矩阵的平移部分
pub fn translation_part(m: &Matrix4) -> Vector3 {
    m.fixed_view::<3, 1>(0, 3).into_owned()
}

/// 是否为有限值构成的仿射矩阵（最后一行为 0 0 0 1）
pub fn is_affine(m: &Matrix4, tolerance: f64) -> bool {
    m.iter().all(|v| v.is_finite())
        && is_near(m[(3, 0)], 0.0, tolerance)
        && is_near(m[(3, 1)], 0.0, tolerance)
        && is_near(m[(3, 2)], 0.0, tolerance)
        && is_near(m[(3, 3)], 1.0, tolerance)
}

/// 绕经过 `pivot` 的轴旋转（弧度）
pub fn rotation_about(pivot: &Point3, axis: &Unit<Vector3>, angle: f64) -> Matrix4 {
    rotated_about(pivot, &Rotation3::from_axis_angle(axis, angle))
}

/// 以 `pivot` 为不动点施加旋转
pub fn rotated_about(pivot: &Point3, rotation: &Rotation3) -> Matrix4 {
    translation(&pivot.coords) * rotation.to_homogeneous() * translation(&-pivot.coords)
}

/// 以 `pivot` 为中心沿单位方向 `direction` 缩放 `factor` 倍
pub fn directional_scaling_about(pivot: &Point3, direction: &Unit<Vector3>, factor: f64) -> Matrix4 {
    let d = direction.into_inner();
    let linear = Matrix3::identity() + (factor - 1.0) * d * d.transpose();
    translation(&pivot.coords) * affine(&linear, &Vector3::zeros()) * translation(&-pivot.coords)
}

/// 以 `pivot` 为中心均匀缩放
pub fn uniform_scaling_about(pivot: &Point3, factor: f64) -> Matrix4 {
    translation(&pivot.coords) * Matrix4::new_scaling(factor) * translation(&-pivot.coords)
}

/// 用变换矩阵变换一组点
pub fn transform_points(m: &Matrix4, points: &[Point3]) -> Vec<Point3> {
    points.iter().map(|p| m.transform_point(p)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_about_pivot() {
        let pivot = Point3::new(1.0, 0.0, 0.0);
        let m = rotation_about(&pivot, &Vector3::z_axis(), std::f64::consts::FRAC_PI_2);
        assert!(points_near(&m.transform_point(&pivot), &pivot, 1e-12));
        assert!(points_near(
            &m.transform_point(&Point3::new(2.0, 0.0, 0.0)),
            &Point3::new(1.0, 1.0, 0.0),
            1e-12
        ));
    }

    #[test]
    fn test_directional_scaling() {
        let pivot = Point3::new(1.0, 1.0, 1.0);
        let m = directional_scaling_about(&pivot, &Vector3::x_axis(), 3.0);
        let p = m.transform_point(&Point3::new(2.0, 2.0, 2.0));
        assert!(points_near(&p, &Point3::new(4.0, 2.0, 2.0), 1e-12));
        assert!(is_affine(&m, EPSILON));
    }

    #[test]
    fn test_affine_parts() {
        let linear = Matrix3::new(1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 10.0);
        let t = Vector3::new(-1.0, 0.5, 2.0);
        let m = affine(&linear, &t);
        assert_eq!(linear_part(&m), linear);
        assert_eq!(translation_part(&m), t);

        let mut projective = m;
        projective[(3, 0)] = 0.5;
        assert!(!is_affine(&projective, EPSILON));
    }
}
