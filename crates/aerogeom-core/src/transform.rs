//! 可编辑的仿射变换
//!
//! 每个截面和截面元素各自存储一组变换字段：平移、旋转（角度制，按 X、Y'、Z''
//! 内旋，即矩阵 `Rx·Ry·Rz`）、缩放和剪切。组合矩阵为
//!
//! ```text
//! M = T · Rx·Ry·Rz · S · H,   H = | 1  hxy  hxz |
//!                                 | 0   1   hyz |
//!                                 | 0   0    1  |
//! ```
//!
//! 反向求解时需要把任意仿射矩阵拆回字段。分解采用对线性部分的 QR 分解
//! （Gram-Schmidt，对角线非负，Q 为真旋转），因此对可逆矩阵是无损的，
//! 对秩亏矩阵也能得到确定的结果。

use crate::error::{ModelError, Result};
use crate::math::{affine, linear_part, translation_part, Matrix3, Matrix4, Rotation3, Vector3};
use serde::{Deserialize, Serialize};

/// 判定列向量线性相关的相对阈值
const RANK_EPSILON: f64 = 1e-12;

/// 仿射检查容差
const AFFINE_TOLERANCE: f64 = 1e-9;

/// 变换字段
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transformation {
    /// 平移
    pub translation: Vector3,

    /// 旋转（角度制，X → Y' → Z''）
    pub rotation: Vector3,

    /// 缩放
    pub scaling: Vector3,

    /// 剪切 (xy, xz, yz)
    #[serde(default)]
    pub shear: Vector3,
}

impl Default for Transformation {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transformation {
    /// 单位变换
    pub fn identity() -> Self {
        Self {
            translation: Vector3::zeros(),
            rotation: Vector3::zeros(),
            scaling: Vector3::new(1.0, 1.0, 1.0),
            shear: Vector3::zeros(),
        }
    }

    pub fn from_translation(translation: Vector3) -> Self {
        Self {
            translation,
            ..Self::identity()
        }
    }

    pub fn with_translation(mut self, translation: Vector3) -> Self {
        self.translation = translation;
        self
    }

    pub fn with_rotation(mut self, rotation: Vector3) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_scaling(mut self, scaling: Vector3) -> Self {
        self.scaling = scaling;
        self
    }

    pub fn with_shear(mut self, shear: Vector3) -> Self {
        self.shear = shear;
        self
    }

    /// 字段是否全部为有限值
    pub fn is_finite(&self) -> bool {
        [self.translation, self.rotation, self.scaling, self.shear]
            .iter()
            .all(|v| v.iter().all(|c| c.is_finite()))
    }

    /// 组合后的齐次矩阵
    pub fn matrix(&self) -> Matrix4 {
        let rotation = rotation_from_euler_degrees(&self.rotation);
        let deformation = Matrix3::new(
            self.scaling.x,
            self.scaling.x * self.shear.x,
            self.scaling.x * self.shear.y,
            0.0,
            self.scaling.y,
            self.scaling.y * self.shear.z,
            0.0,
            0.0,
            self.scaling.z,
        );
        affine(&(rotation * deformation), &self.translation)
    }

    /// 从仿射矩阵求字段
    pub fn from_matrix(m: &Matrix4) -> Result<Self> {
        Ok(AffineDecomposition::of(m)?.into_transformation())
    }
}

/// 仿射矩阵的分解结果 `T · R · S · H`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineDecomposition {
    pub translation: Vector3,
    /// 真旋转矩阵（行列式为 +1）
    pub rotation: Matrix3,
    pub scaling: Vector3,
    /// 剪切 (xy, xz, yz)
    pub shear: Vector3,
}

impl AffineDecomposition {
    /// 分解仿射矩阵；非仿射或含非有限值时返回 `InvalidArgument`
    pub fn of(m: &Matrix4) -> Result<Self> {
        if !crate::math::is_affine(m, AFFINE_TOLERANCE) {
            return Err(ModelError::InvalidArgument(
                "matrix is not a finite affine transformation".to_string(),
            ));
        }

        let (rotation, upper) = orthogonal_triangular(&linear_part(m));
        let scaling = Vector3::new(upper[(0, 0)], upper[(1, 1)], upper[(2, 2)]);
        let ratio = |row: usize, col: usize| {
            if upper[(row, row)].abs() > RANK_EPSILON {
                upper[(row, col)] / upper[(row, row)]
            } else {
                0.0
            }
        };
        let shear = Vector3::new(ratio(0, 1), ratio(0, 2), ratio(1, 2));

        Ok(Self {
            translation: translation_part(m),
            rotation,
            scaling,
            shear,
        })
    }

    /// 是否存在接近零的缩放分量
    pub fn has_degenerate_scaling(&self, epsilon: f64) -> bool {
        self.scaling.iter().any(|s| s.abs() < epsilon)
    }

    /// 把接近零的缩放分量替换为 1（同一行的剪切清零）
    pub fn with_degenerate_scaling_replaced(mut self, epsilon: f64) -> Self {
        for i in 0..3 {
            if self.scaling[i].abs() < epsilon {
                self.scaling[i] = 1.0;
                match i {
                    0 => {
                        self.shear.x = 0.0;
                        self.shear.y = 0.0;
                    }
                    1 => self.shear.z = 0.0,
                    _ => {}
                }
            }
        }
        self
    }

    /// 刚体部分 `T · R`
    pub fn rigid(&self) -> Matrix4 {
        affine(&self.rotation, &self.translation)
    }

    /// 形变部分 `S · H`
    pub fn deformation(&self) -> Matrix4 {
        affine(&self.deformation_linear(), &Vector3::zeros())
    }

    /// 重新组合为矩阵
    pub fn recompose(&self) -> Matrix4 {
        affine(&(self.rotation * self.deformation_linear()), &self.translation)
    }

    /// 转换为可存储的变换字段
    pub fn into_transformation(self) -> Transformation {
        Transformation {
            translation: self.translation,
            rotation: euler_degrees_from_rotation(&self.rotation),
            scaling: self.scaling,
            shear: self.shear,
        }
    }

    fn deformation_linear(&self) -> Matrix3 {
        let s = self.scaling;
        let h = self.shear;
        Matrix3::new(s.x, s.x * h.x, s.x * h.y, 0.0, s.y, s.y * h.z, 0.0, 0.0, s.z)
    }
}

/// `Rx(a)·Ry(b)·Rz(c)`，角度制
pub fn rotation_from_euler_degrees(angles: &Vector3) -> Matrix3 {
    let rx = Rotation3::from_axis_angle(&Vector3::x_axis(), angles.x.to_radians());
    let ry = Rotation3::from_axis_angle(&Vector3::y_axis(), angles.y.to_radians());
    let rz = Rotation3::from_axis_angle(&Vector3::z_axis(), angles.z.to_radians());
    (rx * ry * rz).into_inner()
}

/// `rotation_from_euler_degrees` 的逆运算
///
/// 万向锁（`r02 = ±1`）时令 Z 角为 0。
pub fn euler_degrees_from_rotation(r: &Matrix3) -> Vector3 {
    let sin_b = r[(0, 2)].clamp(-1.0, 1.0);
    let (a, b, c) = if sin_b.abs() < 1.0 - 1e-12 {
        let b = sin_b.asin();
        let a = (-r[(1, 2)]).atan2(r[(2, 2)]);
        let c = (-r[(0, 1)]).atan2(r[(0, 0)]);
        (a, b, c)
    } else {
        let b = sin_b.signum() * std::f64::consts::FRAC_PI_2;
        let a = r[(2, 1)].atan2(r[(1, 1)]);
        (a, b, 0.0)
    };
    Vector3::new(a.to_degrees(), b.to_degrees(), c.to_degrees())
}

/// 线性部分的 QR 分解 `A = Q · U`
///
/// Q 为真旋转，U 为上三角且对角线非负（镜像时 `U[2][2]` 为负）。
/// 线性相关的列在最后用正交补填充，使秩亏矩阵的 U 对应行全部为零。
fn orthogonal_triangular(a: &Matrix3) -> (Matrix3, Matrix3) {
    let scale = (0..3).map(|j| a.column(j).norm()).fold(1.0_f64, f64::max);
    let threshold = RANK_EPSILON * scale;

    let mut q: [Option<Vector3>; 3] = [None, None, None];
    let mut u = Matrix3::zeros();

    for j in 0..3 {
        let column: Vector3 = a.column(j).into_owned();
        let mut residual = column;
        for (i, qi) in q.iter().enumerate().take(j) {
            if let Some(qi) = qi {
                let r = qi.dot(&column);
                u[(i, j)] = r;
                residual -= r * qi;
            }
        }
        let norm = residual.norm();
        if norm > threshold {
            u[(j, j)] = norm;
            q[j] = Some(residual / norm);
        }
    }

    // 正交补
    let determined: Vec<Vector3> = q.iter().flatten().copied().collect();
    let mut completion = complete_basis(&determined).into_iter();
    let mut deferred = Vec::new();
    for (i, qi) in q.iter_mut().enumerate() {
        if qi.is_none() {
            *qi = completion.next();
            deferred.push(i);
        }
    }

    let mut basis = Matrix3::zeros();
    for (i, qi) in q.iter().enumerate() {
        if let Some(qi) = qi {
            basis.set_column(i, qi);
        }
    }

    if basis.determinant() < 0.0 {
        let flip = deferred.last().copied().unwrap_or(2);
        let column = -basis.column(flip);
        basis.set_column(flip, &column);
        let row = -u.row(flip);
        u.set_row(flip, &row);
    }

    (basis, u)
}

/// 补全正交基
fn complete_basis(determined: &[Vector3]) -> Vec<Vector3> {
    match determined {
        [] => vec![Vector3::x(), Vector3::y(), Vector3::z()],
        [d0] => {
            // 选与 d0 夹角最大的坐标轴
            let axes = [Vector3::x(), Vector3::y(), Vector3::z()];
            let axis = axes
                .iter()
                .min_by(|l, r| {
                    l.dot(d0)
                        .abs()
                        .partial_cmp(&r.dot(d0).abs())
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .copied()
                .unwrap_or_else(Vector3::x);
            let qa = (axis - axis.dot(d0) * d0).normalize();
            let qb = d0.cross(&qa);
            vec![qa, qb]
        }
        [d0, d1] => vec![d0.cross(d1).normalize()],
        _ => Vec::new(),
    }
}
