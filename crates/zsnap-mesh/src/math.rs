//! 数学类型
//!
//! 基于 nalgebra 的双精度类型别名，以及三维轴对齐包围盒。

use nalgebra as na;
use serde::{Deserialize, Serialize};

pub type Point2 = na::Point2<f64>;
pub type Point3 = na::Point3<f64>;
pub type Vector2 = na::Vector2<f64>;
pub type Vector3 = na::Vector3<f64>;
pub type Vector4 = na::Vector4<f64>;
pub type Matrix3 = na::Matrix3<f64>;
pub type Matrix4 = na::Matrix4<f64>;

/// 浮点比较容差
pub const EPSILON: f64 = 1e-10;

/// 射线（原点 + 方向）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Point3,
    pub direction: Vector3,
}

impl Ray {
    pub fn new(origin: Point3, direction: Vector3) -> Self {
        Self { origin, direction }
    }

    /// 射线上距离原点 `t` 处的点
    pub fn point_at(&self, t: f64) -> Point3 {
        self.origin + self.direction * t
    }
}

/// 三维轴对齐包围盒
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb3 {
    pub min: Point3,
    pub max: Point3,
}

impl Aabb3 {
    pub fn new(min: Point3, max: Point3) -> Self {
        Self { min, max }
    }

    /// 空包围盒（min > max），用于累加
    pub fn empty() -> Self {
        Self {
            min: Point3::new(f64::MAX, f64::MAX, f64::MAX),
            max: Point3::new(f64::MIN, f64::MIN, f64::MIN),
        }
    }

    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point3>) -> Self {
        let mut bounds = Self::empty();
        for p in points {
            bounds.grow(p);
        }
        bounds
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// 扩展以包含点
    pub fn grow(&mut self, p: &Point3) {
        self.min = self.min.inf(p);
        self.max = self.max.sup(p);
    }

    pub fn union(&self, other: &Aabb3) -> Aabb3 {
        Aabb3 {
            min: self.min.inf(&other.min),
            max: self.max.sup(&other.max),
        }
    }

    pub fn center(&self) -> Point3 {
        na::center(&self.min, &self.max)
    }

    pub fn extent(&self) -> Vector3 {
        self.max - self.min
    }

    /// 最长轴（0=X, 1=Y, 2=Z）
    pub fn longest_axis(&self) -> usize {
        let e = self.extent();
        if e.x >= e.y && e.x >= e.z {
            0
        } else if e.y >= e.z {
            1
        } else {
            2
        }
    }

    /// 8个角点，按 x 最快变化的顺序排列
    pub fn corners(&self) -> [Point3; 8] {
        let (lo, hi) = (self.min, self.max);
        [
            Point3::new(lo.x, lo.y, lo.z),
            Point3::new(hi.x, lo.y, lo.z),
            Point3::new(lo.x, hi.y, lo.z),
            Point3::new(hi.x, hi.y, lo.z),
            Point3::new(lo.x, lo.y, hi.z),
            Point3::new(hi.x, lo.y, hi.z),
            Point3::new(lo.x, hi.y, hi.z),
            Point3::new(hi.x, hi.y, hi.z),
        ]
    }

    /// 点到包围盒的距离平方（盒内为0）
    pub fn distance_sq_to_point(&self, p: &Point3) -> f64 {
        let mut d = 0.0;
        for i in 0..3 {
            if p[i] < self.min[i] {
                d += (self.min[i] - p[i]).powi(2);
            } else if p[i] > self.max[i] {
                d += (p[i] - self.max[i]).powi(2);
            }
        }
        d
    }

    /// 射线与包围盒的板块相交测试
    ///
    /// 返回 `(t_enter, t_exit)`。原点在盒内时 `t_enter` 为负。
    /// 方向分量为零时使用极大的倒数，不做除零特判。
    pub fn ray_intersection(&self, origin: &Point3, direction: &Vector3) -> Option<(f64, f64)> {
        let mut t_enter = f64::MIN;
        let mut t_exit = f64::MAX;
        for i in 0..3 {
            let inv = if direction[i].abs() > 1e-35 {
                1.0 / direction[i]
            } else {
                f64::MAX
            };
            let t0 = (self.min[i] - origin[i]) * inv;
            let t1 = (self.max[i] - origin[i]) * inv;
            t_enter = t_enter.max(t0.min(t1));
            t_exit = t_exit.min(t0.max(t1));
        }

        if t_exit < 0.0 || t_enter > t_exit {
            None
        } else {
            Some((t_enter, t_exit))
        }
    }
}

impl Default for Aabb3 {
    fn default() -> Self {
        Self::empty()
    }
}

/// 三角形的非归一化法线（右手，逆时针为正面）
pub fn tri_normal_unnormalized(v0: &Point3, v1: &Point3, v2: &Point3) -> Vector3 {
    (v1 - v0).cross(&(v2 - v0))
}

/// 归一化；零向量保持为零
pub fn normalize_or_zero(v: &Vector3) -> Vector3 {
    v.try_normalize(EPSILON).unwrap_or_else(Vector3::zeros)
}
