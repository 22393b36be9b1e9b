//! 表面最近点
//!
//! 在对象局部空间中从起点向参考点分步前进，每一步在三角形树中查找
//! 离当前点最近的表面点，上一步的结果作为下一步的初始上界。
//! 最终位置以世界空间到参考点的距离平方参与结果竞争。

use crate::accessor::MeshAccessor;
use crate::context::QueryContext;
use crate::mode::SnapType;
use crate::object::{normal_matrix, SnapObject};
use crate::result::{ResultState, SnapCandidate, SnapMetric};
use tracing::trace;
use zsnap_mesh::bvh::{Bvh, BvhKind, NearestVisitor};
use zsnap_mesh::cache::BvhCache;
use zsnap_mesh::math::{normalize_or_zero, Aabb3, Point3, Vector3};

/// 点到三角形的最近点（Ericson 区域判定）
pub fn closest_point_on_triangle(p: &Point3, a: &Point3, b: &Point3, c: &Point3) -> Point3 {
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;

    let d1 = ab.dot(&ap);
    let d2 = ac.dot(&ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return *a;
    }

    let bp = p - b;
    let d3 = ab.dot(&bp);
    let d4 = ac.dot(&bp);
    if d3 >= 0.0 && d4 <= d3 {
        return *b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return a + ab * v;
    }

    let cp = p - c;
    let d5 = ab.dot(&cp);
    let d6 = ac.dot(&cp);
    if d6 >= 0.0 && d5 <= d6 {
        return *c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return a + ac * w;
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return b + (c - b) * w;
    }

    // 面内
    let denom = 1.0 / (va + vb + vc);
    let v = vb * denom;
    let w = vc * denom;
    a + ab * v + ac * w
}

/// 局部空间的最近表面点
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfacePoint {
    /// 三角形索引
    pub index: Option<usize>,
    pub dist_sq: f64,
    pub co: Point3,
    pub no: Vector3,
}

impl SurfacePoint {
    fn new() -> Self {
        Self {
            index: None,
            dist_sq: f64::MAX,
            co: Point3::origin(),
            no: Vector3::zeros(),
        }
    }
}

struct SurfaceVisitor<'a, 'b> {
    access: &'b MeshAccessor<'a>,
    co: Point3,
    best: &'b mut SurfacePoint,
}

impl NearestVisitor for SurfaceVisitor<'_, '_> {
    fn node_dist_sq(&self, bounds: &Aabb3) -> Option<f64> {
        Some(bounds.distance_sq_to_point(&self.co))
    }

    fn best_dist_sq(&self) -> f64 {
        self.best.dist_sq
    }

    fn visit(&mut self, index: usize) {
        let [a, b, c] = self.access.tri_co(index);
        let closest = closest_point_on_triangle(&self.co, a, b, c);
        let dist_sq = (closest - self.co).norm_squared();
        if dist_sq < self.best.dist_sq {
            self.best.index = Some(index);
            self.best.dist_sq = dist_sq;
            self.best.co = closest;
            self.best.no = normalize_or_zero(&self.access.tri_normal(index));
        }
    }
}

/// 查询离 `co` 最近的表面点；`best` 中已有结果时以它到 `co` 的距离作为初始上界
pub fn nearest_surface_point(
    tree: &Bvh,
    access: &MeshAccessor,
    co: &Point3,
    best: &mut SurfacePoint,
) {
    if best.index.is_some() {
        best.dist_sq = (best.co - co).norm_squared();
    }
    let mut visitor = SurfaceVisitor {
        access,
        co: *co,
        best,
    };
    tree.find_nearest(&mut visitor);
}

/// 对一个网格对象做表面最近点捕捉
///
/// 需要参考点；没有起点时只在参考点处查询一次。
pub fn nearest_world_mesh(
    ctx: &QueryContext,
    cache: &BvhCache,
    object: &SnapObject,
    result: &mut ResultState,
) -> bool {
    let Some(curr_co) = ctx.curr_co else {
        return false;
    };
    if object.mesh.faces_num() == 0 {
        return false;
    }
    let Some(imat) = object.imat() else {
        return false;
    };
    let Some(tree) = cache.get_or_build(object.mesh_id, BvhKind::Triangles, &object.mesh) else {
        return false;
    };

    let access = MeshAccessor::new(object.mesh);
    let local_curr = imat.transform_point(&curr_co);
    let local_init = ctx.init_co.map_or(local_curr, |co| imat.transform_point(&co));

    let steps = ctx.config.nearest_steps.max(1);
    let delta = (local_curr - local_init) / steps as f64;
    let mut best = SurfacePoint::new();
    let mut co = local_init;
    for _ in 0..steps {
        co += delta;
        nearest_surface_point(&tree, &access, &co, &mut best);
    }

    let Some(triangle) = best.index else {
        return false;
    };
    let location = object.obmat.transform_point(&best.co);
    let dist_sq = (location - curr_co).norm_squared();
    trace!("{}: nearest surface point on triangle {}, dist² {:.6}", object.id, triangle, dist_sq);

    result.commit(SnapCandidate {
        kind: SnapType::IndividualNearest,
        metric: SnapMetric::SurfaceDistSq(dist_sq),
        location,
        local_location: best.co,
        normal: normalize_or_zero(&(normal_matrix(&imat) * best.no)),
        index: access.tri_face(triangle),
        object: object.id,
        obmat: object.obmat,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closest_point_regions() {
        let a = Point3::new(0.0, 0.0, 0.0);
        let b = Point3::new(2.0, 0.0, 0.0);
        let c = Point3::new(0.0, 2.0, 0.0);

        // 面内
        let p = closest_point_on_triangle(&Point3::new(0.5, 0.5, 3.0), &a, &b, &c);
        assert!((p - Point3::new(0.5, 0.5, 0.0)).norm() < 1e-12);
        // 顶点区域
        assert_eq!(closest_point_on_triangle(&Point3::new(-1.0, -1.0, 0.0), &a, &b, &c), a);
        assert_eq!(closest_point_on_triangle(&Point3::new(3.0, -1.0, 0.0), &a, &b, &c), b);
        // 边区域
        let p = closest_point_on_triangle(&Point3::new(1.0, -2.0, 0.0), &a, &b, &c);
        assert!((p - Point3::new(1.0, 0.0, 0.0)).norm() < 1e-12);
        let p = closest_point_on_triangle(&Point3::new(2.0, 2.0, 0.0), &a, &b, &c);
        assert!((p - Point3::new(1.0, 1.0, 0.0)).norm() < 1e-12);
    }
}
