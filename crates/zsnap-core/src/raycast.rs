//! 射线投射
//!
//! 把世界射线变换到对象局部空间后对三角形BVH求交：
//! 1. 局部深度上限 = 世界深度 × 局部缩放（方向向量变换后的长度）
//! 2. 先与整个网格的包围盒求交，未命中直接返回
//! 3. 包围盒进入距离超过 [`PRECISION_OFFSET_THRESHOLD`] 时把原点前移，减少远距离原点的精度损失
//! 4. 命中点与法线变换回世界空间，深度按局部缩放换算后与剩余深度比较

use crate::accessor::MeshAccessor;
use crate::context::QueryContext;
use crate::mode::SnapType;
use crate::object::{normal_matrix, SnapObject};
use crate::result::{HitDepth, ResultState, SnapCandidate, SnapMetric};
use tracing::trace;
use zsnap_mesh::bvh::{BvhKind, RayHit};
use zsnap_mesh::cache::BvhCache;
use zsnap_mesh::math::{normalize_or_zero, tri_normal_unnormalized, Point3, Ray, Vector3, EPSILON};

/// 包围盒进入距离超过此值（局部单位）时前移射线原点
pub const PRECISION_OFFSET_THRESHOLD: f64 = 400.0;

/// 射线-三角形求交（Möller–Trumbore，双面）
///
/// 返回非负的命中距离。
pub fn ray_tri_intersection(ray: &Ray, v0: &Point3, v1: &Point3, v2: &Point3) -> Option<f64> {
    let e1 = v1 - v0;
    let e2 = v2 - v0;

    let p = ray.direction.cross(&e2);
    let det = e1.dot(&p);
    if det.abs() < EPSILON {
        // 射线与三角形平行
        return None;
    }

    let inv_det = 1.0 / det;
    let s = ray.origin - v0;
    let u = s.dot(&p) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let q = s.cross(&e1);
    let v = ray.direction.dot(&q) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = e2.dot(&q) * inv_det;
    (t >= 0.0).then_some(t)
}

/// 法线与视线方向相对时为正面
pub fn is_front_facing(direction: &Vector3, normal: &Vector3) -> bool {
    normal.dot(direction) < 0.0
}

/// 单个三角形的最近命中回调
fn raycast_tri(
    access: &MeshAccessor,
    index: usize,
    ray: &Ray,
    hit: &mut RayHit,
    use_backface_culling: bool,
) {
    let [v0, v1, v2] = access.tri_co(index);
    let Some(dist) = ray_tri_intersection(ray, v0, v1, v2) else {
        return;
    };
    if dist >= hit.dist {
        return;
    }

    let normal = tri_normal_unnormalized(v0, v1, v2);
    if use_backface_culling && !is_front_facing(&ray.direction, &normal) {
        return;
    }

    hit.index = Some(index);
    hit.dist = dist;
    hit.co = ray.point_at(dist);
    hit.no = normalize_or_zero(&normal);
}

/// 对一个网格对象做面射线投射
///
/// 命中时通过 [`ResultState::commit`] 写入结果（索引为源面索引）。
/// "全部命中"模式下每个交点都会追加到命中列表，最近的一个同时参与结果竞争。
pub fn raycast_mesh(
    ctx: &QueryContext,
    cache: &BvhCache,
    object: &SnapObject,
    result: &mut ResultState,
) -> bool {
    let mesh = &object.mesh;
    if mesh.faces_num() == 0 {
        return false;
    }
    let Some(imat) = object.imat() else {
        trace!("{}: singular object matrix, skipping raycast", object.id);
        return false;
    };

    let origin = imat.transform_point(&ctx.ray_origin);
    let direction = imat.transform_vector(&ctx.ray_direction);

    // 方向上的局部缩放
    let local_scale = direction.norm();
    if local_scale <= EPSILON {
        return false;
    }
    let direction = direction / local_scale;

    let all_hits = result.wants_all_hits();
    let depth_max = if all_hits {
        ctx.ray_depth_max
    } else {
        result.ray_depth_max()
    };
    let mut local_depth = depth_max;
    if local_depth.is_finite() {
        local_depth *= local_scale;
    }

    let mut len_diff = 0.0;
    if let Some(bounds) = mesh.bounds() {
        match bounds.ray_intersection(&origin, &direction) {
            Some((t_enter, _)) => len_diff = t_enter,
            None => {
                trace!("{}: ray misses bounding box", object.id);
                return false;
            }
        }
    }

    let mut ray = Ray::new(origin, direction);
    if len_diff > PRECISION_OFFSET_THRESHOLD {
        // 临时原点停在包围盒进入点之前一点
        len_diff -= local_scale;
        ray.origin += direction * len_diff;
        local_depth -= len_diff;
    } else {
        len_diff = 0.0;
    }

    let Some(tree) = cache.get_or_build(object.mesh_id, BvhKind::Triangles, mesh) else {
        return false;
    };

    let access = MeshAccessor::new(*mesh);
    let use_backface_culling = ctx.config.use_backface_culling;
    let timat = normal_matrix(&imat);
    let to_world = |hit: &RayHit| {
        let depth = (hit.dist + len_diff) / local_scale;
        let location = object.obmat.transform_point(&hit.co);
        let normal = normalize_or_zero(&(timat * hit.no));
        (depth, location, normal)
    };

    if all_hits {
        let mut hits = Vec::new();
        tree.ray_cast_all(&ray, local_depth, |index, ray, hit| {
            raycast_tri(&access, index, ray, hit, use_backface_culling);
            if hit.index.is_some() {
                hits.push(*hit);
            }
        });

        for hit in &hits {
            let Some(triangle) = hit.index else {
                continue;
            };
            let (depth, location, normal) = to_world(hit);
            let face = access.tri_face(triangle);
            result.push_hit(HitDepth {
                depth,
                location,
                normal,
                triangle,
                face,
                object: object.id,
                obmat: object.obmat,
                len_diff,
            });
            result.commit(SnapCandidate {
                kind: SnapType::Face,
                metric: SnapMetric::RayDepth(depth),
                location,
                local_location: hit.co,
                normal,
                index: face,
                object: object.id,
                obmat: object.obmat,
            });
        }
        trace!("{}: {} ray hits", object.id, hits.len());
        return !hits.is_empty();
    }

    let mut hit = RayHit::new(local_depth);
    let Some(triangle) = tree.ray_cast(&ray, &mut hit, |index, ray, hit| {
        raycast_tri(&access, index, ray, hit, use_backface_culling)
    }) else {
        return false;
    };

    let (depth, location, normal) = to_world(&hit);
    if depth > result.ray_depth_max() {
        return false;
    }
    result.commit(SnapCandidate {
        kind: SnapType::Face,
        metric: SnapMetric::RayDepth(depth),
        location,
        local_location: hit.co,
        normal,
        index: access.tri_face(triangle),
        object: object.id,
        obmat: object.obmat,
    })
}
