//! 捕捉调度
//!
//! 每个候选对象的入口。请求的模式先与网格支持的模式求交，
//! 然后按优先级依次尝试：
//! 1. 顶点/边类（屏幕投影最近点）
//! 2. 面（射线投射）
//! 3. 表面最近点
//!
//! 前一阶段成功时后续阶段不再运行，返回值是实际产生结果的那一个模式。
//! 每个对象只提交原始的边结果；端点、中点与垂足的细化在所有对象扫描完之后
//! 由 [`refine_edge`] 对最终获胜的边执行一次。

use crate::context::QueryContext;
use crate::mode::{SnapMode, SnapType};
use crate::nearest2d::{EdgePolicy, Nearest2d, NearestCandidate, ProjectedSearch};
use crate::object::{normal_matrix, SnapObject};
use crate::raycast::raycast_mesh;
use crate::result::{ResultState, SnapCandidate, SnapMetric};
use crate::surface::nearest_world_mesh;
use std::sync::Arc;
use tracing::{debug, trace};
use zsnap_mesh::bvh::{Bvh, BvhKind};
use zsnap_mesh::cache::BvhCache;
use zsnap_mesh::math::{normalize_or_zero, Vector3};

/// 对一个对象运行捕捉
pub fn snap_object(
    ctx: &QueryContext,
    cache: &BvhCache,
    object: &SnapObject,
    result: &mut ResultState,
) -> Option<SnapType> {
    let used = ctx.config.modes & SnapMode::supported_by(&object.mesh);
    if used.is_empty() {
        trace!("{}: no supported snap mode", object.id);
        return None;
    }

    if used.intersects(SnapMode::GEOM) {
        if let Some(kind) = snap_edge_or_vertex(ctx, cache, object, used, result) {
            return Some(kind);
        }
    }

    if used.contains(SnapMode::FACE) {
        if let Some(kind) = snap_face(ctx, cache, object, result) {
            return Some(kind);
        }
    }

    if used.contains(SnapMode::INDIVIDUAL_NEAREST) {
        if let Some(kind) = snap_nearest_on_surface(ctx, cache, object, result) {
            return Some(kind);
        }
    }

    None
}

/// 面捕捉
pub fn snap_face(
    ctx: &QueryContext,
    cache: &BvhCache,
    object: &SnapObject,
    result: &mut ResultState,
) -> Option<SnapType> {
    raycast_mesh(ctx, cache, object, result).then_some(SnapType::Face)
}

/// 表面最近点捕捉
pub fn snap_nearest_on_surface(
    ctx: &QueryContext,
    cache: &BvhCache,
    object: &SnapObject,
    result: &mut ResultState,
) -> Option<SnapType> {
    nearest_world_mesh(ctx, cache, object, result).then_some(SnapType::IndividualNearest)
}

/// 顶点/边类捕捉
///
/// `used` 为请求模式与网格支持模式的交集。
pub fn snap_edge_or_vertex(
    ctx: &QueryContext,
    cache: &BvhCache,
    object: &SnapObject,
    used: SnapMode,
    result: &mut ResultState,
) -> Option<SnapType> {
    let mesh = &object.mesh;
    if mesh.verts_num() == 0 {
        return None;
    }
    if mesh.edges_num() == 0 && !used.contains(SnapMode::VERTEX) {
        return None;
    }

    let nearest = Nearest2d::new(ctx, object)?;
    let dist_px_sq = result.dist_px_sq();
    if let Some(bounds) = mesh.bounds() {
        if !nearest.snap_boundbox(&bounds, dist_px_sq) {
            trace!("{}: bounding box outside snap radius", object.id);
            return None;
        }
    }

    let tris = cache.get_or_build(object.mesh_id, BvhKind::Triangles, mesh);
    let loose_edges = cache.get_or_build(object.mesh_id, BvhKind::LooseEdges, mesh);
    let mut best = NearestCandidate::new(dist_px_sq);

    if used.contains(SnapMode::VERTEX) {
        if let Some(tree) = cache.get_or_build(object.mesh_id, BvhKind::LooseVerts, mesh) {
            nearest.search(&tree, ProjectedSearch::Verts, &mut best);
        }
    }

    if used.contains(SnapMode::EDGE) {
        search_edges(&nearest, &loose_edges, &tris, EdgePolicy::Nearest, &mut best);
    } else {
        if used.contains(SnapMode::VERTEX) {
            if let Some(tree) = &loose_edges {
                nearest.search(tree, ProjectedSearch::EdgeVerts, &mut best);
            }
            if let Some(tree) = &tris {
                nearest.search(tree, ProjectedSearch::TriVerts, &mut best);
            }
        }
        if used.contains(SnapMode::EDGE_MIDPOINT) {
            search_edges(&nearest, &loose_edges, &tris, EdgePolicy::Midpoint, &mut best);
        }
        if used.contains(SnapMode::EDGE_PERPENDICULAR) {
            if let Some(reference) = ctx.curr_co {
                let policy = EdgePolicy::Perpendicular(reference);
                search_edges(&nearest, &loose_edges, &tris, policy, &mut best);
            }
        }
    }

    commit_nearest(object, &best, result)
}

/// 在给定面的边或顶点上捕捉（通常在面命中之后）
///
/// 提交的是原始边结果，需要端点或中点时随后调用 [`refine_edge`]。
pub fn snap_polygon(
    ctx: &QueryContext,
    object: &SnapObject,
    face: usize,
    result: &mut ResultState,
) -> Option<SnapType> {
    let used = ctx.config.modes & SnapMode::supported_by(&object.mesh);
    if !used.intersects(SnapMode::EDGE | SnapMode::VERTEX) || face >= object.mesh.faces_num() {
        return None;
    }

    let nearest = Nearest2d::new(ctx, object)?;
    let mut best = NearestCandidate::new(result.dist_px_sq());
    nearest.snap_polygon(face, used, &mut best);

    commit_nearest(object, &best, result)
}

/// 把获胜的边细化为同一条边上的端点、中点或垂足
///
/// `object` 必须是产生当前边结果的对象。细化从配置的捕捉半径开始，
/// 与其他对象的边无关；没有合格的细化点时保留边。返回最终的捕捉类型。
pub fn refine_edge(
    ctx: &QueryContext,
    object: &SnapObject,
    result: &mut ResultState,
) -> Option<SnapType> {
    let (Some(SnapType::Edge), Some(index)) = (result.kind(), result.index()) else {
        return result.kind();
    };
    let used = ctx.config.modes & SnapMode::supported_by(&object.mesh);
    let refinable = SnapMode::VERTEX | SnapMode::EDGE_MIDPOINT | SnapMode::EDGE_PERPENDICULAR;
    if result.object() != Some(object.id) || !used.intersects(refinable) {
        return result.kind();
    }
    let Some(nearest) = Nearest2d::new(ctx, object) else {
        return result.kind();
    };

    trace!("{}: refining edge {}", object.id, index);
    let edge = NearestCandidate {
        kind: Some(SnapType::Edge),
        index: Some(index),
        dist_sq: result.dist_px_sq(),
        co: result.local_location(),
        no: Vector3::zeros(),
    };
    let radius_sq = ctx.config.radius_sq();
    let refined = nearest.snap_edge_points(&edge, radius_sq, used, ctx.curr_co);
    if let Some(candidate) = to_candidate(object, &refined) {
        if candidate.kind != SnapType::Edge && result.refine_edge(candidate, radius_sq) {
            debug!("{}: edge {} refined to {:?}", object.id, index, result.kind());
        }
    }
    result.kind()
}

/// 按顺序对多个对象运行捕捉，返回最终的捕捉类型
pub fn snap_objects(
    ctx: &QueryContext,
    cache: &BvhCache,
    objects: &[SnapObject],
    result: &mut ResultState,
) -> Option<SnapType> {
    for object in objects {
        if let Some(kind) = snap_object(ctx, cache, object, result) {
            debug!("{}: snapped to {:?}", object.id, kind);
        }
    }

    if result.kind() == Some(SnapType::Edge) {
        if let Some(object) = objects.iter().find(|o| result.object() == Some(o.id)) {
            refine_edge(ctx, object, result);
        }
    }
    result.sort_hits();
    result.kind()
}

fn search_edges(
    nearest: &Nearest2d,
    loose_edges: &Option<Arc<Bvh>>,
    tris: &Option<Arc<Bvh>>,
    policy: EdgePolicy,
    best: &mut NearestCandidate,
) {
    if let Some(tree) = loose_edges {
        nearest.search(tree, ProjectedSearch::Edges(policy), best);
    }
    if let Some(tree) = tris {
        nearest.search(tree, ProjectedSearch::TriEdges(policy), best);
    }
}

/// 把局部空间的投影搜索结果变换到世界空间并提交
fn commit_nearest(
    object: &SnapObject,
    best: &NearestCandidate,
    result: &mut ResultState,
) -> Option<SnapType> {
    let candidate = to_candidate(object, best)?;
    let kind = candidate.kind;
    result.commit(candidate).then_some(kind)
}

fn to_candidate(object: &SnapObject, best: &NearestCandidate) -> Option<SnapCandidate> {
    let (Some(kind), Some(index)) = (best.kind, best.index) else {
        return None;
    };

    let normal = match kind {
        SnapType::Vertex => match object.imat() {
            Some(imat) => normal_matrix(&imat) * best.no,
            None => best.no,
        },
        // 边类的"法线"是边方向
        _ => object.obmat.transform_vector(&best.no),
    };

    Some(SnapCandidate {
        kind,
        metric: SnapMetric::ScreenDistSq(best.dist_sq),
        location: object.obmat.transform_point(&best.co),
        local_location: best.co,
        normal: normalize_or_zero(&normal),
        index,
        object: object.id,
        obmat: object.obmat,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SnapConfig;
    use crate::object::ObjectId;
    use zsnap_mesh::cache::MeshId;
    use zsnap_mesh::math::{Matrix4, Point2, Point3, Vector2, Vector3};
    use zsnap_mesh::mesh::Mesh;

    fn top_view(cursor: [f64; 2], config: SnapConfig) -> QueryContext {
        let eye = Point3::new(0.0, 0.0, 10.0);
        let view = Matrix4::look_at_rh(&eye, &Point3::origin(), &Vector3::y());
        let proj = Matrix4::new_orthographic(-10.0, 10.0, -10.0, 10.0, 0.1, 100.0);
        QueryContext::new(config, proj * view, Vector2::new(200.0, 200.0), Point2::from(cursor))
    }

    fn quad() -> Mesh {
        Mesh::from_polygons(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(2.0, 0.0, 0.0),
                Point3::new(2.0, 2.0, 0.0),
                Point3::new(0.0, 2.0, 0.0),
            ],
            &[vec![0, 1, 2, 3]],
            &[],
        )
        .unwrap()
    }

    #[test]
    fn test_stage_order() {
        let mesh = quad();
        let object = SnapObject::new(ObjectId(0), Matrix4::identity(), MeshId(0), mesh.as_data());
        let cache = BvhCache::new();

        // 光标靠近顶点 2：顶点/边阶段成功，面不再运行
        let ctx = top_view([119.0, 119.0], SnapConfig::default());
        let mut result = ResultState::new(&ctx);
        assert_eq!(snap_object(&ctx, &cache, &object, &mut result), Some(SnapType::Edge));
        // 扫描结束后细化为端点
        assert_eq!(refine_edge(&ctx, &object, &mut result), Some(SnapType::Vertex));
        assert_eq!(result.index(), Some(2));
        assert!((result.location() - Point3::new(2.0, 2.0, 0.0)).norm() < 1e-9);

        // 光标在面内部，远离所有边：回落到面
        let ctx = top_view([112.0, 108.0], SnapConfig::default().with_radius(5.0));
        let mut result = ResultState::new(&ctx);
        assert_eq!(snap_object(&ctx, &cache, &object, &mut result), Some(SnapType::Face));
        assert_eq!(result.index(), Some(0));
        assert!((result.location() - Point3::new(1.2, 0.8, 0.0)).norm() < 1e-9);
    }

    #[test]
    fn test_midpoint_without_edge() {
        let mesh = quad();
        let object = SnapObject::new(ObjectId(0), Matrix4::identity(), MeshId(0), mesh.as_data());
        let cache = BvhCache::new();

        let config = SnapConfig::default().with_modes(SnapMode::EDGE_MIDPOINT);
        let ctx = top_view([111.0, 102.0], config);
        let mut result = ResultState::new(&ctx);
        assert_eq!(snap_object(&ctx, &cache, &object, &mut result), Some(SnapType::EdgeMidpoint));
        assert_eq!(result.index(), Some(0));
        assert!((result.location() - Point3::new(1.0, 0.0, 0.0)).norm() < 1e-9);
    }

    #[test]
    fn test_snap_polygon_after_face_hit() {
        let mesh = quad();
        let object = SnapObject::new(ObjectId(0), Matrix4::identity(), MeshId(0), mesh.as_data());
        let cache = BvhCache::new();

        let config = SnapConfig::default().with_modes(SnapMode::FACE | SnapMode::EDGE);
        let ctx = top_view([110.0, 119.0], config);
        let mut result = ResultState::new(&ctx);
        assert!(snap_face(&ctx, &cache, &object, &mut result).is_some());
        let face = result.index().unwrap();

        assert_eq!(snap_polygon(&ctx, &object, face, &mut result), Some(SnapType::Edge));
        // 边 2 连接顶点 2-3（y = 2）
        assert_eq!(result.index(), Some(2));
        assert!((result.location() - Point3::new(1.0, 2.0, 0.0)).norm() < 1e-9);
        // 只请求了边，细化不改变结果
        assert_eq!(refine_edge(&ctx, &object, &mut result), Some(SnapType::Edge));
        assert_eq!(result.index(), Some(2));
    }

    #[test]
    fn test_refine_edge_from_original_radius() {
        let mesh = quad();
        let object = SnapObject::new(ObjectId(0), Matrix4::identity(), MeshId(0), mesh.as_data());
        let cache = BvhCache::new();

        // 光标到边 0 距离 1 像素（t = 0.1），端点距离约 2.2 像素
        let config = SnapConfig::default().with_modes(SnapMode::EDGE | SnapMode::VERTEX);
        let ctx = top_view([102.0, 101.0], config);
        let mut result = ResultState::new(&ctx);
        assert_eq!(snap_object(&ctx, &cache, &object, &mut result), Some(SnapType::Edge));
        assert!((result.dist_px_sq() - 1.0).abs() < 1e-6);

        assert_eq!(refine_edge(&ctx, &object, &mut result), Some(SnapType::Vertex));
        assert_eq!(result.index(), Some(0));
        assert!((result.dist_px_sq() - 5.0).abs() < 1e-6);

        // 其他对象不能细化这条边
        let other = SnapObject::new(ObjectId(1), Matrix4::identity(), MeshId(0), mesh.as_data());
        let mut result = ResultState::new(&ctx);
        snap_object(&ctx, &cache, &object, &mut result);
        assert_eq!(refine_edge(&ctx, &other, &mut result), Some(SnapType::Edge));
    }
}
