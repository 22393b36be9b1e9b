//! 捕捉结果状态
//!
//! 调用方持有、跨越整个多对象扫描的累加器。扫描过程中核心只能通过
//! [`ResultState::commit`] 收窄它，`improves_on` 是扫描期的修改闸门：
//!
//! - 优先级更低的类别（顶点/边类 > 面 > 表面最近点）不能覆盖更高的类别
//! - 同类别内按各自度量比较：屏幕距离平方严格更小、射线深度不大于、
//!   表面距离平方严格更小
//!
//! 扫描结束后，获胜的边可以经 [`ResultState::refine_edge`] 细化为同一条边上的
//! 端点、中点或垂足，细化点只需落在捕捉半径内。

use crate::context::QueryContext;
use crate::mode::SnapType;
use crate::object::ObjectId;
use serde::{Deserialize, Serialize};
use zsnap_mesh::math::{Matrix4, Point3, Vector3};

/// 候选结果的度量
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SnapMetric {
    /// 屏幕空间距离平方（像素²）
    ScreenDistSq(f64),
    /// 世界空间射线深度
    RayDepth(f64),
    /// 到参考点的世界空间距离平方
    SurfaceDistSq(f64),
}

/// 待提交的候选结果（世界空间）
#[derive(Debug, Clone, PartialEq)]
pub struct SnapCandidate {
    pub kind: SnapType,
    pub metric: SnapMetric,
    pub location: Point3,
    pub local_location: Point3,
    pub normal: Vector3,
    pub index: usize,
    pub object: ObjectId,
    pub obmat: Matrix4,
}

/// 射线穿透记录（"全部命中"模式）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HitDepth {
    /// 世界空间深度
    pub depth: f64,
    pub location: Point3,
    pub normal: Vector3,
    /// 三角形索引
    pub triangle: usize,
    /// 源面索引
    pub face: usize,
    pub object: ObjectId,
    pub obmat: Matrix4,
    /// 精度修正时射线原点前移的局部距离
    pub len_diff: f64,
}

/// 捕捉结果状态
#[derive(Debug, Clone, PartialEq)]
pub struct ResultState {
    kind: Option<SnapType>,
    location: Point3,
    local_location: Point3,
    normal: Vector3,
    index: Option<usize>,
    object: Option<ObjectId>,
    obmat: Matrix4,
    dist_px_sq: f64,
    ray_depth_max: f64,
    dist_nearest_sq: f64,
    hit_list: Option<Vec<HitDepth>>,
}

impl ResultState {
    /// 为一次查询初始化：像素阈值来自配置，深度上限来自上下文
    pub fn new(ctx: &QueryContext) -> Self {
        Self {
            kind: None,
            location: Point3::origin(),
            local_location: Point3::origin(),
            normal: Vector3::zeros(),
            index: None,
            object: None,
            obmat: Matrix4::identity(),
            dist_px_sq: ctx.config.radius_sq(),
            ray_depth_max: ctx.ray_depth_max,
            dist_nearest_sq: f64::MAX,
            hit_list: ctx.config.hit_all.then(Vec::new),
        }
    }

    /// 候选结果是否优于当前结果
    pub fn improves_on(&self, kind: SnapType, metric: SnapMetric) -> bool {
        match self.kind {
            Some(current) if current.priority() > kind.priority() => false,
            _ => self.within_threshold(metric),
        }
    }

    fn within_threshold(&self, metric: SnapMetric) -> bool {
        match metric {
            SnapMetric::ScreenDistSq(d) => d < self.dist_px_sq,
            SnapMetric::RayDepth(d) => d <= self.ray_depth_max,
            SnapMetric::SurfaceDistSq(d) => d < self.dist_nearest_sq,
        }
    }

    /// 提交候选结果；只有优于当前结果时才写入
    pub fn commit(&mut self, candidate: SnapCandidate) -> bool {
        if !self.improves_on(candidate.kind, candidate.metric) {
            return false;
        }
        self.apply(candidate);
        true
    }

    /// 用获胜边上的细化点替换当前的边结果
    ///
    /// 当前结果必须是同一对象的边，细化点的屏幕距离可以大于边本身，
    /// 但必须小于 `radius_sq`。
    pub fn refine_edge(&mut self, candidate: SnapCandidate, radius_sq: f64) -> bool {
        let refinable = matches!(
            candidate.kind,
            SnapType::Vertex | SnapType::EdgeMidpoint | SnapType::EdgePerpendicular
        );
        let within = matches!(candidate.metric, SnapMetric::ScreenDistSq(d) if d < radius_sq);
        if !refinable
            || !within
            || self.kind != Some(SnapType::Edge)
            || self.object != Some(candidate.object)
        {
            return false;
        }
        self.apply(candidate);
        true
    }

    fn apply(&mut self, candidate: SnapCandidate) {
        match candidate.metric {
            SnapMetric::ScreenDistSq(d) => self.dist_px_sq = d,
            SnapMetric::RayDepth(d) => self.ray_depth_max = d,
            SnapMetric::SurfaceDistSq(d) => self.dist_nearest_sq = d,
        }
        self.kind = Some(candidate.kind);
        self.location = candidate.location;
        self.local_location = candidate.local_location;
        self.normal = candidate.normal;
        self.index = Some(candidate.index);
        self.object = Some(candidate.object);
        self.obmat = candidate.obmat;
    }

    /// 记录一次穿透命中（仅在"全部命中"模式下生效）
    pub fn push_hit(&mut self, hit: HitDepth) -> bool {
        match self.hit_list.as_mut() {
            Some(list) => {
                list.push(hit);
                true
            }
            None => false,
        }
    }

    /// 按深度稳定排序命中列表
    pub fn sort_hits(&mut self) {
        if let Some(list) = self.hit_list.as_mut() {
            list.sort_by(|a, b| a.depth.total_cmp(&b.depth));
        }
    }

    pub fn kind(&self) -> Option<SnapType> {
        self.kind
    }

    pub fn location(&self) -> Point3 {
        self.location
    }

    pub fn local_location(&self) -> Point3 {
        self.local_location
    }

    pub fn normal(&self) -> Vector3 {
        self.normal
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn object(&self) -> Option<ObjectId> {
        self.object
    }

    pub fn obmat(&self) -> &Matrix4 {
        &self.obmat
    }

    pub fn dist_px_sq(&self) -> f64 {
        self.dist_px_sq
    }

    pub fn ray_depth_max(&self) -> f64 {
        self.ray_depth_max
    }

    pub fn dist_nearest_sq(&self) -> f64 {
        self.dist_nearest_sq
    }

    pub fn hit_list(&self) -> Option<&[HitDepth]> {
        self.hit_list.as_deref()
    }

    pub fn wants_all_hits(&self) -> bool {
        self.hit_list.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SnapConfig;
    use zsnap_mesh::math::{Point2, Vector2};

    fn ctx(config: SnapConfig) -> QueryContext {
        QueryContext::new(
            config,
            Matrix4::identity(),
            Vector2::new(100.0, 100.0),
            Point2::new(50.0, 50.0),
        )
    }

    fn candidate(kind: SnapType, metric: SnapMetric, index: usize) -> SnapCandidate {
        SnapCandidate {
            kind,
            metric,
            location: Point3::new(index as f64, 0.0, 0.0),
            local_location: Point3::new(index as f64, 0.0, 0.0),
            normal: Vector3::z(),
            index,
            object: ObjectId(1),
            obmat: Matrix4::identity(),
        }
    }

    #[test]
    fn test_commit_monotonic() {
        let mut result = ResultState::new(&ctx(SnapConfig::default().with_radius(10.0)));
        assert_eq!(result.dist_px_sq(), 100.0);

        // 超出阈值
        assert!(!result.commit(candidate(SnapType::Vertex, SnapMetric::ScreenDistSq(100.0), 0)));
        assert!(result.commit(candidate(SnapType::Edge, SnapMetric::ScreenDistSq(50.0), 1)));
        // 相等不替换
        assert!(!result.commit(candidate(SnapType::Vertex, SnapMetric::ScreenDistSq(50.0), 2)));
        assert!(result.commit(candidate(SnapType::Vertex, SnapMetric::ScreenDistSq(10.0), 3)));

        assert_eq!(result.kind(), Some(SnapType::Vertex));
        assert_eq!(result.index(), Some(3));
        assert_eq!(result.dist_px_sq(), 10.0);
    }

    #[test]
    fn test_priority_between_categories() {
        let mut result = ResultState::new(&ctx(SnapConfig::default()));

        assert!(result.commit(candidate(SnapType::Face, SnapMetric::RayDepth(5.0), 0)));
        assert!(result.commit(candidate(SnapType::Face, SnapMetric::RayDepth(5.0), 1)));
        assert!(!result.commit(candidate(SnapType::Face, SnapMetric::RayDepth(6.0), 2)));
        let nearest = candidate(SnapType::IndividualNearest, SnapMetric::SurfaceDistSq(0.0), 3);
        assert!(!result.commit(nearest));

        // 顶点/边类覆盖面
        assert!(result.commit(candidate(SnapType::Vertex, SnapMetric::ScreenDistSq(1.0), 4)));
        assert!(!result.commit(candidate(SnapType::Face, SnapMetric::RayDepth(0.5), 5)));
        assert_eq!(result.index(), Some(4));
        assert_eq!(result.ray_depth_max(), 5.0);
    }

    #[test]
    fn test_refine_edge() {
        let mut result = ResultState::new(&ctx(SnapConfig::default().with_radius(10.0)));
        let screen = |kind, d, index| candidate(kind, SnapMetric::ScreenDistSq(d), index);

        // 没有边结果时不能细化
        assert!(!result.refine_edge(screen(SnapType::Vertex, 4.0, 0), 100.0));

        assert!(result.commit(screen(SnapType::Edge, 9.0, 1)));
        assert!(!result.refine_edge(screen(SnapType::Vertex, 100.0, 2), 100.0));
        assert!(!result.refine_edge(screen(SnapType::Face, 1.0, 2), 100.0));
        let mut other = screen(SnapType::Vertex, 49.0, 2);
        other.object = ObjectId(2);
        assert!(!result.refine_edge(other, 100.0));

        // 细化点比边远，但仍在半径内
        assert!(result.refine_edge(screen(SnapType::Vertex, 49.0, 2), 100.0));
        assert_eq!(result.kind(), Some(SnapType::Vertex));
        assert_eq!(result.index(), Some(2));
        assert_eq!(result.dist_px_sq(), 49.0);

        // 已经不是边，不能再次细化
        assert!(!result.refine_edge(screen(SnapType::EdgeMidpoint, 1.0, 3), 100.0));
    }

    #[test]
    fn test_hit_list() {
        let mut result = ResultState::new(&ctx(SnapConfig::default()));
        assert!(!result.wants_all_hits());
        assert!(!result.push_hit(hit(1.0)));

        let mut result = ResultState::new(&ctx(SnapConfig::default().with_hit_all(true)));
        result.push_hit(hit(3.0));
        result.push_hit(hit(1.0));
        result.push_hit(hit(2.0));
        result.sort_hits();
        let depths: Vec<f64> = result.hit_list().unwrap().iter().map(|h| h.depth).collect();
        assert_eq!(depths, vec![1.0, 2.0, 3.0]);
    }

    fn hit(depth: f64) -> HitDepth {
        HitDepth {
            depth,
            location: Point3::origin(),
            normal: Vector3::z(),
            triangle: 0,
            face: 0,
            object: ObjectId(0),
            obmat: Matrix4::identity(),
            len_diff: 0.0,
        }
    }
}
