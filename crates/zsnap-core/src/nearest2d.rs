//! 屏幕投影最近点搜索
//!
//! 把图元的顶点经投影矩阵变换到屏幕像素，寻找到光标距离平方最小的图元：
//! - 顶点：到投影点的距离
//! - 边：到投影线段上最近点的距离（透视校正后换算回三维）
//! - 三角形：拆分为顶点或边再测试
//!
//! 任一定义点在某个裁剪平面负侧时整个图元被跳过。
//! 候选结果只在距离严格更小时替换，初始阈值即捕捉半径的平方，
//! 因此相等距离时先找到者胜出（遍历顺序决定）。

use crate::accessor::MeshAccessor;
use crate::context::{project_to_screen, QueryContext};
use crate::mode::{SnapMode, SnapType};
use crate::object::SnapObject;
use crate::raycast::is_front_facing;
use zsnap_mesh::bvh::{Bvh, NearestVisitor};
use zsnap_mesh::math::{
    normalize_or_zero, Aabb3, Matrix4, Point2, Point3, Vector2, Vector3, Vector4, EPSILON,
};

/// 投影搜索的当前最优候选
#[derive(Debug, Clone, PartialEq)]
pub struct NearestCandidate {
    pub kind: Option<SnapType>,
    pub index: Option<usize>,
    /// 屏幕距离平方（像素²）
    pub dist_sq: f64,
    /// 局部空间位置
    pub co: Point3,
    /// 局部空间法线（边类为边方向）
    pub no: Vector3,
}

impl NearestCandidate {
    /// 以阈值（像素距离平方）初始化
    pub fn new(dist_sq: f64) -> Self {
        Self {
            kind: None,
            index: None,
            dist_sq,
            co: Point3::origin(),
            no: Vector3::zeros(),
        }
    }

    pub fn is(&self, kind: SnapType, index: usize) -> bool {
        self.kind == Some(kind) && self.index == Some(index)
    }

    pub fn found(&self) -> bool {
        self.index.is_some()
    }

    /// 距离严格更小时替换
    pub fn offer(
        &mut self,
        kind: SnapType,
        index: usize,
        dist_sq: f64,
        co: Point3,
        no: Vector3,
    ) -> bool {
        if dist_sq < self.dist_sq {
            self.kind = Some(kind);
            self.index = Some(index);
            self.dist_sq = dist_sq;
            self.co = co;
            self.no = no;
            true
        } else {
            false
        }
    }
}

/// 边上取点的策略
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EdgePolicy {
    /// 投影线段上离光标最近的点
    Nearest,
    /// 边中点
    Midpoint,
    /// 世界空间参考点到边的垂足，必须严格落在边内
    Perpendicular(Point3),
}

impl EdgePolicy {
    pub fn snap_type(&self) -> SnapType {
        match self {
            EdgePolicy::Nearest => SnapType::Edge,
            EdgePolicy::Midpoint => SnapType::EdgeMidpoint,
            EdgePolicy::Perpendicular(_) => SnapType::EdgePerpendicular,
        }
    }
}

/// 对BVH叶子图元的评估方式
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProjectedSearch {
    /// 松散顶点树：顶点本身
    Verts,
    /// 松散边树：整条边
    Edges(EdgePolicy),
    /// 松散边树：边的两个端点
    EdgeVerts,
    /// 三角形树：三角形的顶点
    TriVerts,
    /// 三角形树：三角形对应的存储边
    TriEdges(EdgePolicy),
}

/// 单个对象的投影搜索状态
///
/// 投影矩阵、视线方向与裁剪平面都已变换到对象局部空间。
#[derive(Debug, Clone)]
pub struct Nearest2d<'a> {
    access: MeshAccessor<'a>,
    obmat: Matrix4,
    /// 局部空间 → 裁剪空间
    pmat: Matrix4,
    viewport: Vector2,
    mval: Point2,
    ray_direction: Vector3,
    clip_planes: Vec<Vector4>,
    use_backface_culling: bool,
}

impl<'a> Nearest2d<'a> {
    /// 对象矩阵不可逆时返回 `None`
    pub fn new(ctx: &QueryContext, object: &SnapObject<'a>) -> Option<Self> {
        let imat = object.imat()?;
        // 平面以行向量左乘：n·(M p) + d = (Mᵀ n')·p
        let transpose = object.obmat.transpose();
        Some(Self {
            access: MeshAccessor::new(object.mesh),
            obmat: object.obmat,
            pmat: ctx.view_proj * object.obmat,
            viewport: ctx.viewport,
            mval: ctx.cursor,
            ray_direction: normalize_or_zero(&imat.transform_vector(&ctx.ray_direction)),
            clip_planes: ctx.clip_planes.iter().map(|plane| transpose * plane).collect(),
            use_backface_culling: ctx.config.use_backface_culling,
        })
    }

    /// 在裁剪平面负侧
    pub fn is_clipped(&self, co: &Point3) -> bool {
        self.clip_planes
            .iter()
            .any(|plane| plane.xyz().dot(&co.coords) + plane.w < 0.0)
    }

    fn project(&self, co: &Point3) -> Option<Point2> {
        project_to_screen(&self.pmat, &self.viewport, co)
    }

    fn clip_w(&self, co: &Point3) -> f64 {
        (self.pmat * co.to_homogeneous()).w
    }

    /// 局部空间点到光标的屏幕距离平方；被裁剪或在视点后方时为 `None`
    pub fn projected_dist_sq(&self, co: &Point3) -> Option<f64> {
        if self.is_clipped(co) {
            return None;
        }
        self.project(co).map(|p| (p - self.mval).norm_squared())
    }

    /// 包围盒投影到屏幕后到光标的距离平方下界
    ///
    /// 整个包围盒在某个裁剪平面负侧时返回 `None`；
    /// 有角点在视点后方时无法估计，返回0。
    pub fn aabb_dist_sq(&self, bounds: &Aabb3) -> Option<f64> {
        let corners = bounds.corners();
        for plane in &self.clip_planes {
            if corners
                .iter()
                .all(|c| plane.xyz().dot(&c.coords) + plane.w < 0.0)
            {
                return None;
            }
        }

        let mut min = Point2::new(f64::MAX, f64::MAX);
        let mut max = Point2::new(f64::MIN, f64::MIN);
        for corner in &corners {
            let Some(p) = self.project(corner) else {
                return Some(0.0);
            };
            min = min.inf(&p);
            max = max.sup(&p);
        }

        let dx = (min.x - self.mval.x).max(self.mval.x - max.x).max(0.0);
        let dy = (min.y - self.mval.y).max(self.mval.y - max.y).max(0.0);
        Some(dx * dx + dy * dy)
    }

    /// 网格包围盒是否可能在阈值内
    pub fn snap_boundbox(&self, bounds: &Aabb3, dist_px_sq: f64) -> bool {
        matches!(self.aabb_dist_sq(bounds), Some(d) if d < dist_px_sq)
    }

    /// 投影线段上离光标最近的点
    ///
    /// 返回 `(局部点, 屏幕距离平方, 三维参数 t)`。屏幕参数经透视校正换算为三维参数。
    fn edge_nearest(&self, a: &Point3, b: &Point3) -> Option<(Point3, f64, f64)> {
        let pa = self.project(a)?;
        let pb = self.project(b)?;
        let seg = pb - pa;
        let len_sq = seg.norm_squared();
        let u = if len_sq <= EPSILON {
            0.0
        } else {
            ((self.mval - pa).dot(&seg) / len_sq).clamp(0.0, 1.0)
        };

        let (wa, wb) = (self.clip_w(a), self.clip_w(b));
        let denom = (1.0 - u) * wb + u * wa;
        let t = if denom.abs() <= EPSILON {
            u
        } else {
            u * wa / denom
        };

        let co = a + (b - a) * t;
        let screen = pa + seg * u;
        Some((co, (screen - self.mval).norm_squared(), t))
    }

    /// 世界参考点到边的垂足（局部空间），必须严格落在边内
    fn perpendicular_foot(&self, a: &Point3, b: &Point3, reference: &Point3) -> Option<Point3> {
        let ga = self.obmat.transform_point(a);
        let gb = self.obmat.transform_point(b);
        let ab = gb - ga;
        let len_sq = ab.norm_squared();
        if len_sq <= EPSILON {
            return None;
        }
        let lambda = (reference - ga).dot(&ab) / len_sq;
        if lambda > 0.0 && lambda < 1.0 {
            // 仿射变换保持线段上的比例
            Some(a + (b - a) * lambda)
        } else {
            None
        }
    }

    pub fn snap_vert(&self, index: usize, best: &mut NearestCandidate) -> bool {
        let co = self.access.vert_co(index);
        match self.projected_dist_sq(co) {
            Some(d) => best.offer(SnapType::Vertex, index, d, *co, *self.access.vert_no(index)),
            None => false,
        }
    }

    pub fn snap_edge(
        &self,
        index: usize,
        policy: &EdgePolicy,
        best: &mut NearestCandidate,
    ) -> bool {
        let [a, b] = self.access.edge_co(index);
        if self.is_clipped(a) || self.is_clipped(b) {
            return false;
        }
        let no = a - b;

        let (co, d) = match policy {
            EdgePolicy::Nearest => match self.edge_nearest(a, b) {
                Some((co, d, _)) => (co, d),
                None => return false,
            },
            EdgePolicy::Midpoint => {
                let mid = nalgebra::center(a, b);
                match self.projected_dist_sq(&mid) {
                    Some(d) => (mid, d),
                    None => return false,
                }
            }
            EdgePolicy::Perpendicular(reference) => {
                let Some(foot) = self.perpendicular_foot(a, b, reference) else {
                    return false;
                };
                match self.projected_dist_sq(&foot) {
                    Some(d) => (foot, d),
                    None => return false,
                }
            }
        };
        best.offer(policy.snap_type(), index, d, co, no)
    }

    fn is_culled(&self, tri: usize) -> bool {
        self.use_backface_culling
            && !is_front_facing(&self.ray_direction, &self.access.tri_normal(tri))
    }

    /// 评估一个BVH叶子图元
    pub fn evaluate(&self, search: &ProjectedSearch, index: usize, best: &mut NearestCandidate) {
        match search {
            ProjectedSearch::Verts => {
                self.snap_vert(index, best);
            }
            ProjectedSearch::Edges(policy) => {
                self.snap_edge(index, policy, best);
            }
            ProjectedSearch::EdgeVerts => {
                for &v in self.access.edge_verts(index).iter().rev() {
                    if best.is(SnapType::Vertex, v) {
                        continue;
                    }
                    self.snap_vert(v, best);
                }
            }
            ProjectedSearch::TriVerts => {
                if self.is_culled(index) {
                    return;
                }
                for &v in self.access.tri_verts(index).iter().rev() {
                    if best.is(SnapType::Vertex, v) {
                        continue;
                    }
                    self.snap_vert(v, best);
                }
            }
            ProjectedSearch::TriEdges(policy) => {
                if self.is_culled(index) {
                    return;
                }
                for &e in self.access.tri_edges(index).iter().rev().flatten() {
                    if best.is(policy.snap_type(), e) {
                        continue;
                    }
                    self.snap_edge(e, policy, best);
                }
            }
        }
    }

    /// 在一棵BVH上搜索
    pub fn search(&self, tree: &Bvh, search: ProjectedSearch, best: &mut NearestCandidate) {
        let mut visitor = ProjectedVisitor {
            nearest: self,
            search: &search,
            best,
        };
        tree.find_nearest(&mut visitor);
    }

    /// 对已命中的边做细化：端点、中点或垂足
    ///
    /// 按光标在边上的参数 `t` 分区：请求的 {边, 顶点, 中点} 数为 `n` 时，
    /// `t < 1/(2n-1)` 或 `t > 1 - 1/(2n-1)` 尝试端点，中间区间尝试中点；
    /// 垂足独立尝试。各阶段从 `dist_px_sq_orig` 开始，后者必须优于前者。
    /// 全部失败时保留原来的边结果。
    pub fn snap_edge_points(
        &self,
        edge: &NearestCandidate,
        dist_px_sq_orig: f64,
        modes: SnapMode,
        reference: Option<Point3>,
    ) -> NearestCandidate {
        let Some(edge_index) = edge.index.filter(|_| edge.kind == Some(SnapType::Edge)) else {
            return edge.clone();
        };
        let [va, vb] = self.access.edge_verts(edge_index);
        let (a, b) = (self.access.vert_co(va), self.access.vert_co(vb));
        let Some((_, _, lambda)) = self.edge_nearest(a, b) else {
            return edge.clone();
        };

        let mut refined = NearestCandidate::new(dist_px_sq_orig);
        let e_mode_len = [SnapMode::EDGE, SnapMode::VERTEX, SnapMode::EDGE_MIDPOINT]
            .iter()
            .filter(|&&m| modes.contains(m))
            .count() as f64;
        let mut range = 1.0 / (2.0 * e_mode_len - 1.0);

        if modes.contains(SnapMode::VERTEX) && (lambda < range || 1.0 - range < lambda) {
            let v = if lambda < 0.5 { va } else { vb };
            self.snap_vert(v, &mut refined);
        }
        if modes.contains(SnapMode::EDGE_MIDPOINT) {
            range *= e_mode_len - 1.0;
            if range < lambda && lambda < 1.0 - range {
                self.snap_edge(edge_index, &EdgePolicy::Midpoint, &mut refined);
            }
        }
        if modes.contains(SnapMode::EDGE_PERPENDICULAR) {
            if let Some(reference) = reference {
                self.snap_edge(edge_index, &EdgePolicy::Perpendicular(reference), &mut refined);
            }
        }

        if refined.found() {
            refined
        } else {
            edge.clone()
        }
    }

    /// 在给定面的边（请求了边）或角点顶点上搜索
    pub fn snap_polygon(&self, face: usize, modes: SnapMode, best: &mut NearestCandidate) {
        let mesh = self.access.mesh();
        let corners = mesh.face_corners(face);
        if modes.contains(SnapMode::EDGE) {
            let corner_edges = mesh.corner_edges();
            for c in corners.rev() {
                self.snap_edge(corner_edges[c], &EdgePolicy::Nearest, best);
            }
        } else {
            let corner_verts = mesh.corner_verts();
            for c in corners.rev() {
                self.snap_vert(corner_verts[c], best);
            }
        }
    }
}

struct ProjectedVisitor<'n, 'a> {
    nearest: &'n Nearest2d<'a>,
    search: &'n ProjectedSearch,
    best: &'n mut NearestCandidate,
}

impl NearestVisitor for ProjectedVisitor<'_, '_> {
    fn node_dist_sq(&self, bounds: &Aabb3) -> Option<f64> {
        self.nearest.aabb_dist_sq(bounds)
    }

    fn best_dist_sq(&self) -> f64 {
        self.best.dist_sq
    }

    fn visit(&mut self, index: usize) {
        self.nearest.evaluate(self.search, index, self.best);
    }
}
