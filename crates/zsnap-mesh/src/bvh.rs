//! 包围体层次结构（BVH）
//!
//! 对固定的图元列表（三角形、松散边或松散顶点）构建二叉树，
//! 沿质心包围盒最长轴按中位数划分，叶子最多 [`LEAF_SIZE`] 个图元。
//!
//! 遍历均为深度优先，先访问更近的子节点（相等时先左）。
//! 图元级别的判定交给调用方的回调或访问器，树本身只负责剪枝。

use crate::math::{Aabb3, Point3, Ray, Vector3};
use crate::mesh::MeshData;
use serde::{Deserialize, Serialize};

/// 叶子节点的最大图元数
pub const LEAF_SIZE: usize = 4;

/// BVH 图元类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BvhKind {
    /// 三角化后的面
    Triangles,
    /// 不属于任何面的边
    LooseEdges,
    /// 不属于任何边或面的顶点
    LooseVerts,
}

#[derive(Debug, Clone)]
enum NodeContent {
    Leaf { start: usize, len: usize },
    Inner { left: usize, right: usize },
}

#[derive(Debug, Clone)]
struct BvhNode {
    bounds: Aabb3,
    content: NodeContent,
}

/// 射线命中记录
///
/// 投射前初始化为"未命中"（`index = None`, `dist = 最大深度`），
/// 回调只在找到更近的交点时就地更新，`dist` 单调递减。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub index: Option<usize>,
    pub dist: f64,
    pub co: Point3,
    pub no: Vector3,
}

impl RayHit {
    pub fn new(max_dist: f64) -> Self {
        Self {
            index: None,
            dist: max_dist,
            co: Point3::origin(),
            no: Vector3::zeros(),
        }
    }
}

/// 最近点搜索的访问器
///
/// 投影（屏幕空间）与欧氏最近点搜索共用同一遍历，区别只在节点距离的度量。
pub trait NearestVisitor {
    /// 节点包围盒到查询目标的距离平方下界；`None` 表示整个节点被排除
    fn node_dist_sq(&self, bounds: &Aabb3) -> Option<f64>;

    /// 当前最优距离平方
    fn best_dist_sq(&self) -> f64;

    /// 评估一个叶子图元，必要时更新最优结果
    fn visit(&mut self, index: usize);
}

/// 包围体层次结构
#[derive(Debug, Clone)]
pub struct Bvh {
    kind: BvhKind,
    nodes: Vec<BvhNode>,
    /// 叶子引用的网格图元索引
    items: Vec<usize>,
}

impl Bvh {
    /// 为网格的某类图元构建BVH；没有此类图元时返回 `None`
    pub fn build(kind: BvhKind, mesh: &MeshData) -> Option<Self> {
        let positions = mesh.positions();
        let primitives: Vec<(usize, Aabb3)> = match kind {
            BvhKind::Triangles => {
                let corner_verts = mesh.corner_verts();
                mesh.tris()
                    .iter()
                    .enumerate()
                    .map(|(i, tri)| {
                        let corners = tri.iter().map(|&c| &positions[corner_verts[c]]);
                        (i, Aabb3::from_points(corners))
                    })
                    .collect()
            }
            BvhKind::LooseEdges => {
                let edges = mesh.edges();
                mesh.loose_edges()
                    .into_iter()
                    .map(|e| {
                        let [a, b] = edges[e];
                        (e, Aabb3::from_points([&positions[a], &positions[b]]))
                    })
                    .collect()
            }
            BvhKind::LooseVerts => mesh
                .loose_verts()
                .into_iter()
                .map(|v| (v, Aabb3::new(positions[v], positions[v])))
                .collect(),
        };
        Self::from_primitives(kind, primitives)
    }

    /// 从 `(图元索引, 包围盒)` 列表构建
    pub fn from_primitives(kind: BvhKind, mut primitives: Vec<(usize, Aabb3)>) -> Option<Self> {
        if primitives.is_empty() {
            return None;
        }
        let mut bvh = Self {
            kind,
            nodes: Vec::with_capacity(2 * primitives.len() / LEAF_SIZE + 1),
            items: Vec::with_capacity(primitives.len()),
        };
        bvh.build_recursive(&mut primitives);
        Some(bvh)
    }

    fn build_recursive(&mut self, primitives: &mut [(usize, Aabb3)]) -> usize {
        let bounds = primitives
            .iter()
            .fold(Aabb3::empty(), |acc, (_, b)| acc.union(b));
        let node_index = self.nodes.len();

        if primitives.len() <= LEAF_SIZE {
            let start = self.items.len();
            self.items.extend(primitives.iter().map(|(i, _)| *i));
            self.nodes.push(BvhNode {
                bounds,
                content: NodeContent::Leaf {
                    start,
                    len: primitives.len(),
                },
            });
            return node_index;
        }

        let centroid_bounds = Aabb3::from_points(
            primitives
                .iter()
                .map(|(_, b)| b.center())
                .collect::<Vec<_>>()
                .iter(),
        );
        let axis = centroid_bounds.longest_axis();
        // 稳定排序 + 索引作为次键，保证构建结果确定
        primitives.sort_by(|(ia, a), (ib, b)| {
            a.center()[axis]
                .total_cmp(&b.center()[axis])
                .then(ia.cmp(ib))
        });

        // 先占位，子节点构建后回填
        self.nodes.push(BvhNode {
            bounds,
            content: NodeContent::Leaf { start: 0, len: 0 },
        });
        let mid = primitives.len() / 2;
        let (lo, hi) = primitives.split_at_mut(mid);
        let left = self.build_recursive(lo);
        let right = self.build_recursive(hi);
        self.nodes[node_index].content = NodeContent::Inner { left, right };
        node_index
    }

    pub fn kind(&self) -> BvhKind {
        self.kind
    }

    /// 图元数量
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// 根节点包围盒
    pub fn bounds(&self) -> Aabb3 {
        self.nodes[0].bounds
    }

    /// 树中的图元索引（按叶子顺序）
    pub fn primitives(&self) -> &[usize] {
        &self.items
    }

    /// 最近命中射线投射
    ///
    /// 对每个可能相交的叶子图元调用 `leaf(index, ray, hit)`，由回调决定是否更新 `hit`。
    /// 进入距离不小于当前 `hit.dist` 的节点被剪枝。返回最终命中的图元。
    pub fn ray_cast<F>(&self, ray: &Ray, hit: &mut RayHit, mut leaf: F) -> Option<usize>
    where
        F: FnMut(usize, &Ray, &mut RayHit),
    {
        let mut stack = vec![0];
        while let Some(node_index) = stack.pop() {
            let node = &self.nodes[node_index];
            match self.ray_entry(node_index, ray) {
                Some(entry) if entry < hit.dist => {}
                _ => continue,
            }
            match node.content {
                NodeContent::Leaf { start, len } => {
                    for &index in &self.items[start..start + len] {
                        leaf(index, ray, hit);
                    }
                }
                NodeContent::Inner { left, right } => {
                    let (near, far) = self.order_by_entry(left, right, ray);
                    stack.push(far);
                    stack.push(near);
                }
            }
        }
        hit.index
    }

    /// 全部命中射线投射
    ///
    /// 每个进入距离小于 `max_dist` 的叶子图元都会以一个全新的 `RayHit` 调用回调。
    pub fn ray_cast_all<F>(&self, ray: &Ray, max_dist: f64, mut leaf: F)
    where
        F: FnMut(usize, &Ray, &mut RayHit),
    {
        let mut stack = vec![0];
        while let Some(node_index) = stack.pop() {
            match self.ray_entry(node_index, ray) {
                Some(entry) if entry < max_dist => {}
                _ => continue,
            }
            match self.nodes[node_index].content {
                NodeContent::Leaf { start, len } => {
                    for &index in &self.items[start..start + len] {
                        let mut hit = RayHit::new(max_dist);
                        leaf(index, ray, &mut hit);
                    }
                }
                NodeContent::Inner { left, right } => {
                    let (near, far) = self.order_by_entry(left, right, ray);
                    stack.push(far);
                    stack.push(near);
                }
            }
        }
    }

    /// 最近图元搜索
    ///
    /// 节点距离下界不小于当前最优值时剪枝；先访问距离更小的子节点。
    pub fn find_nearest<V: NearestVisitor>(&self, visitor: &mut V) {
        if let Some(dist) = visitor.node_dist_sq(&self.nodes[0].bounds) {
            self.find_nearest_recursive(0, dist, visitor);
        }
    }

    fn find_nearest_recursive<V: NearestVisitor>(
        &self,
        node_index: usize,
        dist: f64,
        visitor: &mut V,
    ) {
        if dist >= visitor.best_dist_sq() {
            return;
        }
        match self.nodes[node_index].content {
            NodeContent::Leaf { start, len } => {
                for &index in &self.items[start..start + len] {
                    visitor.visit(index);
                }
            }
            NodeContent::Inner { left, right } => {
                let dl = visitor.node_dist_sq(&self.nodes[left].bounds);
                let dr = visitor.node_dist_sq(&self.nodes[right].bounds);
                match (dl, dr) {
                    (Some(dl), Some(dr)) if dr < dl => {
                        self.find_nearest_recursive(right, dr, visitor);
                        self.find_nearest_recursive(left, dl, visitor);
                    }
                    (dl, dr) => {
                        if let Some(dl) = dl {
                            self.find_nearest_recursive(left, dl, visitor);
                        }
                        if let Some(dr) = dr {
                            self.find_nearest_recursive(right, dr, visitor);
                        }
                    }
                }
            }
        }
    }

    fn ray_entry(&self, node_index: usize, ray: &Ray) -> Option<f64> {
        self.nodes[node_index]
            .bounds
            .ray_intersection(&ray.origin, &ray.direction)
            .map(|(t_enter, _)| t_enter.max(0.0))
    }

    /// 按射线进入距离排序两个子节点，返回 (近, 远)
    fn order_by_entry(&self, left: usize, right: usize, ray: &Ray) -> (usize, usize) {
        let dl = self.ray_entry(left, ray).unwrap_or(f64::INFINITY);
        let dr = self.ray_entry(right, ray).unwrap_or(f64::INFINITY);
        if dr < dl {
            (right, left)
        } else {
            (left, right)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::Mesh;

    /// 一排沿X轴分布的单位方块（每个两个三角形）
    fn strip(count: usize) -> Mesh {
        let mut positions = Vec::new();
        let mut polygons = Vec::new();
        for i in 0..count {
            let x = i as f64 * 2.0;
            let base = positions.len();
            positions.extend([
                Point3::new(x, 0.0, 0.0),
                Point3::new(x + 1.0, 0.0, 0.0),
                Point3::new(x + 1.0, 1.0, 0.0),
                Point3::new(x, 1.0, 0.0),
            ]);
            polygons.push(vec![base, base + 1, base + 2, base + 3]);
        }
        Mesh::from_polygons(positions, &polygons, &[]).unwrap()
    }

    struct PointVisitor<'a> {
        mesh: MeshData<'a>,
        point: Point3,
        best: (Option<usize>, f64),
        visited: usize,
    }

    impl NearestVisitor for PointVisitor<'_> {
        fn node_dist_sq(&self, bounds: &Aabb3) -> Option<f64> {
            Some(bounds.distance_sq_to_point(&self.point))
        }

        fn best_dist_sq(&self) -> f64 {
            self.best.1
        }

        fn visit(&mut self, index: usize) {
            self.visited += 1;
            let v = self.mesh.corner_verts()[self.mesh.tris()[index][0]];
            let d = (self.mesh.positions()[v] - self.point).norm_squared();
            if d < self.best.1 {
                self.best = (Some(index), d);
            }
        }
    }

    #[test]
    fn test_build() {
        let mesh = strip(10);
        let data = mesh.as_data();
        let bvh = Bvh::build(BvhKind::Triangles, &data).unwrap();

        assert_eq!(bvh.len(), 20);
        let mut sorted = bvh.primitives().to_vec();
        sorted.sort();
        assert_eq!(sorted, (0..20).collect::<Vec<_>>());
        assert!((bvh.bounds().max.x - 19.0).abs() < 1e-12);

        assert!(Bvh::build(BvhKind::LooseEdges, &data).is_none());
        assert!(Bvh::build(BvhKind::LooseVerts, &data).is_none());
    }

    #[test]
    fn test_ray_cast_prunes_far_nodes() {
        let mesh = strip(10);
        let data = mesh.as_data();
        let bvh = Bvh::build(BvhKind::Triangles, &data).unwrap();

        let ray = Ray::new(Point3::new(6.5, 0.5, 5.0), Vector3::new(0.0, 0.0, -1.0));
        let mut hit = RayHit::new(f64::INFINITY);
        let mut calls = 0;
        let index = bvh.ray_cast(&ray, &mut hit, |i, ray, hit| {
            calls += 1;
            let tri = data.tris()[i];
            let co: Vec<Point3> =
                tri.iter().map(|&c| data.positions()[data.corner_verts()[c]]).collect();
            let bounds = Aabb3::from_points(&co);
            if bounds.min.x <= ray.origin.x && ray.origin.x <= bounds.max.x && 5.0 < hit.dist {
                hit.index = Some(i);
                hit.dist = 5.0;
            }
        });

        assert!(index.is_some());
        assert_eq!(hit.dist, 5.0);
        assert!(calls < 20);
    }

    #[test]
    fn test_find_nearest() {
        let mesh = strip(16);
        let data = mesh.as_data();
        let bvh = Bvh::build(BvhKind::Triangles, &data).unwrap();

        let mut visitor = PointVisitor {
            mesh: data,
            point: Point3::new(20.2, 0.1, 0.0),
            best: (None, f64::MAX),
            visited: 0,
        };
        bvh.find_nearest(&mut visitor);

        let tri = visitor.best.0.unwrap();
        assert_eq!(data.tri_faces()[tri], 10);
        assert!(visitor.visited < 32);
    }

    #[test]
    fn test_loose_primitives() {
        let mesh = Mesh::from_polygons(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(4.0, 4.0, 4.0),
            ],
            &[],
            &[[0, 1]],
        )
        .unwrap();
        let data = mesh.as_data();

        let edges = Bvh::build(BvhKind::LooseEdges, &data).unwrap();
        assert_eq!(edges.primitives(), &[0]);
        let verts = Bvh::build(BvhKind::LooseVerts, &data).unwrap();
        assert_eq!(verts.primitives(), &[2]);
        assert!(Bvh::build(BvhKind::Triangles, &data).is_none());
    }
}
