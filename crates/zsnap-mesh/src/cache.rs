//! BVH 缓存
//!
//! 以 `(网格ID, 图元类型)` 为键，惰性构建并共享只读的 BVH。
//! 查询期间返回的树不会被修改或释放；网格变化时由调用方调用 `invalidate`。

use crate::bvh::{Bvh, BvhKind};
use crate::mesh::MeshData;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// 网格唯一标识符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MeshId(pub u64);

impl std::fmt::Display for MeshId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Mesh({})", self.0)
    }
}

/// 线程安全的 BVH 缓存
///
/// "没有此类图元"（`None`）同样会被缓存，避免重复扫描网格。
#[derive(Debug, Default)]
pub struct BvhCache {
    trees: RwLock<HashMap<(MeshId, BvhKind), Option<Arc<Bvh>>>>,
}

impl BvhCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取或构建指定网格、指定类型的 BVH
    pub fn get_or_build(
        &self,
        mesh_id: MeshId,
        kind: BvhKind,
        mesh: &MeshData,
    ) -> Option<Arc<Bvh>> {
        if let Some(entry) = self.get(mesh_id, kind) {
            return entry;
        }

        let tree = Bvh::build(kind, mesh).map(Arc::new);
        tracing::debug!(
            "Built {:?} BVH for {} ({} primitives)",
            kind,
            mesh_id,
            tree.as_ref().map_or(0, |t| t.len())
        );

        // 其他线程可能已抢先构建，以先写入者为准
        self.trees
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry((mesh_id, kind))
            .or_insert(tree)
            .clone()
    }

    /// 查看已缓存的条目，不触发构建
    pub fn get(&self, mesh_id: MeshId, kind: BvhKind) -> Option<Option<Arc<Bvh>>> {
        self.trees
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(mesh_id, kind))
            .cloned()
    }

    /// 移除某个网格的全部缓存
    pub fn invalidate(&self, mesh_id: MeshId) {
        self.trees
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(id, _), _| *id != mesh_id);
    }

    pub fn clear(&self) {
        self.trees
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// 缓存条目数
    pub fn len(&self) -> usize {
        self.trees.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Point3;
    use crate::mesh::Mesh;

    #[test]
    fn test_get_or_build() {
        let mesh = Mesh::from_polygons(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
            ],
            &[vec![0, 1, 2]],
            &[],
        )
        .unwrap();
        let data = mesh.as_data();
        let cache = BvhCache::new();
        let id = MeshId(7);

        let a = cache.get_or_build(id, BvhKind::Triangles, &data).unwrap();
        let b = cache.get_or_build(id, BvhKind::Triangles, &data).unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        assert!(cache.get_or_build(id, BvhKind::LooseEdges, &data).is_none());
        assert!(matches!(cache.get(id, BvhKind::LooseEdges), Some(None)));
        assert_eq!(cache.len(), 2);

        cache.invalidate(id);
        assert!(cache.is_empty());
    }
}
