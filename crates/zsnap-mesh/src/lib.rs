//! ZSNAP 网格数据
//!
//! 为捕捉核心提供求值后的网格数据与加速结构：
//! - `Mesh` / `MeshData`: 扁平几何缓冲区及其借用视图
//! - `Bvh`: 三角形、松散边、松散顶点的包围体层次结构
//! - `BvhCache`: 按网格与图元类型缓存的 BVH
//!
//! # 示例
//!
//! ```rust
//! use zsnap_mesh::prelude::*;
//!
//! let mesh = Mesh::from_polygons(
//!     vec![Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0), Point3::new(0.0, 1.0, 0.0)],
//!     &[vec![0, 1, 2]],
//!     &[],
//! ).unwrap();
//!
//! let cache = BvhCache::new();
//! let tree = cache.get_or_build(MeshId(1), BvhKind::Triangles, &mesh.as_data());
//! assert!(tree.is_some());
//! ```

pub mod bvh;
pub mod cache;
pub mod math;
pub mod mesh;

pub mod prelude {
    //! 常用类型的便捷导入
    pub use crate::bvh::{Bvh, BvhKind, NearestVisitor, RayHit};
    pub use crate::cache::{BvhCache, MeshId};
    pub use crate::math::{
        Aabb3, Matrix3, Matrix4, Point2, Point3, Ray, Vector2, Vector3, Vector4, EPSILON,
    };
    pub use crate::mesh::{Mesh, MeshData, MeshError, MeshParts};
}
