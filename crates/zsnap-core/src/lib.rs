//! ZSNAP 捕捉核心
//!
//! 给定光标射线与屏幕位置，在候选对象的网格上寻找最佳捕捉目标
//! （顶点、边、边中点、垂足、面或表面最近点）。
//!
//! # 架构设计
//!
//! - `MeshAccessor`: 按图元索引读取几何，恢复三角形的存储边
//! - `raycast`: 局部空间射线投射，带远距离精度修正
//! - `Nearest2d`: 屏幕投影最近点搜索，支持裁剪平面与背面剔除
//! - `snap`: 按模式掩码调度各阶段，扫描结束后细化获胜的边
//! - `ResultState`: 跨对象单调收窄的结果
//!
//! # 示例
//!
//! ```rust
//! use zsnap_core::prelude::*;
//! use zsnap_mesh::prelude::*;
//!
//! let mesh = Mesh::from_polygons(
//!     vec![Point3::new(0.0, 0.0, 0.0), Point3::new(4.0, 0.0, 0.0), Point3::new(0.0, 4.0, 0.0)],
//!     &[vec![0, 1, 2]],
//!     &[],
//! ).unwrap();
//!
//! // 俯视正交相机，视口 200×200
//! let eye = Point3::new(0.0, 0.0, 10.0);
//! let view = Matrix4::look_at_rh(&eye, &Point3::origin(), &Vector3::y());
//! let proj = Matrix4::new_orthographic(-10.0, 10.0, -10.0, 10.0, 0.1, 100.0);
//! let viewport = Vector2::new(200.0, 200.0);
//! let cursor = Point2::new(101.0, 101.0);
//! let ctx = QueryContext::new(SnapConfig::default(), proj * view, viewport, cursor);
//!
//! let cache = BvhCache::new();
//! let objects = [SnapObject::new(ObjectId(1), Matrix4::identity(), MeshId(1), mesh.as_data())];
//! let mut result = ResultState::new(&ctx);
//!
//! assert_eq!(snap_objects(&ctx, &cache, &objects, &mut result), Some(SnapType::Vertex));
//! assert_eq!(result.index(), Some(0));
//! ```

pub mod accessor;
pub mod config;
pub mod context;
pub mod mode;
pub mod nearest2d;
pub mod object;
pub mod raycast;
pub mod result;
pub mod snap;
pub mod surface;

pub mod prelude {
    //! 常用类型的便捷导入
    pub use crate::accessor::MeshAccessor;
    pub use crate::config::{ConfigError, SnapConfig};
    pub use crate::context::QueryContext;
    pub use crate::mode::{SnapMode, SnapType};
    pub use crate::nearest2d::{EdgePolicy, Nearest2d, NearestCandidate, ProjectedSearch};
    pub use crate::object::{ObjectId, SnapObject};
    pub use crate::result::{HitDepth, ResultState, SnapCandidate, SnapMetric};
    pub use crate::snap::{
        refine_edge, snap_edge_or_vertex, snap_face, snap_nearest_on_surface, snap_object,
        snap_objects, snap_polygon,
    };
}
