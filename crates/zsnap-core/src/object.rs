//! 捕捉候选对象

use serde::{Deserialize, Serialize};
use zsnap_mesh::cache::MeshId;
use zsnap_mesh::math::{Matrix3, Matrix4};
use zsnap_mesh::mesh::MeshData;

/// 对象唯一标识符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(pub u64);

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Object({})", self.0)
    }
}

/// 一个候选对象：世界矩阵 + 求值网格
#[derive(Debug, Clone, Copy)]
pub struct SnapObject<'a> {
    pub id: ObjectId,
    pub obmat: Matrix4,
    pub mesh_id: MeshId,
    pub mesh: MeshData<'a>,
}

impl<'a> SnapObject<'a> {
    pub fn new(id: ObjectId, obmat: Matrix4, mesh_id: MeshId, mesh: MeshData<'a>) -> Self {
        Self {
            id,
            obmat,
            mesh_id,
            mesh,
        }
    }

    /// 世界矩阵的逆；退化矩阵返回 `None`
    pub fn imat(&self) -> Option<Matrix4> {
        self.obmat.try_inverse()
    }
}

/// 法线从局部到世界的变换矩阵（逆转置）
pub fn normal_matrix(imat: &Matrix4) -> Matrix3 {
    imat.fixed_view::<3, 3>(0, 0).transpose()
}
