//! 几何访问器
//!
//! 把求值网格的扁平缓冲区适配成按图元索引的统一查询。

use zsnap_mesh::math::{tri_normal_unnormalized, Point3, Vector3};
use zsnap_mesh::mesh::MeshData;

/// 按图元索引读取网格几何
#[derive(Debug, Clone, Copy)]
pub struct MeshAccessor<'a> {
    mesh: MeshData<'a>,
}

impl<'a> MeshAccessor<'a> {
    pub fn new(mesh: MeshData<'a>) -> Self {
        Self { mesh }
    }

    pub fn mesh(&self) -> &MeshData<'a> {
        &self.mesh
    }

    pub fn vert_co(&self, index: usize) -> &'a Point3 {
        &self.mesh.positions()[index]
    }

    pub fn vert_no(&self, index: usize) -> &'a Vector3 {
        &self.mesh.vert_normals()[index]
    }

    pub fn edge_verts(&self, index: usize) -> [usize; 2] {
        self.mesh.edges()[index]
    }

    pub fn edge_co(&self, index: usize) -> [&'a Point3; 2] {
        self.edge_verts(index).map(|v| self.vert_co(v))
    }

    pub fn tri_verts(&self, index: usize) -> [usize; 3] {
        let corner_verts = self.mesh.corner_verts();
        self.mesh.tris()[index].map(|corner| corner_verts[corner])
    }

    pub fn tri_co(&self, index: usize) -> [&'a Point3; 3] {
        self.tri_verts(index).map(|v| self.vert_co(v))
    }

    /// 三角形的非归一化法线
    pub fn tri_normal(&self, index: usize) -> Vector3 {
        let [a, b, c] = self.tri_co(index);
        tri_normal_unnormalized(a, b, c)
    }

    /// 三角形来源的面索引
    pub fn tri_face(&self, index: usize) -> usize {
        self.mesh.tri_faces()[index]
    }

    /// 三角形三条边对应的存储边
    ///
    /// 槽位 `j` 是角点 `j` 到角点 `j+1` 的边。三角化产生的对角线
    /// 在边表中没有对应，返回 `None`。
    pub fn tri_edges(&self, index: usize) -> [Option<usize>; 3] {
        let corner_verts = self.mesh.corner_verts();
        let corner_edges = self.mesh.corner_edges();
        let edges = self.mesh.edges();
        let tri = self.mesh.tris()[index];

        let mut result = [None; 3];
        for j in 0..3 {
            let j_next = (j + 1) % 3;
            let edge_index = corner_edges[tri[j]];
            let [e0, e1] = edges[edge_index];
            let pair = [corner_verts[tri[j]], corner_verts[tri[j_next]]];
            if pair.contains(&e0) && pair.contains(&e1) {
                result[j] = Some(edge_index);
            }
        }
        result
    }
}
