//! 求值网格
//!
//! 网格以扁平数组存储：
//! - 顶点位置与顶点法线
//! - 边（两个顶点索引）
//! - 面偏移（面 `f` 占用角点 `offsets[f]..offsets[f+1]`）
//! - 角点→顶点、角点→边（角点 `c` 的边连接 `c` 与面内下一个角点）
//! - 三角化结果（每个三角形由三个角点索引组成）及三角形→源面映射
//!
//! 捕捉查询只通过 [`MeshData`] 借用这些数组，不复制、不修改。

use crate::math::{normalize_or_zero, tri_normal_unnormalized, Aabb3, Point3, Vector3};
use std::collections::HashMap;
use std::ops::Range;
use thiserror::Error;

/// 网格构建/校验错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MeshError {
    #[error("Buffer length mismatch for {what}: expected {expected}, found {found}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Vertex index {index} out of range ({len} vertices)")]
    VertexOutOfRange { index: usize, len: usize },

    #[error("Edge index {index} out of range ({len} edges)")]
    EdgeOutOfRange { index: usize, len: usize },

    #[error("Corner index {index} out of range ({len} corners)")]
    CornerOutOfRange { index: usize, len: usize },

    #[error("Face index {index} out of range ({len} faces)")]
    FaceOutOfRange { index: usize, len: usize },

    #[error("Invalid face offsets: {0}")]
    FaceOffsets(String),

    #[error("Polygon {0} has fewer than 3 corners")]
    DegeneratePolygon(usize),
}

/// 构建网格所需的原始数组
#[derive(Debug, Clone, Default)]
pub struct MeshParts {
    pub positions: Vec<Point3>,
    pub vert_normals: Vec<Vector3>,
    pub edges: Vec<[usize; 2]>,
    pub face_offsets: Vec<usize>,
    pub corner_verts: Vec<usize>,
    pub corner_edges: Vec<usize>,
    pub tris: Vec<[usize; 3]>,
    pub tri_faces: Vec<usize>,
}

/// 拥有数据的求值网格
///
/// 只能通过校验后的构造函数创建，保证所有索引有效。
#[derive(Debug, Clone)]
pub struct Mesh {
    parts: MeshParts,
}

impl Mesh {
    /// 从原始数组创建网格并校验所有索引
    pub fn from_parts(mut parts: MeshParts) -> Result<Self, MeshError> {
        if parts.face_offsets.is_empty() {
            parts.face_offsets.push(0);
        }
        validate(&parts)?;
        Ok(Self { parts })
    }

    /// 从多边形列表构建网格
    ///
    /// 去重无向边、填充角点映射、对每个多边形做扇形三角化，
    /// 并计算面积加权的顶点法线。`loose_edges` 中与面边重复的会被合并。
    pub fn from_polygons(
        positions: Vec<Point3>,
        polygons: &[Vec<usize>],
        loose_edges: &[[usize; 2]],
    ) -> Result<Self, MeshError> {
        let verts_len = positions.len();
        let check_vert = |index: usize| {
            if index < verts_len {
                Ok(index)
            } else {
                Err(MeshError::VertexOutOfRange {
                    index,
                    len: verts_len,
                })
            }
        };

        let mut edges: Vec<[usize; 2]> = Vec::new();
        let mut edge_lookup: HashMap<(usize, usize), usize> = HashMap::new();
        let mut edge_index = |a: usize, b: usize, edges: &mut Vec<[usize; 2]>| {
            let key = (a.min(b), a.max(b));
            *edge_lookup.entry(key).or_insert_with(|| {
                edges.push([a, b]);
                edges.len() - 1
            })
        };

        let mut face_offsets = Vec::with_capacity(polygons.len() + 1);
        let mut corner_verts = Vec::new();
        let mut corner_edges = Vec::new();
        let mut tris = Vec::new();
        let mut tri_faces = Vec::new();
        face_offsets.push(0);

        for (face, polygon) in polygons.iter().enumerate() {
            if polygon.len() < 3 {
                return Err(MeshError::DegeneratePolygon(face));
            }
            let start = corner_verts.len();
            for (i, &v) in polygon.iter().enumerate() {
                let next = polygon[(i + 1) % polygon.len()];
                check_vert(v)?;
                check_vert(next)?;
                corner_verts.push(v);
                corner_edges.push(edge_index(v, next, &mut edges));
            }
            // 扇形三角化
            for i in 1..polygon.len() - 1 {
                tris.push([start, start + i, start + i + 1]);
                tri_faces.push(face);
            }
            face_offsets.push(corner_verts.len());
        }

        for &[a, b] in loose_edges {
            check_vert(a)?;
            check_vert(b)?;
            edge_index(a, b, &mut edges);
        }

        let mut vert_normals = vec![Vector3::zeros(); verts_len];
        for tri in &tris {
            let [a, b, c] = tri.map(|corner| corner_verts[corner]);
            let weighted = tri_normal_unnormalized(&positions[a], &positions[b], &positions[c]);
            for v in [a, b, c] {
                vert_normals[v] += weighted;
            }
        }
        for n in vert_normals.iter_mut() {
            *n = normalize_or_zero(n);
        }

        Self::from_parts(MeshParts {
            positions,
            vert_normals,
            edges,
            face_offsets,
            corner_verts,
            corner_edges,
            tris,
            tri_faces,
        })
    }

    /// 借用只读视图
    pub fn as_data(&self) -> MeshData<'_> {
        let p = &self.parts;
        MeshData {
            positions: &p.positions,
            vert_normals: &p.vert_normals,
            edges: &p.edges,
            face_offsets: &p.face_offsets,
            corner_verts: &p.corner_verts,
            corner_edges: &p.corner_edges,
            tris: &p.tris,
            tri_faces: &p.tri_faces,
        }
    }
}

fn validate(p: &MeshParts) -> Result<(), MeshError> {
    let verts_len = p.positions.len();
    let corners_len = p.corner_verts.len();
    let edges_len = p.edges.len();

    let expect_len = |what: &'static str, expected: usize, found: usize| {
        if expected == found {
            Ok(())
        } else {
            Err(MeshError::LengthMismatch {
                what,
                expected,
                found,
            })
        }
    };
    expect_len("vert_normals", verts_len, p.vert_normals.len())?;
    expect_len("corner_edges", corners_len, p.corner_edges.len())?;
    expect_len("tri_faces", p.tris.len(), p.tri_faces.len())?;

    for &v in p.edges.iter().flatten().chain(&p.corner_verts) {
        if v >= verts_len {
            return Err(MeshError::VertexOutOfRange {
                index: v,
                len: verts_len,
            });
        }
    }
    if let Some(&e) = p.corner_edges.iter().find(|&&e| e >= edges_len) {
        return Err(MeshError::EdgeOutOfRange {
            index: e,
            len: edges_len,
        });
    }

    let offsets = &p.face_offsets;
    if offsets[0] != 0 {
        return Err(MeshError::FaceOffsets("first offset must be 0".into()));
    }
    if offsets.windows(2).any(|w| w[0] > w[1]) {
        return Err(MeshError::FaceOffsets("offsets must be non-decreasing".into()));
    }
    if offsets[offsets.len() - 1] != corners_len {
        return Err(MeshError::FaceOffsets(format!(
            "last offset {} does not match {} corners",
            offsets[offsets.len() - 1],
            corners_len
        )));
    }

    if let Some(&c) = p.tris.iter().flatten().find(|&&c| c >= corners_len) {
        return Err(MeshError::CornerOutOfRange {
            index: c,
            len: corners_len,
        });
    }
    let faces_len = offsets.len() - 1;
    if let Some(&f) = p.tri_faces.iter().find(|&&f| f >= faces_len) {
        return Err(MeshError::FaceOutOfRange {
            index: f,
            len: faces_len,
        });
    }

    Ok(())
}

/// 网格的借用只读视图
///
/// 生命周期绑定到一次查询；由 [`Mesh::as_data`] 产生，索引均已校验。
#[derive(Debug, Clone, Copy)]
pub struct MeshData<'a> {
    positions: &'a [Point3],
    vert_normals: &'a [Vector3],
    edges: &'a [[usize; 2]],
    face_offsets: &'a [usize],
    corner_verts: &'a [usize],
    corner_edges: &'a [usize],
    tris: &'a [[usize; 3]],
    tri_faces: &'a [usize],
}

impl<'a> MeshData<'a> {
    pub fn positions(&self) -> &'a [Point3] {
        self.positions
    }

    pub fn vert_normals(&self) -> &'a [Vector3] {
        self.vert_normals
    }

    pub fn edges(&self) -> &'a [[usize; 2]] {
        self.edges
    }

    pub fn corner_verts(&self) -> &'a [usize] {
        self.corner_verts
    }

    pub fn corner_edges(&self) -> &'a [usize] {
        self.corner_edges
    }

    pub fn tris(&self) -> &'a [[usize; 3]] {
        self.tris
    }

    pub fn tri_faces(&self) -> &'a [usize] {
        self.tri_faces
    }

    pub fn verts_num(&self) -> usize {
        self.positions.len()
    }

    pub fn edges_num(&self) -> usize {
        self.edges.len()
    }

    pub fn faces_num(&self) -> usize {
        self.face_offsets.len().saturating_sub(1)
    }

    pub fn tris_num(&self) -> usize {
        self.tris.len()
    }

    /// 面的角点范围
    pub fn face_corners(&self, face: usize) -> Range<usize> {
        self.face_offsets[face]..self.face_offsets[face + 1]
    }

    /// 不属于任何面的边
    pub fn loose_edges(&self) -> Vec<usize> {
        let mut used = vec![false; self.edges.len()];
        for &e in self.corner_edges {
            used[e] = true;
        }
        (0..self.edges.len()).filter(|&e| !used[e]).collect()
    }

    /// 不属于任何边或面的顶点
    pub fn loose_verts(&self) -> Vec<usize> {
        let mut used = vec![false; self.positions.len()];
        for &v in self.edges.iter().flatten().chain(self.corner_verts) {
            used[v] = true;
        }
        (0..self.positions.len()).filter(|&v| !used[v]).collect()
    }

    /// 局部空间包围盒；空网格返回 `None`
    pub fn bounds(&self) -> Option<Aabb3> {
        if self.positions.is_empty() {
            None
        } else {
            Some(Aabb3::from_points(self.positions))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad_with_loose() -> Mesh {
        Mesh::from_polygons(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(1.0, 1.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
                Point3::new(3.0, 0.0, 0.0),
                Point3::new(5.0, 5.0, 5.0),
            ],
            &[vec![0, 1, 2, 3]],
            &[[1, 4], [0, 1]],
        )
        .unwrap()
    }

    #[test]
    fn test_from_polygons() {
        let mesh = quad_with_loose();
        let data = mesh.as_data();

        assert_eq!(data.faces_num(), 1);
        assert_eq!(data.tris_num(), 2);
        // 4条面边 + 1条松散边（[0,1] 与面边重复）
        assert_eq!(data.edges_num(), 5);
        assert_eq!(data.loose_edges(), vec![4]);
        assert_eq!(data.loose_verts(), vec![5]);
        assert_eq!(data.face_corners(0), 0..4);

        let n = data.vert_normals()[0];
        assert!((n.z - 1.0).abs() < 1e-9);
        assert_eq!(data.vert_normals()[5], Vector3::zeros());
    }

    #[test]
    fn test_validation() {
        let err = Mesh::from_polygons(vec![Point3::origin()], &[], &[[0, 3]]).unwrap_err();
        assert_eq!(err, MeshError::VertexOutOfRange { index: 3, len: 1 });

        let err = Mesh::from_polygons(vec![Point3::origin(); 3], &[vec![0, 1]], &[]).unwrap_err();
        assert_eq!(err, MeshError::DegeneratePolygon(0));

        let parts = MeshParts {
            positions: vec![Point3::origin(); 3],
            vert_normals: vec![Vector3::zeros(); 3],
            face_offsets: vec![0, 2],
            corner_verts: vec![0, 1, 2],
            corner_edges: vec![0, 0, 0],
            edges: vec![[0, 1]],
            ..Default::default()
        };
        assert!(matches!(
            Mesh::from_parts(parts),
            Err(MeshError::FaceOffsets(_))
        ));
    }

    #[test]
    fn test_empty_mesh() {
        let mesh = Mesh::from_parts(MeshParts::default()).unwrap();
        let data = mesh.as_data();
        assert_eq!(data.faces_num(), 0);
        assert!(data.bounds().is_none());
    }
}
