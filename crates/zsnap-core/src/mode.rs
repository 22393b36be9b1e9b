//! 捕捉模式
//!
//! - [`SnapType`]: 一次捕捉实际命中的单一类型
//! - [`SnapMode`]: 位域掩码，表示请求的或网格支持的捕捉类型集合

use serde::{Deserialize, Serialize};
use std::ops::{BitAnd, BitOr, BitOrAssign, Not};
use zsnap_mesh::mesh::MeshData;

/// 捕捉类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SnapType {
    /// 顶点捕捉
    Vertex,
    /// 边上最近点
    Edge,
    /// 边中点
    EdgeMidpoint,
    /// 垂足（相对参考点）
    EdgePerpendicular,
    /// 面（射线投射）
    Face,
    /// 表面最近点
    IndividualNearest,
}

impl SnapType {
    /// 获取捕捉类型的名称
    pub fn name(&self) -> &'static str {
        match self {
            SnapType::Vertex => "顶点",
            SnapType::Edge => "边",
            SnapType::EdgeMidpoint => "边中点",
            SnapType::EdgePerpendicular => "垂足",
            SnapType::Face => "面",
            SnapType::IndividualNearest => "表面最近点",
        }
    }

    /// 获取捕捉类型的快捷键
    pub fn shortcut(&self) -> &'static str {
        match self {
            SnapType::Vertex => "VER",
            SnapType::Edge => "EDG",
            SnapType::EdgeMidpoint => "MID",
            SnapType::EdgePerpendicular => "PER",
            SnapType::Face => "FAC",
            SnapType::IndividualNearest => "NEA",
        }
    }

    /// 优先级分组：顶点/边类 > 面 > 表面最近点
    pub fn priority(&self) -> u8 {
        match self {
            SnapType::Vertex
            | SnapType::Edge
            | SnapType::EdgeMidpoint
            | SnapType::EdgePerpendicular => 2,
            SnapType::Face => 1,
            SnapType::IndividualNearest => 0,
        }
    }
}

/// 捕捉掩码（位域）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SnapMode {
    bits: u8,
}

impl SnapMode {
    pub const NONE: SnapMode = SnapMode { bits: 0 };
    pub const VERTEX: SnapMode = SnapMode { bits: 1 << 0 };
    pub const EDGE: SnapMode = SnapMode { bits: 1 << 1 };
    pub const FACE: SnapMode = SnapMode { bits: 1 << 2 };
    pub const EDGE_MIDPOINT: SnapMode = SnapMode { bits: 1 << 3 };
    pub const EDGE_PERPENDICULAR: SnapMode = SnapMode { bits: 1 << 4 };
    pub const INDIVIDUAL_NEAREST: SnapMode = SnapMode { bits: 1 << 5 };

    /// 所有基于边的模式
    pub const EDGE_ALL: SnapMode = Self::EDGE
        .union(Self::EDGE_MIDPOINT)
        .union(Self::EDGE_PERPENDICULAR);
    /// 投影搜索处理的模式（边类 + 顶点）
    pub const GEOM: SnapMode = Self::EDGE_ALL.union(Self::VERTEX);
    pub const ALL: SnapMode = SnapMode { bits: 0x3F };

    /// 截断未定义的位
    pub const fn from_bits(bits: u8) -> Self {
        Self {
            bits: bits & Self::ALL.bits,
        }
    }

    pub const fn bits(&self) -> u8 {
        self.bits
    }

    pub const fn union(self, other: SnapMode) -> SnapMode {
        SnapMode {
            bits: self.bits | other.bits,
        }
    }

    pub const fn intersection(self, other: SnapMode) -> SnapMode {
        SnapMode {
            bits: self.bits & other.bits,
        }
    }

    pub const fn is_empty(&self) -> bool {
        self.bits == 0
    }

    /// 包含 `other` 的全部位
    pub const fn contains(&self, other: SnapMode) -> bool {
        self.bits & other.bits == other.bits && other.bits != 0
    }

    /// 与 `other` 至少有一位相同
    pub const fn intersects(&self, other: SnapMode) -> bool {
        self.bits & other.bits != 0
    }

    pub fn is_enabled(&self, snap_type: SnapType) -> bool {
        self.contains(snap_type.into())
    }

    pub fn set(&mut self, snap_type: SnapType, enabled: bool) {
        let bit = SnapMode::from(snap_type).bits;
        if enabled {
            self.bits |= bit;
        } else {
            self.bits &= !bit;
        }
    }

    /// 根据网格非空的元素数推导支持的模式
    pub fn supported_by(mesh: &MeshData) -> SnapMode {
        let mut supported = SnapMode::NONE;
        if mesh.faces_num() > 0 {
            supported |= SnapMode::FACE | SnapMode::INDIVIDUAL_NEAREST;
        }
        if mesh.edges_num() > 0 {
            supported |= SnapMode::EDGE_ALL;
        }
        if mesh.verts_num() > 0 {
            supported |= SnapMode::VERTEX;
        }
        supported
    }
}

impl From<SnapType> for SnapMode {
    fn from(snap_type: SnapType) -> Self {
        match snap_type {
            SnapType::Vertex => SnapMode::VERTEX,
            SnapType::Edge => SnapMode::EDGE,
            SnapType::EdgeMidpoint => SnapMode::EDGE_MIDPOINT,
            SnapType::EdgePerpendicular => SnapMode::EDGE_PERPENDICULAR,
            SnapType::Face => SnapMode::FACE,
            SnapType::IndividualNearest => SnapMode::INDIVIDUAL_NEAREST,
        }
    }
}

impl BitOr for SnapMode {
    type Output = SnapMode;

    fn bitor(self, rhs: SnapMode) -> SnapMode {
        self.union(rhs)
    }
}

impl BitOrAssign for SnapMode {
    fn bitor_assign(&mut self, rhs: SnapMode) {
        self.bits |= rhs.bits;
    }
}

impl BitAnd for SnapMode {
    type Output = SnapMode;

    fn bitand(self, rhs: SnapMode) -> SnapMode {
        self.intersection(rhs)
    }
}

impl Not for SnapMode {
    type Output = SnapMode;

    fn not(self) -> SnapMode {
        SnapMode::from_bits(!self.bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zsnap_mesh::math::Point3;
    use zsnap_mesh::mesh::Mesh;

    #[test]
    fn test_snap_mode() {
        let mut mode = SnapMode::VERTEX | SnapMode::EDGE;
        assert!(mode.is_enabled(SnapType::Vertex));
        assert!(!mode.is_enabled(SnapType::Face));
        assert!(mode.intersects(SnapMode::GEOM));
        assert!(!mode.contains(SnapMode::GEOM));

        mode.set(SnapType::Face, true);
        assert!(mode.contains(SnapMode::FACE));
        mode.set(SnapType::Vertex, false);
        assert_eq!(mode, SnapMode::EDGE | SnapMode::FACE);

        assert_eq!(!SnapMode::NONE, SnapMode::ALL);
        assert_eq!(SnapMode::from_bits(0xFF), SnapMode::ALL);
        assert!(!SnapMode::ALL.contains(SnapMode::NONE));
    }

    #[test]
    fn test_supported_by() {
        let loose =
            Mesh::from_polygons(vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0)], &[], &[[0, 1]])
                .unwrap();
        assert_eq!(SnapMode::supported_by(&loose.as_data()), SnapMode::GEOM);

        let tri = Mesh::from_polygons(
            vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0), Point3::new(0.0, 1.0, 0.0)],
            &[vec![0, 1, 2]],
            &[],
        )
        .unwrap();
        assert_eq!(SnapMode::supported_by(&tri.as_data()), SnapMode::ALL);

        let points = Mesh::from_polygons(vec![Point3::origin()], &[], &[]).unwrap();
        assert_eq!(SnapMode::supported_by(&points.as_data()), SnapMode::VERTEX);
    }
}
