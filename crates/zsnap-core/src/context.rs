//! 查询上下文
//!
//! 一次交互式捕捉查询（通常为一帧）内不变的输入：
//! 世界空间光标射线、投影矩阵、视口、光标位置、裁剪平面与参考点。

use crate::config::SnapConfig;
use zsnap_mesh::math::{Matrix4, Point2, Point3, Vector2, Vector3, Vector4, EPSILON};

/// 查询上下文
#[derive(Debug, Clone, PartialEq)]
pub struct QueryContext {
    pub config: SnapConfig,
    /// 世界空间射线原点
    pub ray_origin: Point3,
    /// 世界空间射线方向（单位向量）
    pub ray_direction: Vector3,
    /// 射线最大深度（世界单位）
    pub ray_depth_max: f64,
    /// 视图投影矩阵（世界 → 裁剪空间）
    pub view_proj: Matrix4,
    /// 视口尺寸（像素）
    pub viewport: Vector2,
    /// 光标位置（像素，原点在左下角）
    pub cursor: Point2,
    /// 世界空间裁剪平面，`n·p + d >= 0` 的点保留
    pub clip_planes: Vec<Vector4>,
    /// 上一个捕捉点，用于垂足与表面最近点
    pub curr_co: Option<Point3>,
    /// 变换起点，用于表面最近点的分步搜索
    pub init_co: Option<Point3>,
}

impl QueryContext {
    /// 创建上下文，射线由光标反投影得到
    pub fn new(config: SnapConfig, view_proj: Matrix4, viewport: Vector2, cursor: Point2) -> Self {
        let (ray_origin, ray_direction) = cursor_ray(&view_proj, &viewport, &cursor)
            .unwrap_or((Point3::origin(), -Vector3::z()));
        Self {
            config,
            ray_origin,
            ray_direction,
            ray_depth_max: f64::INFINITY,
            view_proj,
            viewport,
            cursor,
            clip_planes: Vec::new(),
            curr_co: None,
            init_co: None,
        }
    }

    /// 显式指定射线（方向会被归一化）
    pub fn with_ray(mut self, origin: Point3, direction: Vector3) -> Self {
        self.ray_origin = origin;
        self.ray_direction = direction.try_normalize(EPSILON).unwrap_or(direction);
        self
    }

    pub fn with_max_depth(mut self, depth: f64) -> Self {
        self.ray_depth_max = depth;
        self
    }

    pub fn with_clip_planes(mut self, planes: Vec<Vector4>) -> Self {
        self.clip_planes = planes;
        self
    }

    /// 设置上一个捕捉点
    pub fn with_reference(mut self, curr_co: Point3) -> Self {
        self.curr_co = Some(curr_co);
        self
    }

    pub fn with_init_point(mut self, init_co: Point3) -> Self {
        self.init_co = Some(init_co);
        self
    }

    /// 世界坐标投影到屏幕像素；在视点后方时返回 `None`
    pub fn project(&self, co: &Point3) -> Option<Point2> {
        project_to_screen(&self.view_proj, &self.viewport, co)
    }
}

/// 通过投影矩阵把点投影到屏幕像素
pub fn project_to_screen(pmat: &Matrix4, viewport: &Vector2, co: &Point3) -> Option<Point2> {
    let clip = pmat * co.to_homogeneous();
    if clip.w <= EPSILON {
        return None;
    }
    Some(Point2::new(
        (clip.x / clip.w + 1.0) * viewport.x * 0.5,
        (clip.y / clip.w + 1.0) * viewport.y * 0.5,
    ))
}

/// 从光标反投影出世界空间射线（近平面 → 远平面）
pub fn cursor_ray(
    view_proj: &Matrix4,
    viewport: &Vector2,
    cursor: &Point2,
) -> Option<(Point3, Vector3)> {
    let inv = view_proj.try_inverse()?;
    let ndc_x = cursor.x / (viewport.x * 0.5) - 1.0;
    let ndc_y = cursor.y / (viewport.y * 0.5) - 1.0;

    let near = Point3::from_homogeneous(inv * Vector4::new(ndc_x, ndc_y, -1.0, 1.0))?;
    let far = Point3::from_homogeneous(inv * Vector4::new(ndc_x, ndc_y, 1.0, 1.0))?;
    let direction = (far - near).try_normalize(EPSILON)?;
    Some((near, direction))
}
