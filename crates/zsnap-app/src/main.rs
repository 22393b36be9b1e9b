//! ZSNAP 命令行入口
//! 从JSON场景文件读取相机、光标与网格对象，运行一次捕捉查询并输出结果。
//! 可选的第二个参数是配置文件，覆盖场景中的捕捉配置。

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use zsnap_core::prelude::*;
use zsnap_mesh::prelude::*;

/// 场景文件
#[derive(Debug, Deserialize)]
struct Scene {
    #[serde(default)]
    config: SnapConfig,
    camera: Camera,
    viewport: [f64; 2],
    cursor: [f64; 2],
    #[serde(default)]
    clip_planes: Vec<[f64; 4]>,
    /// 上一个捕捉点
    #[serde(default)]
    reference: Option<[f64; 3]>,
    /// 表面最近点的起点
    #[serde(default)]
    init_point: Option<[f64; 3]>,
    meshes: Vec<MeshDesc>,
    objects: Vec<ObjectDesc>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Projection {
    Orthographic { half_height: f64 },
    Perspective { fovy_deg: f64 },
}

#[derive(Debug, Deserialize)]
struct Camera {
    eye: [f64; 3],
    target: [f64; 3],
    #[serde(default = "default_up")]
    up: [f64; 3],
    projection: Projection,
    #[serde(default = "default_near")]
    near: f64,
    #[serde(default = "default_far")]
    far: f64,
}

fn default_up() -> [f64; 3] {
    [0.0, 1.0, 0.0]
}

fn default_near() -> f64 {
    0.1
}

fn default_far() -> f64 {
    1000.0
}

fn default_scale() -> [f64; 3] {
    [1.0, 1.0, 1.0]
}

/// 网格描述：经 `Mesh::from_polygons` 构建并校验
#[derive(Debug, Deserialize)]
struct MeshDesc {
    id: u64,
    positions: Vec<[f64; 3]>,
    #[serde(default)]
    polygons: Vec<Vec<usize>>,
    #[serde(default)]
    loose_edges: Vec<[usize; 2]>,
}

#[derive(Debug, Deserialize)]
struct ObjectDesc {
    id: u64,
    mesh: u64,
    #[serde(default)]
    translation: [f64; 3],
    #[serde(default = "default_scale")]
    scale: [f64; 3],
}

/// 输出报告
#[derive(Debug, Serialize)]
struct Report {
    kind: Option<SnapType>,
    shortcut: Option<&'static str>,
    object: Option<ObjectId>,
    index: Option<usize>,
    location: Option<Point3>,
    normal: Option<Vector3>,
    dist_px: Option<f64>,
    depth: Option<f64>,
    hits: Vec<HitDepth>,
}

impl Camera {
    fn view_proj(&self, viewport: &Vector2) -> Result<Matrix4> {
        if viewport.x <= 0.0 || viewport.y <= 0.0 {
            bail!("Invalid viewport size: {}x{}", viewport.x, viewport.y);
        }
        let aspect = viewport.x / viewport.y;
        let view = Matrix4::look_at_rh(
            &Point3::from(self.eye),
            &Point3::from(self.target),
            &Vector3::from(self.up),
        );
        let proj = match self.projection {
            Projection::Orthographic { half_height } => {
                let half_width = half_height * aspect;
                Matrix4::new_orthographic(
                    -half_width,
                    half_width,
                    -half_height,
                    half_height,
                    self.near,
                    self.far,
                )
            }
            Projection::Perspective { fovy_deg } => {
                Matrix4::new_perspective(aspect, fovy_deg.to_radians(), self.near, self.far)
            }
        };
        Ok(proj * view)
    }
}

impl Scene {
    fn load(path: &str) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scene {}", path))?;
        let scene: Scene = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse scene {}", path))?;
        scene.config.validate()?;
        Ok(scene)
    }

    /// 用配置文件替换场景内的捕捉配置
    fn override_config(&mut self, path: &str) -> Result<()> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path))?;
        self.config = SnapConfig::from_json(&text)
            .with_context(|| format!("Invalid config {}", path))?;
        info!("Config overridden by {}", path);
        Ok(())
    }

    fn context(&self) -> Result<QueryContext> {
        let viewport = Vector2::from(self.viewport);
        let view_proj = self.camera.view_proj(&viewport)?;
        let cursor = Point2::from(self.cursor);
        let mut ctx = QueryContext::new(self.config.clone(), view_proj, viewport, cursor)
            .with_clip_planes(self.clip_planes.iter().map(|&p| Vector4::from(p)).collect());
        if let Some(reference) = self.reference {
            ctx = ctx.with_reference(Point3::from(reference));
        }
        if let Some(init) = self.init_point {
            ctx = ctx.with_init_point(Point3::from(init));
        }
        Ok(ctx)
    }

    fn build_meshes(&self) -> Result<HashMap<u64, Mesh>> {
        let mut meshes = HashMap::with_capacity(self.meshes.len());
        for desc in &self.meshes {
            let positions = desc.positions.iter().map(|&p| Point3::from(p)).collect();
            let mesh = Mesh::from_polygons(positions, &desc.polygons, &desc.loose_edges)
                .with_context(|| format!("Invalid mesh {}", desc.id))?;
            if meshes.insert(desc.id, mesh).is_some() {
                bail!("Duplicate mesh id {}", desc.id);
            }
        }
        Ok(meshes)
    }
}

fn main() -> Result<()> {
    // 初始化日志
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut args = std::env::args().skip(1);
    let Some(path) = args.next() else {
        bail!("Usage: zsnap <scene.json> [config.json]");
    };

    let mut scene = Scene::load(&path)?;
    if let Some(config_path) = args.next() {
        scene.override_config(&config_path)?;
    }
    let meshes = scene.build_meshes()?;
    let ctx = scene.context()?;
    info!(
        "Loaded {} meshes, {} objects, cursor ({}, {})",
        meshes.len(),
        scene.objects.len(),
        ctx.cursor.x,
        ctx.cursor.y
    );

    let mut objects = Vec::with_capacity(scene.objects.len());
    for desc in &scene.objects {
        let Some(mesh) = meshes.get(&desc.mesh) else {
            bail!("Object {} references unknown mesh {}", desc.id, desc.mesh);
        };
        let obmat = Matrix4::new_translation(&Vector3::from(desc.translation))
            * Matrix4::new_nonuniform_scaling(&Vector3::from(desc.scale));
        objects.push(SnapObject::new(ObjectId(desc.id), obmat, MeshId(desc.mesh), mesh.as_data()));
    }

    let cache = BvhCache::new();
    let mut result = ResultState::new(&ctx);
    let kind = snap_objects(&ctx, &cache, &objects, &mut result);

    match kind {
        Some(kind) => info!(
            "Snapped to {} [{}] on {:?}, location ({:.4}, {:.4}, {:.4})",
            kind.name(),
            kind.shortcut(),
            result.object(),
            result.location().x,
            result.location().y,
            result.location().z
        ),
        None => info!("No snap target within {} px", ctx.config.radius_px),
    }

    let found = kind.is_some();
    let report = Report {
        kind,
        shortcut: kind.map(|k| k.shortcut()),
        object: result.object(),
        index: result.index(),
        location: found.then(|| result.location()),
        normal: found.then(|| result.normal()),
        dist_px: kind
            .filter(|k| k.priority() == SnapType::Vertex.priority())
            .map(|_| result.dist_px_sq().sqrt()),
        depth: (kind == Some(SnapType::Face)).then(|| result.ray_depth_max()),
        hits: result.hit_list().map(<[HitDepth]>::to_vec).unwrap_or_default(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
