//! 弹球桌描述
//!
//! 宿主加载桌面数据后，以这些结构描述每个物体的几何和材质。
//! 所有长度单位为毫米，角度单位为度。

mod mesh;

pub use mesh::{combine_meshes, TriangleList};

use glam::{Mat4, Quat, Vec3};

/// 可渲染网格（子网格）
#[derive(Clone, Debug, Default)]
pub struct MeshData {
    pub vertices: Vec<Vec3>,
    /// 三角形索引，每 3 个一组
    pub indices: Vec<u32>,
    /// 子网格相对于所属物体的局部变换（TRS）
    pub transform: Mat4,
}

impl MeshData {
    pub fn new(vertices: Vec<Vec3>, indices: Vec<u32>) -> Self {
        Self {
            vertices,
            indices,
            transform: Mat4::IDENTITY,
        }
    }

    pub fn with_transform(mut self, transform: Mat4) -> Self {
        self.transform = transform;
        self
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// 顶点包围盒尺寸（网格自身空间）
    pub fn bounds_size(&self) -> Vec3 {
        let mut iter = self.vertices.iter();
        let Some(first) = iter.next() else {
            return Vec3::ZERO;
        };
        let (min, max) = iter.fold((*first, *first), |(min, max), v| (min.min(*v), max.max(*v)));
        max - min
    }
}

/// 挡板数据
#[derive(Clone, Debug)]
pub struct FlipperData {
    pub name: String,
    pub mass: f32,
    pub base_radius: f32,
    pub end_radius: f32,
    pub height: f32,
    /// 挡板臂长
    pub flipper_radius: f32,
    /// 起始角（度）
    pub start_angle: f32,
    /// 终止角（度）
    pub end_angle: f32,
    pub friction: f32,
    pub elasticity: f32,
    /// 桌面局部位置
    pub position: Vec3,
    /// 桌面局部旋转
    pub rotation: Quat,
}

impl Default for FlipperData {
    fn default() -> Self {
        Self {
            name: String::from("Flipper"),
            mass: 1.0,
            base_radius: 21.5,
            end_radius: 13.0,
            height: 50.0,
            flipper_radius: 130.0,
            start_angle: 121.0,
            end_angle: 70.0,
            friction: 0.1,
            elasticity: 0.8,
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }
}

/// 闸门数据
#[derive(Clone, Debug)]
pub struct GateData {
    pub name: String,
    pub friction: f32,
    pub elasticity: f32,
    pub damping: f32,
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    /// 闸门下的导线网格；必须恰好一个
    pub wires: Vec<MeshData>,
}

impl Default for GateData {
    fn default() -> Self {
        Self {
            name: String::from("Gate"),
            friction: 0.02,
            elasticity: 0.3,
            damping: 0.985,
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            wires: Vec::new(),
        }
    }
}

/// 静态物体（墙、橡胶、图元）
#[derive(Clone, Debug, Default)]
pub struct StaticSource {
    pub name: String,
    pub is_collidable: bool,
    pub friction: f32,
    pub elasticity: f32,
    /// 物体在桌面局部空间的变换
    pub transform: Mat4,
    pub meshes: Vec<MeshData>,
}

/// 台面
#[derive(Clone, Debug)]
pub struct PlayfieldData {
    pub width: f32,
    pub height: f32,
    /// 台面板厚度
    pub thickness: f32,
    pub friction: f32,
    pub elasticity: f32,
}

impl Default for PlayfieldData {
    fn default() -> Self {
        Self {
            width: 1000.0,
            height: 2000.0,
            thickness: 50.0,
            friction: 0.075,
            elasticity: 0.25,
        }
    }
}

/// 整张桌子
#[derive(Clone, Debug, Default)]
pub struct TableDescription {
    pub name: String,
    /// 桌面局部 -> 世界
    pub local_to_world: Mat4,
    pub playfield: PlayfieldData,
    pub flippers: Vec<FlipperData>,
    pub gates: Vec<GateData>,
    pub statics: Vec<StaticSource>,
}

impl TableDescription {
    /// 世界 -> 桌面局部
    pub fn world_to_local(&self) -> Mat4 {
        self.local_to_world.inverse()
    }
}

/// 生成球的请求
#[derive(Clone, Copy, Debug)]
pub struct BallSpawn {
    pub world_position: Vec3,
    pub local_position: Vec3,
    pub local_velocity: Vec3,
    pub scale: f32,
    pub mass: f32,
    pub radius: f32,
}

impl Default for BallSpawn {
    fn default() -> Self {
        Self {
            world_position: Vec3::ZERO,
            local_position: Vec3::ZERO,
            local_velocity: Vec3::ZERO,
            scale: 1.0,
            mass: 1.0,
            radius: 25.0,
        }
    }
}
