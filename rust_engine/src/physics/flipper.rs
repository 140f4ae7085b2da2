//! 挡板（flipper）
//!
//! 形状：两个 Z 向圆柱（根部、端部）+ 一到两个有向盒子近似锥形轮廓。
//! 约束：绕局部 Z 轴的铰链，限制在起始角与终止角之间。
//! 驱动：每个物理步根据电磁线圈状态施加扭矩，接近行程末端时减小力度。

use std::collections::BTreeMap;
use std::f32::consts::FRAC_PI_2;

use glam::{Mat4, Quat, Vec2, Vec3};
use rapier3d::prelude::*;

use super::body::{BodyId, BodyKind, HingeParams, PhyBody};
use super::config::PhysicsConfig;
use super::registration::EntityId;
use crate::math::{mat4_to_isometry, pose_matrix};
use crate::table::FlipperData;
use crate::{PhysicsError, Result};

/// 扭矩单位补偿系数。改变它会改变挡板手感。
pub const TORQUE_SCALE: f32 = 1e7;

/// 挡板质量相对桌面数据的倍数
const MASS_SCALE: f32 = 3.0;

/// 电磁线圈状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SolenoidState {
    /// 断电，挡板回落（-1）
    #[default]
    Retracting,
    /// 不施加扭矩（0）
    Idle,
    /// 通电，挡板抬起（+1）
    Firing,
}

impl SolenoidState {
    pub fn sign(self) -> f32 {
        match self {
            SolenoidState::Retracting => -1.0,
            SolenoidState::Idle => 0.0,
            SolenoidState::Firing => 1.0,
        }
    }
}

/// 挡板驱动参数（来自配置，可在运行时调整）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlipperTuning {
    pub acceleration: f32,
    pub mass_multiplier_log: f32,
    pub off_scale: f32,
    pub near_end_scale: f32,
    pub degrees_near_end: f32,
}

impl FlipperTuning {
    pub fn from_config(config: &PhysicsConfig) -> Self {
        Self {
            acceleration: config.flipper_acceleration,
            mass_multiplier_log: config.flipper_mass_multiplier_log,
            off_scale: config.flipper_solenoid_off_acceleration_scale,
            near_end_scale: config.flipper_on_near_end_acceleration_scale,
            degrees_near_end: config.flipper_number_of_degree_near_end,
        }
    }
}

/// 挡板的专有状态
#[derive(Debug, Clone, PartialEq)]
pub struct FlipperState {
    /// 旋转方向：起始角大于终止角时为 -1，否则为 +1
    pub rotation_direction: f32,
    /// 起始角（弧度）
    pub start_angle: f32,
    /// 终止角（弧度）
    pub end_angle: f32,
    pub height: f32,
    pub solenoid: SolenoidState,
    /// 基础质量（桌面数据质量 * 3）
    pub base_mass: f32,
    /// 当前使用的质量（基础质量 * 倍率）
    used_mass: f32,
    /// 上一次的质量倍率，初始为 MAX 保证第一步一定会设置质量
    prev_multiplier: f32,
    /// 惯量重新计算次数
    inertia_updates: u32,
}

impl FlipperState {
    pub fn new(data: &FlipperData) -> Self {
        let base_mass = data.mass * MASS_SCALE;
        Self {
            rotation_direction: if data.start_angle > data.end_angle { -1.0 } else { 1.0 },
            start_angle: data.start_angle.to_radians(),
            end_angle: data.end_angle.to_radians(),
            height: data.height,
            solenoid: SolenoidState::Idle,
            base_mass,
            used_mass: base_mass,
            prev_multiplier: f32::MAX,
            inertia_updates: 0,
        }
    }

    pub fn used_mass(&self) -> f32 {
        self.used_mass
    }

    pub fn inertia_updates(&self) -> u32 {
        self.inertia_updates
    }

    /// 行程（度）
    pub fn max_angle_degrees(&self) -> f32 {
        (self.start_angle - self.end_angle).abs().to_degrees()
    }

    /// 铰链限制 [min, max]（弧度）
    pub fn limits(&self) -> [f32; 2] {
        if self.rotation_direction > 0.0 {
            [self.start_angle, self.end_angle]
        } else {
            [self.end_angle, self.start_angle]
        }
    }

    /// 由铰链角度得到相对起始位置的摆动角（度）
    pub fn swing_degrees(&self, hinge_angle: f32) -> f32 {
        (hinge_angle - self.start_angle).abs().to_degrees()
    }

    /// 质量倍率变化时更新使用的质量，返回新的质量；未变化返回 None
    pub fn update_mass(&mut self, mass_multiplier_log: f32) -> Option<f32> {
        let multiplier = 10.0f32.powf(mass_multiplier_log);
        if multiplier == self.prev_multiplier {
            return None;
        }
        self.prev_multiplier = multiplier;
        self.used_mass = self.base_mass * multiplier;
        self.inertia_updates += 1;
        Some(self.used_mass)
    }

    /// 绕铰链轴的扭矩（带符号）
    ///
    /// `swing` 是当前摆动角（度）。
    pub fn torque(&self, swing: f32, tuning: &FlipperTuning) -> f32 {
        let max_angle = self.max_angle_degrees();
        let mut on_force = tuning.acceleration;
        let mut off_force = on_force * tuning.off_scale;

        if swing > max_angle - tuning.degrees_near_end && self.solenoid == SolenoidState::Firing {
            on_force *= tuning.near_end_scale;
        }
        if swing < tuning.degrees_near_end && self.solenoid == SolenoidState::Retracting {
            off_force *= tuning.near_end_scale;
        }

        let m = self.used_mass * TORQUE_SCALE;
        match self.solenoid {
            SolenoidState::Firing => self.rotation_direction * on_force * m,
            SolenoidState::Retracting => -self.rotation_direction * off_force * m,
            SolenoidState::Idle => 0.0,
        }
    }
}

/// 由实体 ID 查找挡板
///
/// 由物理世界持有；只在注册时写入，每步驱动和外部命令时读取。
#[derive(Debug, Default, Clone)]
pub struct FlipperRegistry {
    flippers: BTreeMap<EntityId, BodyId>,
}

impl FlipperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entity: EntityId, body: BodyId) {
        self.flippers.insert(entity, body);
    }

    pub fn get(&self, entity: EntityId) -> Result<BodyId> {
        self.flippers
            .get(&entity)
            .copied()
            .ok_or(PhysicsError::UnknownEntity(entity))
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.flippers.contains_key(&entity)
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityId, BodyId)> + '_ {
        self.flippers.iter().map(|(e, b)| (*e, *b))
    }

    pub fn len(&self) -> usize {
        self.flippers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flippers.is_empty()
    }

    pub fn clear(&mut self) {
        self.flippers.clear();
    }
}

/// 调试用挡板状态
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlipperDebugState {
    pub entity: EntityId,
    /// 摆动角（度）
    pub angle: f32,
    pub solenoid_on: bool,
}

/// 创建挡板刚体
pub fn build_flipper(data: &FlipperData, config: &PhysicsConfig) -> PhyBody {
    let state = FlipperState::new(data);
    let base_mass = state.base_mass;
    let hinge = HingeParams {
        pivot: Vec3::new(0.0, 0.0, data.height * 0.5),
        axis: Vec3::Z,
        reference_angle: state.start_angle,
        limits: Some(state.limits()),
    };

    let shape = flipper_shape(data, config.flipper_front_box_only);
    let mut body = PhyBody::new(data.name.clone(), BodyKind::Flipper(state), shape, data.mass);
    body.set_properties(base_mass, data.friction, data.elasticity * config.elasticity_scale);
    body.disable_sleeping();
    body.set_hinge(hinge);
    body.set_matrix(pose_matrix(data.position, data.rotation));
    body
}

/// 挡板复合形状
///
/// 复合形状里不能放三角网格，所以用一到两个盒子填充两个圆柱之间的部分。
pub fn flipper_shape(data: &FlipperData, front_only: bool) -> SharedShape {
    let r1 = data.base_radius;
    let r2 = data.end_radius;
    let l = data.flipper_radius;
    let hh = data.height * 0.5;

    // Rapier 的圆柱沿 Y 轴，绕 X 转 90° 变为沿 Z 轴
    let to_z = Quat::from_rotation_x(FRAC_PI_2);
    let mut shapes = vec![
        (
            mat4_to_isometry(Mat4::from_rotation_translation(to_z, Vec3::new(0.0, 0.0, hh))),
            SharedShape::cylinder(hh, r1),
        ),
        (
            mat4_to_isometry(Mat4::from_rotation_translation(to_z, Vec3::new(0.0, -l, hh))),
            SharedShape::cylinder(hh, r2),
        ),
    ];

    let half_box_length = Vec2::new(l, r1 - r2).length() * 0.5;
    let n = Vec3::new(l, r1 - r2, 0.0).normalize_or_zero();
    let beg = Vec3::new(0.0, 0.0, hh) + n * (r1 - r2);
    let beg2 = Vec3::new(-beg.x, beg.y, beg.z);
    let end = Vec3::new(0.0, -l, hh);
    let angle = n.y.atan2(n.x);
    let half_width = r1.min(r2);

    let reversed = data.start_angle < 0.0 || data.start_angle > 180.0;

    if !front_only || reversed {
        shapes.push((
            mat4_to_isometry(Mat4::from_rotation_translation(
                Quat::from_rotation_z(-angle),
                (beg + end) * 0.5,
            )),
            SharedShape::cuboid(half_width, half_box_length, hh),
        ));
    }
    if !front_only || !reversed {
        shapes.push((
            mat4_to_isometry(Mat4::from_rotation_translation(
                Quat::from_rotation_z(angle),
                (beg2 + end) * 0.5,
            )),
            SharedShape::cuboid(half_width, half_box_length, hh),
        ));
    }

    SharedShape::compound(shapes)
}
