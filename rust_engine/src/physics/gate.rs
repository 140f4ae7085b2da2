//! 闸门（gate）
//!
//! 闸门的碰撞体是一根细长的盒子，尺寸取自导线网格的包围盒，
//! 绕局部 X 轴自由转动（无限制），靠阻尼停下。

use glam::{Mat4, Vec3};
use rapier3d::prelude::*;

use super::body::{BodyKind, HingeParams, PhyBody};
use super::config::PhysicsConfig;
use crate::table::GateData;
use crate::{PhysicsError, Result};

/// 闸门的专有状态
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateState {
    pub length: f32,
    pub thickness: f32,
    pub bar_height: f32,
    pub damping: f32,
}

impl GateState {
    /// 由导线网格尺寸计算（尺寸乘以闸门的局部 Z 缩放）
    pub fn from_wire_size(size: Vec3, scale_z: f32, damping: f32) -> Self {
        let size = size * scale_z;
        Self {
            length: size.x,
            thickness: size.y,
            bar_height: size.z,
            damping,
        }
    }

    /// 枢轴相对盒子中心的偏移
    pub fn offset(&self) -> Vec3 {
        Vec3::new(0.0, 0.0, self.bar_height * 0.8)
    }

    /// 盒子半尺寸
    pub fn half_extents(&self) -> Vec3 {
        Vec3::new(self.length * 0.5, self.thickness * 0.5, self.bar_height * 0.15)
    }
}

/// 创建闸门刚体
///
/// 导线网格必须恰好一个，否则返回 [`PhysicsError::MalformedGate`]。
pub fn build_gate(data: &GateData, config: &PhysicsConfig) -> Result<PhyBody> {
    let [wire] = data.wires.as_slice() else {
        return Err(PhysicsError::MalformedGate {
            name: data.name.clone(),
            wires: data.wires.len(),
        });
    };

    let state = GateState::from_wire_size(wire.bounds_size(), data.scale.z, data.damping);
    let half = state.half_extents().max(Vec3::splat(f32::EPSILON));
    let offset = state.offset();
    // 缩放只影响导线尺寸，位姿不含缩放
    let trs = Mat4::from_rotation_translation(data.rotation, data.position);

    let mut body = PhyBody::new(
        data.name.clone(),
        BodyKind::Gate(state),
        SharedShape::cuboid(half.x, half.y, half.z),
        config.gate_mass,
    );
    body.set_properties(config.gate_mass, data.friction, data.elasticity * config.elasticity_scale);
    body.set_damping(state.damping, state.damping);
    body.set_offset(offset);
    body.set_hinge(HingeParams {
        pivot: offset,
        axis: Vec3::X,
        reference_angle: 0.0,
        limits: None,
    });
    body.set_matrix(trs);
    // 发布的变换相对闸门自身
    body.set_local_to_world(trs.inverse());
    Ok(body)
}
