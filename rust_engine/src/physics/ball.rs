//! 球
//!
//! 球在游戏中动态生成和销毁，创建时实体 ID 已知，不需要延迟注册。

use glam::Vec3;
use rapier3d::prelude::*;

use super::body::{BodyKind, PhyBody};
use super::registration::EntityId;
use crate::math::vec3_to_rapier;

/// 球的专有状态
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BallState {
    pub radius: f32,
    pub mass: f32,
}

/// 宿主侧的球实体工厂（网格、材质由宿主负责）
pub trait BallFactory {
    /// 在世界坐标 `world_position` 处创建一个直径为 `diameter` 的球实体
    fn create_ball_entity(&mut self, world_position: Vec3, diameter: f32) -> EntityId;
}

/// 创建球刚体
pub fn build_ball(
    entity: EntityId,
    radius: f32,
    mass: f32,
    velocity: Vec3,
    friction: f32,
    restitution: f32,
) -> PhyBody {
    let radius = radius.max(f32::EPSILON);
    let mass = mass.max(f32::EPSILON);
    let mut body = PhyBody::new(
        format!("Ball {}", entity.0),
        BodyKind::Ball(BallState { radius, mass }),
        SharedShape::ball(radius),
        mass,
    );
    body.set_properties(mass, friction, restitution);
    body.set_initial_velocity(vec3_to_rapier(velocity));
    body.set_entity(entity);
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::body::PhyType;

    #[test]
    fn test_ball_is_registered_and_free() {
        let body = build_ball(EntityId(3), 25.0, 1.0, Vec3::new(0.0, -100.0, 0.0), 0.1, 0.01);
        assert_eq!(body.phy_type(), PhyType::Ball);
        assert_eq!(body.entity(), Some(EntityId(3)));
        assert!(!body.lock_position());
        assert_eq!(body.mass(), 1.0);
        match body.kind() {
            BodyKind::Ball(state) => assert_eq!(state.radius, 25.0),
            _ => panic!("expected ball"),
        }
    }
}
