//! 延迟注册
//!
//! 挡板、闸门等物体的宿主实体 ID 要在宿主完成对象转换之后才会分配，
//! 而物理刚体在此之前就已经创建并加入了世界。
//! [`DeferredRegistration`] 是一次性的令牌：宿主拿到实体 ID 后调用
//! [`DeferredRegistration::complete`]，令牌被消耗，保证每个刚体只注册一次。

use glam::Mat4;

use super::body::BodyId;
use super::hub::PhysicsHub;
use crate::Result;

/// 宿主实体 ID（不透明）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u64);

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Entity({})", self.0)
    }
}

/// 刚体的注册状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// 刚体已构建，尚未加入世界
    Built,
    /// 已加入世界，等待宿主分配实体 ID
    AwaitingIdentity,
    /// 已关联实体
    Registered(EntityId),
}

impl Registration {
    pub fn entity(&self) -> Option<EntityId> {
        match self {
            Registration::Registered(entity) => Some(*entity),
            _ => None,
        }
    }
}

/// 发布给宿主的变换记录
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformRecord {
    pub entity: EntityId,
    /// 物理世界中的刚体位姿（桌面局部空间，形状原点）
    pub physics_pose: Mat4,
    /// 局部 -> 世界
    pub local_to_world: Mat4,
    /// 锁定位置：只发布旋转，平移保持初始值
    pub lock_position: bool,
    /// 最终的世界变换（枢轴点）
    pub world: Mat4,
}

impl TransformRecord {
    /// 由物理位姿计算世界变换
    ///
    /// `world = local_to_world * pose * translate(offset)`；锁定位置时平移取 `initial`。
    pub fn compose(
        entity: EntityId,
        physics_pose: Mat4,
        offset: glam::Vec3,
        local_to_world: Mat4,
        lock_position: bool,
        initial: Option<&TransformRecord>,
    ) -> Self {
        let mut world = local_to_world * physics_pose * Mat4::from_translation(offset);
        if lock_position {
            if let Some(initial) = initial {
                world.w_axis = initial.world.w_axis;
            }
        }
        Self {
            entity,
            physics_pose,
            local_to_world,
            lock_position,
            world,
        }
    }
}

/// 延迟注册令牌
///
/// 不可复制；`complete` 按值消耗令牌。
#[derive(Debug)]
#[must_use = "延迟注册的刚体在完成注册之前不会发布变换，也没有约束"]
pub struct DeferredRegistration {
    body: BodyId,
    local_to_world: Mat4,
    lock_position: bool,
    name: String,
}

impl DeferredRegistration {
    pub(crate) fn new(body: BodyId, local_to_world: Mat4, lock_position: bool, name: String) -> Self {
        Self {
            body,
            local_to_world,
            lock_position,
            name,
        }
    }

    pub fn body(&self) -> BodyId {
        self.body
    }

    pub fn local_to_world(&self) -> Mat4 {
        self.local_to_world
    }

    pub fn lock_position(&self) -> bool {
        self.lock_position
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 宿主分配实体 ID 后调用：关联实体、完成约束、发布初始变换
    pub fn complete(self, hub: &mut PhysicsHub, entity: EntityId) -> Result<()> {
        hub.register_entity(self.body, entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Quat, Vec3};

    #[test]
    fn test_compose_applies_offset_and_local_to_world() {
        let pose = Mat4::from_translation(Vec3::new(10.0, 0.0, 0.0));
        let l2w = Mat4::from_scale(Vec3::splat(0.001));
        let record = TransformRecord::compose(
            EntityId(1),
            pose,
            Vec3::new(0.0, 0.0, 5.0),
            l2w,
            false,
            None,
        );
        let t = record.world.w_axis.truncate();
        assert!(t.abs_diff_eq(Vec3::new(0.010, 0.0, 0.005), 1e-6));
    }

    #[test]
    fn test_lock_position_keeps_initial_translation() {
        let initial = TransformRecord::compose(
            EntityId(2),
            Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0)),
            Vec3::ZERO,
            Mat4::IDENTITY,
            true,
            None,
        );
        let moved = TransformRecord::compose(
            EntityId(2),
            Mat4::from_rotation_translation(Quat::from_rotation_z(0.5), Vec3::new(9.0, 9.0, 9.0)),
            Vec3::ZERO,
            Mat4::IDENTITY,
            true,
            Some(&initial),
        );
        assert!(moved.world.w_axis.truncate().abs_diff_eq(Vec3::new(1.0, 2.0, 3.0), 1e-6));
        let rotated = moved.world.transform_vector3(Vec3::X);
        assert!(rotated.abs_diff_eq(Quat::from_rotation_z(0.5) * Vec3::X, 1e-5));
    }

    #[test]
    fn test_registration_entity() {
        assert_eq!(Registration::Built.entity(), None);
        assert_eq!(Registration::AwaitingIdentity.entity(), None);
        assert_eq!(Registration::Registered(EntityId(7)).entity(), Some(EntityId(7)));
    }
}
