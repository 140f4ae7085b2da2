//! 物理刚体封装
//!
//! 每个 [`PhyBody`] 拥有一个 Rapier 刚体 + 碰撞体，至多一个铰链约束。
//! 加入世界之前刚体处于 "分离" 状态（直接持有 Rapier 对象），
//! 加入之后只保存句柄。

use glam::{Mat4, Vec3};
use rapier3d::prelude::*;

use super::ball::BallState;
use super::flipper::FlipperState;
use super::gate::GateState;
use super::registration::{EntityId, Registration};
use crate::math::{angle_about_x, isometry_to_mat4, mat4_to_isometry, rotation_x_to};

/// 碰撞类别
///
/// 同时用作碰撞过滤位（`1 << type`）和每步行为分派的标签。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PhyType {
    Playfield = 0,
    Ball = 1,
    Static = 2,
    Flipper = 3,
    Gate = 4,
}

/// 与所有类别碰撞
pub const EVERYTHING: u32 = 0x7fff;

impl PhyType {
    pub const ALL: [PhyType; 5] = [
        PhyType::Playfield,
        PhyType::Ball,
        PhyType::Static,
        PhyType::Flipper,
        PhyType::Gate,
    ];

    /// 碰撞组位
    pub fn bit(self) -> u32 {
        1 << (self as u32)
    }
}

/// 碰撞类别 -> 掩码表，每个类别一行，创建后不再修改
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollisionMap {
    masks: [u32; 5],
}

impl CollisionMap {
    /// 弹球桌规则：只有球与其他物体碰撞
    pub fn pinball() -> Self {
        let ball = PhyType::Ball.bit();
        Self {
            masks: [
                ball,       // playfield :-collide-with-: ball
                EVERYTHING, // ball :-collide-with-: everything
                ball,       // static objects :-collide-with-: ball
                ball,       // flipper :-collide-with-: ball
                ball,       // gate :-collide-with-: ball
            ],
        }
    }

    pub fn mask(&self, phy_type: PhyType) -> u32 {
        self.masks[phy_type as usize]
    }

    /// Rapier 的碰撞组：成员 = 类别位，过滤 = 掩码
    pub fn groups(&self, phy_type: PhyType) -> InteractionGroups {
        InteractionGroups::new(
            Group::from_bits_truncate(phy_type.bit()),
            Group::from_bits_truncate(self.mask(phy_type)),
        )
    }

    /// 两个类别是否会检测碰撞（双向都要满足）
    pub fn collides(&self, a: PhyType, b: PhyType) -> bool {
        (a.bit() & self.mask(b)) != 0 && (b.bit() & self.mask(a)) != 0
    }
}

impl Default for CollisionMap {
    fn default() -> Self {
        Self::pinball()
    }
}

/// 世界内的刚体 ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyId(pub usize);

/// 刚体种类及其专有状态
#[derive(Debug, Clone)]
pub enum BodyKind {
    Playfield,
    Static,
    Ball(BallState),
    Flipper(FlipperState),
    Gate(GateState),
}

impl BodyKind {
    pub fn phy_type(&self) -> PhyType {
        match self {
            BodyKind::Playfield => PhyType::Playfield,
            BodyKind::Static => PhyType::Static,
            BodyKind::Ball(_) => PhyType::Ball,
            BodyKind::Flipper(_) => PhyType::Flipper,
            BodyKind::Gate(_) => PhyType::Gate,
        }
    }
}

/// Rapier 刚体的所有权状态
pub(crate) enum NativeBody {
    /// 尚未加入世界
    Detached { body: RigidBody, collider: Collider },
    /// 已加入世界
    Attached { body: RigidBodyHandle, collider: ColliderHandle },
    /// 已从世界移除（球被销毁）
    Removed,
}

/// 铰链描述（刚体局部空间）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HingeParams {
    /// 铰链枢轴（刚体局部坐标）
    pub pivot: Vec3,
    /// 铰链轴（刚体局部坐标）
    pub axis: Vec3,
    /// 加入世界时的铰链角度（弧度）
    pub reference_angle: f32,
    /// 角度限制 [min, max]（弧度）
    pub limits: Option<[f32; 2]>,
}

/// 已确定的铰链坐标系
#[derive(Debug, Clone, Copy)]
pub(crate) struct HingeFrames {
    /// 世界（地面刚体）侧坐标系
    pub world: Isometry<Real>,
    /// 刚体侧坐标系
    pub body: Isometry<Real>,
}

impl HingeFrames {
    /// 刚体在 `pose` 时的铰链角度（弧度）
    pub fn angle(&self, pose: &Isometry<Real>) -> Real {
        let relative = self.world.inverse() * pose * self.body;
        angle_about_x(&relative.rotation)
    }
}

/// 所有物理物体的基础封装
pub struct PhyBody {
    name: String,
    pub(crate) kind: BodyKind,
    mass: f32,
    friction: f32,
    restitution: f32,
    lock_position: bool,
    offset: Vec3,
    matrix: Mat4,
    local_to_world: Option<Mat4>,
    pub(crate) registration: Registration,
    pub(crate) native: NativeBody,
    hinge: Option<HingeParams>,
    pub(crate) hinge_frames: Option<HingeFrames>,
    pub(crate) joint_handle: Option<ImpulseJointHandle>,
    constraint_finalized: bool,
}

impl PhyBody {
    /// 创建刚体
    ///
    /// `mass > 0` 时为动态刚体，质量和惯量由形状计算；否则为固定刚体。
    pub fn new(name: impl Into<String>, kind: BodyKind, shape: SharedShape, mass: f32) -> Self {
        let builder = if mass > 0.0 {
            RigidBodyBuilder::dynamic()
        } else {
            RigidBodyBuilder::fixed()
        };
        let body = builder.build();

        let collider_builder = ColliderBuilder::new(shape)
            // 摩擦和弹性按乘积组合
            .friction_combine_rule(CoefficientCombineRule::Multiply)
            .restitution_combine_rule(CoefficientCombineRule::Multiply);
        let collider = if mass > 0.0 {
            collider_builder.mass(mass).build()
        } else {
            collider_builder.density(0.0).build()
        };

        // 除了球以外，物体默认锁定位置（只发布旋转）
        let lock_position = !matches!(kind, BodyKind::Ball(_));

        Self {
            name: name.into(),
            kind,
            mass: mass.max(0.0),
            friction: collider.friction(),
            restitution: collider.restitution(),
            lock_position,
            offset: Vec3::ZERO,
            matrix: Mat4::IDENTITY,
            local_to_world: None,
            registration: Registration::Built,
            native: NativeBody::Detached { body, collider },
            hinge: None,
            hinge_frames: None,
            joint_handle: None,
            constraint_finalized: false,
        }
    }

    /// 设置质量、摩擦、弹性
    ///
    /// 只能在加入世界之前调用；之后的修改通过 `PhysicsHub` 进行。
    pub fn set_properties(&mut self, mass: f32, friction: f32, restitution: f32) {
        self.friction = friction;
        self.restitution = restitution;
        if let NativeBody::Detached { collider, .. } = &mut self.native {
            collider.set_friction(friction);
            collider.set_restitution(restitution);
            if mass > 0.0 {
                collider.set_mass(mass);
                self.mass = mass;
            }
        }
    }

    /// 设置阻尼（加入世界之前）
    pub fn set_damping(&mut self, linear: f32, angular: f32) {
        if let NativeBody::Detached { body, .. } = &mut self.native {
            body.set_linear_damping(linear);
            body.set_angular_damping(angular);
        }
    }

    /// 禁止休眠（挡板需要随时响应）
    pub fn disable_sleeping(&mut self) {
        if let NativeBody::Detached { body, .. } = &mut self.native {
            let activation = body.activation_mut();
            activation.normalized_linear_threshold = -1.0;
            activation.angular_threshold = -1.0;
        }
    }

    /// 设置初速度（加入世界之前）
    pub fn set_initial_velocity(&mut self, linvel: Vector<Real>) {
        if let NativeBody::Detached { body, .. } = &mut self.native {
            body.set_linvel(linvel, false);
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &BodyKind {
        &self.kind
    }

    pub fn phy_type(&self) -> PhyType {
        self.kind.phy_type()
    }

    pub fn mass(&self) -> f32 {
        self.mass
    }

    pub fn friction(&self) -> f32 {
        self.friction
    }

    pub fn restitution(&self) -> f32 {
        self.restitution
    }

    pub fn lock_position(&self) -> bool {
        self.lock_position
    }

    pub fn set_lock_position(&mut self, lock: bool) {
        self.lock_position = lock;
    }

    /// 物理枢轴与形状原点之间的偏移
    pub fn offset(&self) -> Vec3 {
        self.offset
    }

    pub(crate) fn set_offset(&mut self, offset: Vec3) {
        self.offset = offset;
    }

    /// 初始位姿（桌面局部空间，枢轴点）
    pub fn matrix(&self) -> Mat4 {
        self.matrix
    }

    pub(crate) fn set_matrix(&mut self, matrix: Mat4) {
        self.matrix = matrix;
    }

    /// 刚体专用的局部 -> 世界变换；未设置时使用桌面的变换
    pub fn local_to_world(&self) -> Option<Mat4> {
        self.local_to_world
    }

    pub(crate) fn set_local_to_world(&mut self, local_to_world: Mat4) {
        self.local_to_world = Some(local_to_world);
    }

    pub fn registration(&self) -> Registration {
        self.registration
    }

    pub fn entity(&self) -> Option<EntityId> {
        self.registration.entity()
    }

    /// 预设实体（球在创建时就有实体）
    pub(crate) fn set_entity(&mut self, entity: EntityId) {
        self.registration = Registration::Registered(entity);
    }

    pub fn hinge(&self) -> Option<&HingeParams> {
        self.hinge.as_ref()
    }

    pub(crate) fn set_hinge(&mut self, hinge: HingeParams) {
        self.hinge = Some(hinge);
    }

    pub(crate) fn set_hinge_limits(&mut self, limits: [f32; 2]) {
        if let Some(hinge) = &mut self.hinge {
            hinge.limits = Some(limits);
        }
    }

    pub fn is_in_world(&self) -> bool {
        matches!(self.native, NativeBody::Attached { .. })
    }

    pub fn rigid_body_handle(&self) -> Option<RigidBodyHandle> {
        match self.native {
            NativeBody::Attached { body, .. } => Some(body),
            _ => None,
        }
    }

    pub fn collider_handle(&self) -> Option<ColliderHandle> {
        match self.native {
            NativeBody::Attached { collider, .. } => Some(collider),
            _ => None,
        }
    }

    pub fn is_constraint_finalized(&self) -> bool {
        self.constraint_finalized
    }

    /// 创建铰链约束
    ///
    /// 由世界在刚体加入之后调用且只调用一次。`world_pose` 是刚体加入时的位姿，
    /// 铰链的世界侧坐标系以此固定。没有铰链的刚体返回 `None`。
    pub(crate) fn finalize_constraint(&mut self, world_pose: &Isometry<Real>) -> Option<GenericJoint> {
        if self.constraint_finalized {
            return None;
        }
        self.constraint_finalized = true;

        let hinge = self.hinge?;
        let frames = hinge_frames(&hinge, world_pose);
        self.hinge_frames = Some(frames);
        Some(build_hinge_joint(&frames, hinge.limits))
    }

    /// 当前铰链角度（弧度）
    pub(crate) fn hinge_angle(&self, pose: &Isometry<Real>) -> Option<Real> {
        self.hinge_frames.map(|frames| frames.angle(pose))
    }
}

/// 计算铰链两侧的坐标系
///
/// 刚体侧：枢轴处，X 轴对齐铰链轴。
/// 世界侧：加入时刚体侧坐标系再反转参考角，使得测得的角度从参考角开始。
fn hinge_frames(hinge: &HingeParams, world_pose: &Isometry<Real>) -> HingeFrames {
    let body_frame = Mat4::from_rotation_translation(rotation_x_to(hinge.axis), hinge.pivot);
    let world_frame = isometry_to_mat4(world_pose)
        * body_frame
        * Mat4::from_rotation_x(-hinge.reference_angle);
    HingeFrames {
        world: mat4_to_isometry(world_frame),
        body: mat4_to_isometry(body_frame),
    }
}

/// 由坐标系构建 Rapier 铰链（地面刚体为 body1）
pub(crate) fn build_hinge_joint(frames: &HingeFrames, limits: Option<[f32; 2]>) -> GenericJoint {
    let mut joint = GenericJointBuilder::new(JointAxesMask::LOCKED_REVOLUTE_AXES)
        .local_frame1(frames.world)
        .local_frame2(frames.body)
        .contacts_enabled(false)
        .build();
    if let Some([min, max]) = limits {
        joint.set_limits(JointAxis::AngX, [min, max]);
    }
    joint
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::quat_to_rotation;
    use glam::Quat;

    #[test]
    fn test_collision_map_rows() {
        let map = CollisionMap::pinball();
        assert_eq!(map.mask(PhyType::Ball), EVERYTHING);
        for t in [PhyType::Playfield, PhyType::Static, PhyType::Flipper, PhyType::Gate] {
            assert_eq!(map.mask(t), PhyType::Ball.bit());
            assert!(map.collides(t, PhyType::Ball));
            assert!(map.collides(PhyType::Ball, t));
        }
        assert!(map.collides(PhyType::Ball, PhyType::Ball));
        assert!(!map.collides(PhyType::Flipper, PhyType::Static));
        assert!(!map.collides(PhyType::Gate, PhyType::Playfield));
    }

    #[test]
    fn test_phy_type_bits() {
        let bits: Vec<u32> = PhyType::ALL.iter().map(|t| t.bit()).collect();
        assert_eq!(bits, vec![1, 2, 4, 8, 16]);
    }

    #[test]
    fn test_static_body_is_fixed() {
        let body = PhyBody::new("wall", BodyKind::Static, SharedShape::cuboid(1.0, 1.0, 1.0), 0.0);
        assert_eq!(body.phy_type(), PhyType::Static);
        assert_eq!(body.mass(), 0.0);
        assert!(body.lock_position());
        match &body.native {
            NativeBody::Detached { body, .. } => assert!(body.is_fixed()),
            _ => panic!("expected detached body"),
        }
    }

    #[test]
    fn test_constraint_finalized_once() {
        let mut body = PhyBody::new("bar", BodyKind::Static, SharedShape::cuboid(1.0, 1.0, 1.0), 1.0);
        body.set_hinge(HingeParams {
            pivot: Vec3::new(0.0, 0.0, 2.0),
            axis: Vec3::X,
            reference_angle: 0.0,
            limits: None,
        });
        let pose = Isometry::identity();
        assert!(body.finalize_constraint(&pose).is_some());
        assert!(body.is_constraint_finalized());
        assert!(body.finalize_constraint(&pose).is_none());
    }

    #[test]
    fn test_hinge_angle_starts_at_reference() {
        let hinge = HingeParams {
            pivot: Vec3::new(0.0, 0.0, 25.0),
            axis: Vec3::Z,
            reference_angle: 0.3,
            limits: Some([0.3, 1.2]),
        };
        let start = Quat::from_rotation_z(0.3);
        let pose = mat4_to_isometry(Mat4::from_rotation_translation(start, Vec3::new(100.0, 50.0, 0.0)));
        let frames = hinge_frames(&hinge, &pose);
        assert!((frames.angle(&pose) - 0.3).abs() < 1e-4);

        // 绕铰链轴再转 0.5 弧度（枢轴不动）
        let pivot_world = pose * Point::new(0.0, 0.0, 25.0);
        let extra = quat_to_rotation(Quat::from_rotation_z(0.5));
        let rotated = Isometry::rotation_wrt_point(extra, pivot_world) * pose;
        assert!((frames.angle(&rotated) - 0.8).abs() < 1e-4);
    }
}
