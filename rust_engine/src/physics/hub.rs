//! 弹球物理世界
//!
//! 持有 Rapier 世界，负责：
//! - 刚体加入（碰撞组来自类别掩码表）
//! - 延迟注册与约束创建
//! - 固定步长循环（每个子步：步进 -> 挡板驱动 -> 发布变换 -> 统计）
//! - 挡板登记表、闸门、球
//! - 按固定顺序释放原生资源
//!
//! ## Bullet3 → Rapier 映射
//! | Bullet3 | Rapier |
//! |---------|--------|
//! | btDiscreteDynamicsWorld | PhysicsPipeline + RigidBodySet + ColliderSet + ImpulseJointSet |
//! | btDbvtBroadphase | DefaultBroadPhase |
//! | btCollisionDispatcher | NarrowPhase |
//! | btDefaultCollisionConfiguration | IntegrationParameters |
//! | btSequentialImpulseConstraintSolver | PhysicsPipeline + CCDSolver |
//! | btHingeConstraint | GenericJoint (LOCKED_REVOLUTE_AXES) |

use std::collections::{BTreeMap, HashMap};
use std::num::NonZeroUsize;
use std::time::Instant;

use glam::{Mat4, Quat, Vec3};
use rapier3d::prelude::*;

use super::ball::{build_ball, BallFactory};
use super::body::{build_hinge_joint, BodyId, BodyKind, CollisionMap, NativeBody, PhyBody};
use super::config::{get_config, FlipperParam, PhysicsConfig};
use super::flipper::{FlipperDebugState, FlipperRegistry, FlipperState, FlipperTuning, SolenoidState};
use super::observer::{PhysicsObserver, StepStats};
use super::registration::{DeferredRegistration, EntityId, Registration, TransformRecord};
use super::timing::FixedStepClock;
use crate::math::{isometry_to_mat4, mat4_to_isometry, rapier_to_vec3, vec3_to_rapier, MM_PER_METER};
use crate::table::BallSpawn;
use crate::{PhysicsError, Result};

/// 手动滚球：距离缩放
const ROLLER_DISTANCE_SCALE: f32 = 0.05;
/// 手动滚球：距离上限
const ROLLER_MAX_DISTANCE: f32 = 20.0;
/// 手动滚球：冲量缩放
const ROLLER_IMPULSE_SCALE: f32 = 10.0;

/// 由重力大小（m/s²）和桌面倾角（度）计算桌面局部空间的重力（mm/s²）
pub fn gravity_vector(gravity: f32, slope: f32) -> Vec3 {
    Quat::from_rotation_x(slope.to_radians()) * Vec3::new(0.0, 0.0, -gravity * MM_PER_METER)
}

/// 加入世界的结果
#[derive(Debug)]
#[must_use]
pub enum AddOutcome {
    /// 实体已知，已注册并发布初始变换
    Registered { body: BodyId, entity: EntityId },
    /// 等待宿主分配实体
    Deferred(DeferredRegistration),
}

impl AddOutcome {
    pub fn body(&self) -> BodyId {
        match self {
            AddOutcome::Registered { body, .. } => *body,
            AddOutcome::Deferred(token) => token.body(),
        }
    }

    /// 取出延迟注册令牌
    pub fn into_deferred(self) -> Option<DeferredRegistration> {
        match self {
            AddOutcome::Deferred(token) => Some(token),
            AddOutcome::Registered { .. } => None,
        }
    }
}

/// Rapier 原生对象
struct NativeWorld {
    /// 物理流水线
    physics_pipeline: PhysicsPipeline,
    /// 积分参数
    integration_parameters: IntegrationParameters,
    /// 岛管理器
    island_manager: IslandManager,
    /// 宽相检测
    broad_phase: DefaultBroadPhase,
    /// 窄相检测
    narrow_phase: NarrowPhase,
    rigid_body_set: RigidBodySet,
    collider_set: ColliderSet,
    impulse_joint_set: ImpulseJointSet,
    multibody_joint_set: MultibodyJointSet,
    /// CCD 求解器
    ccd_solver: CCDSolver,
    /// 地面刚体（铰链的世界侧）
    ground_handle: RigidBodyHandle,
}

impl NativeWorld {
    fn new(config: &PhysicsConfig) -> Self {
        let mut rigid_body_set = RigidBodySet::new();
        // 地面刚体只作为铰链锚点，没有碰撞体
        let ground_handle = rigid_body_set.insert(RigidBodyBuilder::fixed().build());

        let mut integration_parameters = IntegrationParameters::default();
        integration_parameters.dt = config.step_duration() as Real;
        integration_parameters.num_solver_iterations =
            NonZeroUsize::new(config.solver_iterations).unwrap_or(NonZeroUsize::MIN);

        Self {
            physics_pipeline: PhysicsPipeline::new(),
            integration_parameters,
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            rigid_body_set,
            collider_set: ColliderSet::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            ground_handle,
        }
    }

    /// 执行一次物理步进，返回实际执行的步数
    fn step(&mut self, gravity: &Vector<Real>, dt: Real) -> u32 {
        self.integration_parameters.dt = dt;
        self.physics_pipeline.step(
            gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_body_set,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            &mut self.ccd_solver,
            None,
            &(),
            &(),
        );
        1
    }

    /// 按固定顺序释放：世界 -> 宽相 -> 窄相 -> 积分参数 -> 求解器
    fn release(self) {
        let NativeWorld {
            physics_pipeline,
            integration_parameters,
            island_manager,
            broad_phase,
            narrow_phase,
            rigid_body_set,
            collider_set,
            impulse_joint_set,
            multibody_joint_set,
            ccd_solver,
            ..
        } = self;

        log::debug!(
            "[物理世界] 释放 {} 个刚体, {} 个碰撞体, {} 个关节",
            rigid_body_set.len(),
            collider_set.len(),
            impulse_joint_set.len()
        );
        drop(impulse_joint_set);
        drop(multibody_joint_set);
        drop(collider_set);
        drop(rigid_body_set);
        drop(island_manager);
        drop(broad_phase);
        drop(narrow_phase);
        drop(integration_parameters);
        drop(physics_pipeline);
        drop(ccd_solver);
    }
}

/// 弹球物理世界
pub struct PhysicsHub {
    world: Option<NativeWorld>,
    gravity: Vector<Real>,
    collision_map: CollisionMap,
    config: PhysicsConfig,
    tuning: FlipperTuning,
    clock: FixedStepClock,
    bodies: BTreeMap<BodyId, PhyBody>,
    next_body_id: usize,
    /// 已注册实体 -> 刚体
    entities: BTreeMap<EntityId, BodyId>,
    flippers: FlipperRegistry,
    last_gate: Option<EntityId>,
    last_ball: Option<EntityId>,
    /// 最近一次发布的变换
    published: BTreeMap<EntityId, TransformRecord>,
    /// 注册时的初始变换（锁定位置时使用其平移）
    initial: HashMap<EntityId, TransformRecord>,
    local_to_world: Mat4,
    world_to_local: Mat4,
    observer: Option<Box<dyn PhysicsObserver>>,
    release_count: u32,
}

impl PhysicsHub {
    /// 使用全局配置快照创建物理世界
    pub fn new() -> Self {
        Self::with_config(get_config())
    }

    /// 使用指定配置创建物理世界
    pub fn with_config(config: PhysicsConfig) -> Self {
        let world = NativeWorld::new(&config);
        let gravity = gravity_vector(config.gravity, config.slope);

        log::info!(
            "[物理配置] 步频={}Hz, 求解器迭代={}, 重力={:.1}m/s², 倾角={:.1}°, 步调={:?}",
            config.steps_per_second,
            config.solver_iterations,
            config.gravity,
            config.slope,
            config.timing_mode
        );

        Self {
            world: Some(world),
            gravity: vec3_to_rapier(gravity),
            collision_map: CollisionMap::pinball(),
            tuning: FlipperTuning::from_config(&config),
            clock: FixedStepClock::from_steps_per_second(config.steps_per_second),
            config,
            bodies: BTreeMap::new(),
            next_body_id: 0,
            entities: BTreeMap::new(),
            flippers: FlipperRegistry::new(),
            last_gate: None,
            last_ball: None,
            published: BTreeMap::new(),
            initial: HashMap::new(),
            local_to_world: Mat4::IDENTITY,
            world_to_local: Mat4::IDENTITY,
            observer: None,
            release_count: 0,
        }
    }

    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    pub fn collision_map(&self) -> &CollisionMap {
        &self.collision_map
    }

    pub fn clock(&self) -> &FixedStepClock {
        &self.clock
    }

    /// 设置重力（m/s²）和桌面倾角（度）
    pub fn set_gravity(&mut self, gravity: f32, slope: f32) {
        self.config.gravity = gravity;
        self.config.slope = slope;
        self.gravity = vec3_to_rapier(gravity_vector(gravity, slope));
    }

    /// 桌面局部空间的重力（mm/s²）
    pub fn gravity(&self) -> Vec3 {
        rapier_to_vec3(&self.gravity)
    }

    /// 设置桌面局部 -> 世界变换（默认单位矩阵）
    pub fn set_local_to_world(&mut self, local_to_world: Mat4) {
        self.local_to_world = local_to_world;
        self.world_to_local = local_to_world.inverse();
    }

    pub fn local_to_world(&self) -> Mat4 {
        self.local_to_world
    }

    pub fn world_to_local(&self) -> Mat4 {
        self.world_to_local
    }

    pub fn set_observer(&mut self, observer: Box<dyn PhysicsObserver>) {
        self.observer = Some(observer);
    }

    pub fn flipper_param(&self, param: FlipperParam) -> f32 {
        self.config.flipper_param(param)
    }

    /// 修改挡板可调参数，下一个子步生效
    pub fn set_flipper_param(&mut self, param: FlipperParam, value: f32) {
        self.config.set_flipper_param(param, value);
        self.tuning = FlipperTuning::from_config(&self.config);
    }

    // ========== 刚体加入与注册 ==========

    /// 以刚体自身的初始矩阵加入世界
    pub fn add(&mut self, body: PhyBody) -> Result<AddOutcome> {
        let transform = body.matrix();
        self.add_at(body, transform)
    }

    /// 以 `transform` 加入世界
    ///
    /// 物理位姿 = `transform * translate(-offset)`。
    /// 实体已知的刚体立即注册，其他刚体返回延迟注册令牌。
    pub fn add_at(&mut self, mut body: PhyBody, transform: Mat4) -> Result<AddOutcome> {
        if let Some(entity) = body.entity() {
            self.ensure_entity_free(entity)?;
        }
        let world = self.world.as_mut().ok_or(PhysicsError::Disposed)?;

        let NativeBody::Detached {
            body: mut rigid_body,
            collider: mut collider,
        } = std::mem::replace(&mut body.native, NativeBody::Removed)
        else {
            return Err(PhysicsError::AlreadyInWorld(body.name().to_string()));
        };

        let pose = transform * Mat4::from_translation(-body.offset());
        rigid_body.set_position(mat4_to_isometry(pose), true);

        let groups = self.collision_map.groups(body.phy_type());
        collider.set_collision_groups(groups);
        collider.set_solver_groups(groups);

        let rb_handle = world.rigid_body_set.insert(rigid_body);
        let collider_handle =
            world
                .collider_set
                .insert_with_parent(collider, rb_handle, &mut world.rigid_body_set);
        body.native = NativeBody::Attached {
            body: rb_handle,
            collider: collider_handle,
        };

        let id = BodyId(self.next_body_id);
        self.next_body_id += 1;

        if self.config.debug_log {
            let t = pose.w_axis;
            log::debug!(
                "[刚体] {:?} '{}': 类型={:?}, 质量={}, 位置=({:.2},{:.2},{:.2})",
                id,
                body.name(),
                body.phy_type(),
                body.mass(),
                t.x,
                t.y,
                t.z
            );
        }

        match body.registration {
            Registration::Registered(entity) => {
                self.bodies.insert(id, body);
                self.complete_registration(id)?;
                Ok(AddOutcome::Registered { body: id, entity })
            }
            Registration::Built | Registration::AwaitingIdentity => {
                body.registration = Registration::AwaitingIdentity;
                let token = DeferredRegistration::new(
                    id,
                    body.local_to_world().unwrap_or(self.local_to_world),
                    body.lock_position(),
                    body.name().to_string(),
                );
                self.bodies.insert(id, body);
                Ok(AddOutcome::Deferred(token))
            }
        }
    }

    /// 关联实体（通常经由 [`DeferredRegistration::complete`] 调用）
    pub fn register_entity(&mut self, id: BodyId, entity: EntityId) -> Result<()> {
        if self.world.is_none() {
            return Err(PhysicsError::Disposed);
        }
        let body = self.bodies.get(&id).ok_or(PhysicsError::UnknownBody(id))?;
        if let Registration::Registered(_) = body.registration {
            return Err(PhysicsError::AlreadyRegistered(id));
        }
        self.ensure_entity_free(entity)?;
        if let Some(body) = self.bodies.get_mut(&id) {
            body.registration = Registration::Registered(entity);
        }
        self.complete_registration(id)
    }

    /// 一个实体只能关联一个刚体
    fn ensure_entity_free(&self, entity: EntityId) -> Result<()> {
        match self.entities.get(&entity) {
            Some(existing) => {
                log::warn!("[注册] {} 已关联 {:?}", entity, existing);
                Err(PhysicsError::EntityInUse(entity))
            }
            None => Ok(()),
        }
    }

    /// 注册完成：创建约束、登记、发布初始变换
    fn complete_registration(&mut self, id: BodyId) -> Result<()> {
        let world = self.world.as_mut().ok_or(PhysicsError::Disposed)?;
        let body = self.bodies.get_mut(&id).ok_or(PhysicsError::UnknownBody(id))?;
        let entity = body.entity().ok_or(PhysicsError::UnknownBody(id))?;
        let handle = body.rigid_body_handle().ok_or(PhysicsError::UnknownBody(id))?;
        let pose = *world
            .rigid_body_set
            .get(handle)
            .ok_or(PhysicsError::UnknownBody(id))?
            .position();

        if let Some(joint) = body.finalize_constraint(&pose) {
            let joint_handle = world
                .impulse_joint_set
                .insert(world.ground_handle, handle, joint, true);
            body.joint_handle = Some(joint_handle);
        }

        match &mut body.kind {
            BodyKind::Flipper(state) => {
                // 挡板静止时处于回落状态
                state.solenoid = SolenoidState::Retracting;
                self.flippers.insert(entity, id);
            }
            BodyKind::Gate(_) => self.last_gate = Some(entity),
            BodyKind::Ball(_) => self.last_ball = Some(entity),
            BodyKind::Playfield | BodyKind::Static => {}
        }
        self.entities.insert(entity, id);

        let record = TransformRecord::compose(
            entity,
            isometry_to_mat4(&pose),
            body.offset(),
            body.local_to_world().unwrap_or(self.local_to_world),
            body.lock_position(),
            None,
        );
        self.initial.insert(entity, record);
        self.published.insert(entity, record);

        log::debug!("[注册] {} -> {:?} '{}'", entity, id, body.name());
        Ok(())
    }

    // ========== 步进 ==========

    /// 推进物理世界
    ///
    /// `frame_delta` 应已经过 [`super::timing::TimingMode`] 处理。返回本次执行的子步数。
    pub fn update(&mut self, frame_delta: f64) -> Result<u64> {
        if self.world.is_none() {
            return Err(PhysicsError::Disposed);
        }
        let mut clock = self.clock.clone();
        let iterations = clock.advance(frame_delta, |c| self.sub_step(c));
        self.clock = clock;
        Ok(iterations)
    }

    /// 一个子步：步进、挡板驱动、发布变换、统计
    fn sub_step(&mut self, clock: &FixedStepClock) -> u32 {
        let started = Instant::now();
        let dt = clock.step_duration();

        let executed = match self.world.as_mut() {
            Some(world) => world.step(&self.gravity, dt as Real),
            None => 0,
        };
        self.actuate_flippers();
        let records = self.publish_transforms();

        if let Some(observer) = self.observer.as_mut() {
            let stats = StepStats {
                step_counter: clock.step_counter() + 1,
                simulated_time: (clock.executed_steps() + executed as u64) as f64 * dt,
                steps: executed,
                elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
            };
            observer.on_physics_step(&stats);
            observer.on_transforms_published(&records);
        }
        executed
    }

    /// 对每个已注册的挡板更新质量并施加扭矩
    fn actuate_flippers(&mut self) {
        let Some(world) = self.world.as_mut() else {
            return;
        };
        let tuning = self.tuning;

        for (entity, id) in self.flippers.iter() {
            let Some(body) = self.bodies.get_mut(&id) else {
                continue;
            };
            let (Some(rb_handle), Some(collider_handle)) =
                (body.rigid_body_handle(), body.collider_handle())
            else {
                continue;
            };
            let Some(pose) = world.rigid_body_set.get(rb_handle).map(|rb| *rb.position()) else {
                continue;
            };
            let axis = body.hinge().map(|h| h.axis).unwrap_or(Vec3::Z);
            let Some(angle) = body.hinge_angle(&pose) else {
                continue;
            };
            let BodyKind::Flipper(state) = &mut body.kind else {
                continue;
            };

            if let Some(mass) = state.update_mass(tuning.mass_multiplier_log) {
                if let Some(collider) = world.collider_set.get_mut(collider_handle) {
                    collider.set_mass(mass);
                }
                if let Some(rb) = world.rigid_body_set.get_mut(rb_handle) {
                    rb.recompute_mass_properties_from_colliders(&world.collider_set);
                }
                log::debug!("[挡板] {} 质量 = {:.3}", entity, mass);
            }

            let torque = state.torque(state.swing_degrees(angle), &tuning);
            if let Some(rb) = world.rigid_body_set.get_mut(rb_handle) {
                let world_axis = pose.rotation * vec3_to_rapier(axis);
                rb.reset_torques(false);
                rb.add_torque(world_axis * torque, true);
            }
        }
    }

    /// 发布所有已注册刚体的变换
    fn publish_transforms(&mut self) -> Vec<TransformRecord> {
        let Some(world) = self.world.as_ref() else {
            return Vec::new();
        };
        let mut records = Vec::with_capacity(self.entities.len());
        for (entity, id) in &self.entities {
            let Some(body) = self.bodies.get(id) else {
                continue;
            };
            let Some(rb) = body.rigid_body_handle().and_then(|h| world.rigid_body_set.get(h)) else {
                continue;
            };
            let record = TransformRecord::compose(
                *entity,
                isometry_to_mat4(rb.position()),
                body.offset(),
                body.local_to_world().unwrap_or(self.local_to_world),
                body.lock_position(),
                self.initial.get(entity),
            );
            self.published.insert(*entity, record);
            records.push(record);
        }
        records
    }

    // ========== 挡板 ==========

    /// 通电（抬起挡板）
    pub fn rotate_to_end(&mut self, entity: EntityId) -> Result<()> {
        self.set_solenoid(entity, SolenoidState::Firing)
    }

    /// 断电（挡板回落）
    pub fn rotate_to_start(&mut self, entity: EntityId) -> Result<()> {
        self.set_solenoid(entity, SolenoidState::Retracting)
    }

    fn set_solenoid(&mut self, entity: EntityId, solenoid: SolenoidState) -> Result<()> {
        let id = self.flippers.get(entity)?;
        let body = self.bodies.get_mut(&id).ok_or(PhysicsError::UnknownEntity(entity))?;
        let BodyKind::Flipper(state) = &mut body.kind else {
            return Err(PhysicsError::UnknownEntity(entity));
        };
        state.solenoid = solenoid;

        if let (Some(world), Some(handle)) = (self.world.as_mut(), body.rigid_body_handle()) {
            if let Some(rb) = world.rigid_body_set.get_mut(handle) {
                rb.wake_up(true);
            }
        }
        Ok(())
    }

    pub fn flipper_registry(&self) -> &FlipperRegistry {
        &self.flippers
    }

    /// 挡板当前摆动角（度）
    pub fn flipper_angle(&self, entity: EntityId) -> Result<f32> {
        let id = self.flippers.get(entity)?;
        self.flipper_swing(id).ok_or(PhysicsError::UnknownEntity(entity))
    }

    fn flipper_swing(&self, id: BodyId) -> Option<f32> {
        let world = self.world.as_ref()?;
        let body = self.bodies.get(&id)?;
        let rb = world.rigid_body_set.get(body.rigid_body_handle()?)?;
        let angle = body.hinge_angle(rb.position())?;
        match &body.kind {
            BodyKind::Flipper(state) => Some(state.swing_degrees(angle)),
            _ => None,
        }
    }

    /// 所有挡板的调试状态
    pub fn flipper_states(&self) -> Vec<FlipperDebugState> {
        self.flippers
            .iter()
            .filter_map(|(entity, id)| {
                let BodyKind::Flipper(state) = self.bodies.get(&id)?.kind() else {
                    return None;
                };
                Some(FlipperDebugState {
                    entity,
                    angle: self.flipper_swing(id)?,
                    solenoid_on: state.solenoid == SolenoidState::Firing,
                })
            })
            .collect()
    }

    /// 挡板当前使用的质量
    pub fn flipper_effective_mass(&self, entity: EntityId) -> Result<f32> {
        self.with_flipper(entity, |state| state.used_mass())
    }

    /// 挡板惯量重新计算的次数
    pub fn flipper_inertia_updates(&self, entity: EntityId) -> Result<u32> {
        self.with_flipper(entity, |state| state.inertia_updates())
    }

    fn with_flipper<T>(&self, entity: EntityId, f: impl FnOnce(&FlipperState) -> T) -> Result<T> {
        let id = self.flippers.get(entity)?;
        match self.bodies.get(&id).map(|b| b.kind()) {
            Some(BodyKind::Flipper(state)) => Ok(f(state)),
            _ => Err(PhysicsError::UnknownEntity(entity)),
        }
    }

    /// 运行时修改挡板的起始角和终止角（度），重新设置铰链限制
    pub fn set_flipper_angles(&mut self, entity: EntityId, start: f32, end: f32) -> Result<()> {
        let id = self.flippers.get(entity)?;
        let world = self.world.as_mut().ok_or(PhysicsError::Disposed)?;
        let body = self.bodies.get_mut(&id).ok_or(PhysicsError::UnknownEntity(entity))?;
        let BodyKind::Flipper(state) = &mut body.kind else {
            return Err(PhysicsError::UnknownEntity(entity));
        };
        state.start_angle = start.to_radians();
        state.end_angle = end.to_radians();
        let limits = state.limits();
        body.set_hinge_limits(limits);

        let (Some(frames), Some(rb_handle)) = (body.hinge_frames, body.rigid_body_handle()) else {
            return Ok(());
        };
        if let Some(old) = body.joint_handle.take() {
            world.impulse_joint_set.remove(old, true);
        }
        let joint = build_hinge_joint(&frames, Some(limits));
        body.joint_handle = Some(
            world
                .impulse_joint_set
                .insert(world.ground_handle, rb_handle, joint, true),
        );
        log::info!("[挡板] {} 角度 {:.1}° -> {:.1}°", entity, start, end);
        Ok(())
    }

    // ========== 闸门 ==========

    /// 最近注册的闸门
    pub fn last_gate(&self) -> Option<EntityId> {
        self.last_gate
    }

    pub fn gate_damping(&self, entity: EntityId) -> Result<f32> {
        match self.body_of(entity).map(|b| b.kind()) {
            Some(BodyKind::Gate(state)) => Ok(state.damping),
            _ => Err(PhysicsError::UnknownEntity(entity)),
        }
    }

    /// 修改闸门阻尼（线性和角度同时修改）
    pub fn set_gate_damping(&mut self, entity: EntityId, damping: f32) -> Result<()> {
        let id = *self.entities.get(&entity).ok_or(PhysicsError::UnknownEntity(entity))?;
        let body = self.bodies.get_mut(&id).ok_or(PhysicsError::UnknownEntity(entity))?;
        let BodyKind::Gate(state) = &mut body.kind else {
            return Err(PhysicsError::UnknownEntity(entity));
        };
        state.damping = damping;

        let world = self.world.as_mut().ok_or(PhysicsError::Disposed)?;
        if let Some(rb) = body.rigid_body_handle().and_then(|h| world.rigid_body_set.get_mut(h)) {
            rb.set_linear_damping(damping);
            rb.set_angular_damping(damping);
        }
        Ok(())
    }

    // ========== 球 ==========

    /// 最近创建的球
    pub fn last_ball(&self) -> Option<EntityId> {
        self.last_ball
    }

    /// 创建球：宿主先创建实体，然后加入物理世界
    pub fn ball_create<F: BallFactory + ?Sized>(
        &mut self,
        factory: &mut F,
        spawn: BallSpawn,
    ) -> Result<EntityId> {
        if self.world.is_none() {
            return Err(PhysicsError::Disposed);
        }
        let radius = spawn.radius * spawn.scale;
        let entity = factory.create_ball_entity(spawn.world_position, radius * 2.0);
        let body = build_ball(
            entity,
            radius,
            spawn.mass,
            spawn.local_velocity,
            self.config.ball_friction,
            self.config.ball_restitution,
        );
        // 球没有约束，也不会延迟注册
        let _ = self.add_at(body, Mat4::from_translation(spawn.local_position))?;
        log::debug!("[球] 创建 {} 位置={:?}", entity, spawn.local_position);
        Ok(entity)
    }

    /// 销毁球（刚体和碰撞体从世界移除）
    pub fn ball_destroy(&mut self, entity: EntityId) -> Result<()> {
        let id = *self.entities.get(&entity).ok_or(PhysicsError::UnknownEntity(entity))?;
        if !matches!(self.bodies.get(&id).map(|b| b.kind()), Some(BodyKind::Ball(_))) {
            return Err(PhysicsError::UnknownEntity(entity));
        }
        let world = self.world.as_mut().ok_or(PhysicsError::Disposed)?;
        if let Some(mut body) = self.bodies.remove(&id) {
            if let Some(handle) = body.rigid_body_handle() {
                world.rigid_body_set.remove(
                    handle,
                    &mut world.island_manager,
                    &mut world.collider_set,
                    &mut world.impulse_joint_set,
                    &mut world.multibody_joint_set,
                    true,
                );
            }
            body.native = NativeBody::Removed;
        }
        self.entities.remove(&entity);
        self.published.remove(&entity);
        self.initial.remove(&entity);
        if self.last_ball == Some(entity) {
            self.last_ball = None;
        }
        log::debug!("[球] 销毁 {}", entity);
        Ok(())
    }

    /// 手动滚球：给球一个朝向目标点（世界坐标）的冲量
    pub fn manual_ball_roller(&mut self, entity: EntityId, world_target: Vec3) -> Result<()> {
        let id = *self.entities.get(&entity).ok_or(PhysicsError::UnknownEntity(entity))?;
        let body = self.bodies.get(&id).ok_or(PhysicsError::UnknownEntity(entity))?;
        if !matches!(body.kind(), BodyKind::Ball(_)) {
            return Err(PhysicsError::UnknownEntity(entity));
        }
        let world = self.world.as_mut().ok_or(PhysicsError::Disposed)?;
        let Some(rb) = body.rigid_body_handle().and_then(|h| world.rigid_body_set.get_mut(h)) else {
            return Err(PhysicsError::UnknownEntity(entity));
        };

        let position = rapier_to_vec3(rb.translation());
        let mut target = self.world_to_local.transform_point3(world_target);
        target.z = position.z;

        let delta = target - position;
        let direction = delta.normalize_or_zero();
        let mut distance = (delta.length() * ROLLER_DISTANCE_SCALE).min(ROLLER_MAX_DISTANCE);

        rb.set_linvel(Vector::zeros(), false);
        rb.set_angvel(Vector::zeros(), false);
        if distance > 0.1 {
            distance += 1.0;
            let impulse = direction * distance * distance * ROLLER_IMPULSE_SCALE;
            rb.apply_impulse(vec3_to_rapier(impulse), true);
        }
        Ok(())
    }

    // ========== 查询 ==========

    /// 最近一次发布的变换
    pub fn transform(&self, entity: EntityId) -> Option<&TransformRecord> {
        self.published.get(&entity)
    }

    pub fn transforms(&self) -> impl Iterator<Item = &TransformRecord> + '_ {
        self.published.values()
    }

    pub fn body(&self, id: BodyId) -> Option<&PhyBody> {
        self.bodies.get(&id)
    }

    pub fn body_of(&self, entity: EntityId) -> Option<&PhyBody> {
        self.entities.get(&entity).and_then(|id| self.bodies.get(id))
    }

    /// 刚体当前的物理位姿（桌面局部空间）
    pub fn body_pose(&self, id: BodyId) -> Option<Mat4> {
        let world = self.world.as_ref()?;
        let handle = self.bodies.get(&id)?.rigid_body_handle()?;
        world.rigid_body_set.get(handle).map(|rb| isometry_to_mat4(rb.position()))
    }

    /// 世界中的刚体数量（不含地面）
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn joint_count(&self) -> usize {
        self.world
            .as_ref()
            .map(|w| w.impulse_joint_set.len())
            .unwrap_or(0)
    }

    // ========== 释放 ==========

    /// 释放原生资源（可重复调用）
    pub fn dispose(&mut self) {
        let Some(world) = self.world.take() else {
            return;
        };
        world.release();
        self.flippers.clear();
        self.entities.clear();
        self.published.clear();
        self.initial.clear();
        for body in self.bodies.values_mut() {
            body.native = NativeBody::Removed;
        }
        self.release_count += 1;
        log::info!("[物理世界] 已释放");
    }

    pub fn is_disposed(&self) -> bool {
        self.world.is_none()
    }

    /// 原生资源实际被释放的次数（0 或 1）
    pub fn release_count(&self) -> u32 {
        self.release_count
    }
}

impl Default for PhysicsHub {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PhysicsHub {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::body::PhyType;
    use crate::physics::flipper::build_flipper;
    use crate::physics::gate::build_gate;
    use crate::physics::static_body::build_playfield;
    use crate::table::{FlipperData, GateData, MeshData, PlayfieldData};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn hub() -> PhysicsHub {
        let _ = env_logger::builder().is_test(true).try_init();
        PhysicsHub::with_config(PhysicsConfig::default())
    }

    fn run_frames(hub: &mut PhysicsHub, frames: usize) {
        for _ in 0..frames {
            hub.update(1.0 / 60.0).unwrap();
        }
    }

    fn flipper_data() -> FlipperData {
        FlipperData {
            start_angle: 0.0,
            end_angle: 60.0,
            position: Vec3::new(400.0, 1700.0, 0.0),
            ..Default::default()
        }
    }

    fn gate_data() -> GateData {
        GateData {
            position: Vec3::new(200.0, 300.0, 50.0),
            wires: vec![MeshData::new(
                vec![Vec3::new(-40.0, -2.0, 0.0), Vec3::new(40.0, 2.0, 50.0), Vec3::ZERO],
                vec![0, 1, 2],
            )],
            ..Default::default()
        }
    }

    struct Balls(u64);

    impl BallFactory for Balls {
        fn create_ball_entity(&mut self, _world_position: Vec3, _diameter: f32) -> EntityId {
            self.0 += 1;
            EntityId(1000 + self.0)
        }
    }

    #[test]
    fn test_gravity_from_slope() {
        let flat = gravity_vector(9.81, 0.0);
        assert!(flat.abs_diff_eq(Vec3::new(0.0, 0.0, -9810.0), 1e-2));
        let tilted = gravity_vector(9.81, 9.0);
        assert!(tilted.y > 0.0);
        assert!((tilted.length() - 9810.0).abs() < 1e-1);
    }

    #[test]
    fn test_deferred_body_publishes_after_registration() {
        let mut hub = hub();
        let config = hub.config().clone();
        let gate = build_gate(&gate_data(), &config).unwrap();
        let token = hub.add(gate).unwrap().into_deferred().unwrap();
        let id = token.body();

        assert_eq!(hub.body(id).unwrap().registration(), Registration::AwaitingIdentity);
        assert_eq!(hub.joint_count(), 0);
        assert!(hub.transforms().next().is_none());

        token.complete(&mut hub, EntityId(7)).unwrap();
        assert!(hub.body(id).unwrap().is_constraint_finalized());
        assert_eq!(hub.joint_count(), 1);
        assert!(hub.transform(EntityId(7)).is_some());
        assert_eq!(hub.last_gate(), Some(EntityId(7)));

        assert!(matches!(
            hub.register_entity(id, EntityId(8)),
            Err(PhysicsError::AlreadyRegistered(b)) if b == id
        ));
    }

    #[test]
    fn test_scaled_gate_publishes_unit_scale() {
        let mut hub = hub();
        let config = hub.config().clone();
        let data = GateData {
            scale: Vec3::new(1.0, 1.0, 2.0),
            ..gate_data()
        };
        let gate = build_gate(&data, &config).unwrap();
        let token = hub.add(gate).unwrap().into_deferred().unwrap();
        token.complete(&mut hub, EntityId(7)).unwrap();

        let (scale, rotation, _) = hub
            .transform(EntityId(7))
            .unwrap()
            .world
            .to_scale_rotation_translation();
        assert!(scale.abs_diff_eq(Vec3::ONE, 1e-4), "scale {:?}", scale);
        assert!(rotation.abs_diff_eq(Quat::IDENTITY, 1e-4));
    }

    #[test]
    fn test_entity_bound_once() {
        let mut hub = hub();
        let config = hub.config().clone();
        let first = hub
            .add(build_flipper(&flipper_data(), &config))
            .unwrap()
            .into_deferred()
            .unwrap();
        let second = hub
            .add(build_gate(&gate_data(), &config).unwrap())
            .unwrap()
            .into_deferred()
            .unwrap();
        let second_id = second.body();

        first.complete(&mut hub, EntityId(9)).unwrap();
        assert!(matches!(
            second.complete(&mut hub, EntityId(9)),
            Err(PhysicsError::EntityInUse(EntityId(9)))
        ));

        // 第一个刚体仍然可以控制，第二个刚体保持等待状态
        hub.rotate_to_end(EntityId(9)).unwrap();
        assert_eq!(hub.body_of(EntityId(9)).unwrap().phy_type(), PhyType::Flipper);
        assert_eq!(
            hub.body(second_id).unwrap().registration(),
            Registration::AwaitingIdentity
        );
        hub.register_entity(second_id, EntityId(10)).unwrap();
        assert_eq!(hub.last_gate(), Some(EntityId(10)));
    }

    #[test]
    fn test_pivot_offset_maps_to_transform_translation() {
        let mut hub = hub();
        let config = hub.config().clone();
        let gate = build_gate(&gate_data(), &config).unwrap();
        let offset = gate.offset();
        let transform = Mat4::from_rotation_translation(
            Quat::from_rotation_z(0.4),
            Vec3::new(120.0, 640.0, 30.0),
        );
        let id = hub.add_at(gate, transform).unwrap().body();
        let pose = hub.body_pose(id).unwrap();
        assert!(pose
            .transform_point3(offset)
            .abs_diff_eq(Vec3::new(120.0, 640.0, 30.0), 1e-3));
    }

    #[test]
    fn test_flipper_fires_and_retracts() {
        let mut hub = hub();
        let config = hub.config().clone();
        let flipper = build_flipper(&flipper_data(), &config);
        let token = hub.add(flipper).unwrap().into_deferred().unwrap();
        let entity = EntityId(3);
        token.complete(&mut hub, entity).unwrap();

        let states = hub.flipper_states();
        assert_eq!(states.len(), 1);
        assert!(!states[0].solenoid_on);
        assert!(hub.flipper_angle(entity).unwrap() < 1.0);

        hub.rotate_to_end(entity).unwrap();
        let mut previous = hub.flipper_angle(entity).unwrap();
        let mut highest = previous;
        for _ in 0..30 {
            run_frames(&mut hub, 1);
            let angle = hub.flipper_angle(entity).unwrap();
            assert!(angle >= previous - 0.5, "flipper dropped from {} to {}", previous, angle);
            highest = highest.max(angle);
            previous = angle;
        }
        assert!(highest <= 60.5, "swing {} past the end limit", highest);
        let up = hub.flipper_angle(entity).unwrap();
        assert!(up > 45.0, "firing angle {}", up);
        assert!(hub.flipper_states()[0].solenoid_on);

        hub.rotate_to_start(entity).unwrap();
        run_frames(&mut hub, 60);
        let down = hub.flipper_angle(entity).unwrap();
        assert!(down < 15.0, "retracted angle {}", down);

        // 锁定位置：只有旋转变化
        let record = hub.transform(entity).unwrap();
        assert!(record
            .world
            .w_axis
            .truncate()
            .abs_diff_eq(Vec3::new(400.0, 1700.0, 0.0), 1e-3));
    }

    #[test]
    fn test_mass_multiplier_changes_effective_mass() {
        let mut hub = hub();
        let config = hub.config().clone();
        let flipper = build_flipper(&flipper_data(), &config);
        let token = hub.add(flipper).unwrap().into_deferred().unwrap();
        let entity = EntityId(4);
        token.complete(&mut hub, entity).unwrap();

        run_frames(&mut hub, 1);
        let base = hub.flipper_effective_mass(entity).unwrap();
        assert_eq!(hub.flipper_inertia_updates(entity).unwrap(), 1);

        hub.set_flipper_param(FlipperParam::MassMultiplierLog, 1.0);
        run_frames(&mut hub, 2);
        assert_eq!(hub.flipper_effective_mass(entity).unwrap(), base * 10.0);
        assert_eq!(hub.flipper_inertia_updates(entity).unwrap(), 2);
    }

    #[test]
    fn test_unknown_flipper() {
        let mut hub = hub();
        assert!(matches!(
            hub.rotate_to_end(EntityId(99)),
            Err(PhysicsError::UnknownEntity(EntityId(99)))
        ));
        assert!(hub.flipper_angle(EntityId(99)).is_err());
    }

    #[test]
    fn test_flipper_angle_retune() {
        let mut hub = hub();
        let config = hub.config().clone();
        let flipper = build_flipper(&flipper_data(), &config);
        let token = hub.add(flipper).unwrap().into_deferred().unwrap();
        let entity = EntityId(5);
        let id = token.body();
        token.complete(&mut hub, entity).unwrap();

        hub.set_flipper_angles(entity, 0.0, 30.0).unwrap();
        assert_eq!(hub.joint_count(), 1);
        let hinge = hub.body(id).unwrap().hinge().unwrap();
        assert_eq!(hinge.limits, Some([0.0, 30.0f32.to_radians()]));
    }

    #[test]
    fn test_gate_damping() {
        let mut hub = hub();
        let config = hub.config().clone();
        let gate = build_gate(&gate_data(), &config).unwrap();
        let token = hub.add(gate).unwrap().into_deferred().unwrap();
        token.complete(&mut hub, EntityId(11)).unwrap();

        assert_eq!(hub.gate_damping(EntityId(11)).unwrap(), 0.985);
        hub.set_gate_damping(EntityId(11), 0.5).unwrap();
        assert_eq!(hub.gate_damping(EntityId(11)).unwrap(), 0.5);
        assert!(hub.gate_damping(EntityId(12)).is_err());
    }

    #[test]
    fn test_ball_lifecycle() {
        let mut hub = hub();
        let config = hub.config().clone();
        let playfield = build_playfield(&PlayfieldData::default(), config.elasticity_scale);
        let _ = hub.add(playfield).unwrap();

        let mut factory = Balls(0);
        let spawn = BallSpawn {
            local_position: Vec3::new(500.0, 500.0, 100.0),
            ..Default::default()
        };
        let ball = hub.ball_create(&mut factory, spawn).unwrap();
        assert_eq!(ball, EntityId(1001));
        assert_eq!(hub.last_ball(), Some(ball));
        assert_eq!(hub.body_count(), 2);

        run_frames(&mut hub, 10);
        let z = hub.transform(ball).unwrap().world.w_axis.z;
        assert!(z < 100.0, "ball did not fall: {}", z);

        hub.manual_ball_roller(ball, Vec3::new(800.0, 500.0, 0.0)).unwrap();
        run_frames(&mut hub, 1);
        assert!(hub.transform(ball).unwrap().world.w_axis.x > 500.0);

        hub.ball_destroy(ball).unwrap();
        assert!(hub.transform(ball).is_none());
        assert_eq!(hub.body_count(), 1);
        assert_eq!(hub.last_ball(), None);
        assert!(hub.ball_destroy(ball).is_err());
    }

    #[derive(Default)]
    struct Counter {
        steps: u64,
        last_counter: u64,
        published: usize,
    }

    struct SharedCounter(Rc<RefCell<Counter>>);

    impl PhysicsObserver for SharedCounter {
        fn on_physics_step(&mut self, stats: &StepStats) {
            let mut c = self.0.borrow_mut();
            c.steps += 1;
            c.last_counter = stats.step_counter;
        }

        fn on_transforms_published(&mut self, records: &[TransformRecord]) {
            self.0.borrow_mut().published = records.len();
        }
    }

    #[test]
    fn test_observer_sees_every_sub_step() {
        let mut hub = hub();
        let config = hub.config().clone();
        let gate = build_gate(&gate_data(), &config).unwrap();
        hub.add(gate)
            .unwrap()
            .into_deferred()
            .unwrap()
            .complete(&mut hub, EntityId(1))
            .unwrap();

        let counter = Rc::new(RefCell::new(Counter::default()));
        hub.set_observer(Box::new(SharedCounter(counter.clone())));

        let iterations = hub.update(0.010).unwrap();
        assert!(iterations >= 9 && iterations <= 10);
        let c = counter.borrow();
        assert_eq!(c.steps, iterations);
        assert_eq!(c.last_counter, hub.clock().step_counter());
        assert_eq!(c.published, 1);
    }

    #[test]
    fn test_double_dispose() {
        let mut hub = hub();
        let config = hub.config().clone();
        let _ = hub.add(build_playfield(&PlayfieldData::default(), config.elasticity_scale)).unwrap();

        hub.dispose();
        hub.dispose();
        assert!(hub.is_disposed());
        assert_eq!(hub.release_count(), 1);
        assert!(matches!(hub.update(0.016), Err(PhysicsError::Disposed)));
        assert!(matches!(
            hub.add(build_playfield(&PlayfieldData::default(), 1.0)),
            Err(PhysicsError::Disposed)
        ));
        drop(hub);
    }
}
