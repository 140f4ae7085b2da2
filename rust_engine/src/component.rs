//! 宿主组件
//!
//! [`PinballPhysics`] 是宿主引擎挂在桌子上的物理组件：
//! 加载桌面时创建所有刚体，每帧按步调策略推进物理世界，
//! 并把挡板、球相关的命令转发给 [`PhysicsHub`]。

use glam::Vec3;

use crate::physics::{
    build_flipper, build_gate, build_playfield, build_static, get_config, BallFactory,
    DeferredRegistration, EntityId, FlipperParam, PhysicsConfig, PhysicsHub, TimingMode,
};
use crate::table::{BallSpawn, TableDescription};
use crate::{PhysicsError, Result};

/// 桌面准备结果
#[derive(Debug, Default)]
pub struct PreparedTable {
    /// 等待宿主分配实体的刚体（台面、挡板、闸门、静态物体）
    pub registrations: Vec<DeferredRegistration>,
    /// 被跳过的物体名称
    pub skipped: Vec<String>,
}

/// 弹球物理组件
pub struct PinballPhysics {
    hub: PhysicsHub,
    timing_mode: TimingMode,
}

impl PinballPhysics {
    /// 使用全局配置创建
    pub fn new() -> Self {
        Self::with_config(get_config())
    }

    pub fn with_config(config: PhysicsConfig) -> Self {
        let timing_mode = config.timing_mode;
        Self {
            hub: PhysicsHub::with_config(config),
            timing_mode,
        }
    }

    pub fn hub(&self) -> &PhysicsHub {
        &self.hub
    }

    pub fn hub_mut(&mut self) -> &mut PhysicsHub {
        &mut self.hub
    }

    pub fn timing_mode(&self) -> TimingMode {
        self.timing_mode
    }

    pub fn set_timing_mode(&mut self, mode: TimingMode) {
        self.timing_mode = mode;
    }

    /// 由桌面描述创建所有刚体
    ///
    /// 不可碰撞或没有几何的静态物体、导线数量不对的闸门会被跳过并记录日志。
    pub fn prepare_table(&mut self, table: &TableDescription) -> Result<PreparedTable> {
        let config = self.hub.config().clone();
        self.hub.set_local_to_world(table.local_to_world);

        let mut prepared = PreparedTable::default();

        let playfield = build_playfield(&table.playfield, config.elasticity_scale);
        prepared.push(self.hub.add(playfield)?);

        for data in &table.flippers {
            let flipper = build_flipper(data, &config);
            prepared.push(self.hub.add(flipper)?);
        }

        for data in &table.gates {
            match build_gate(data, &config) {
                Ok(gate) => prepared.push(self.hub.add(gate)?),
                Err(err @ PhysicsError::MalformedGate { .. }) => {
                    log::warn!("[桌面] 跳过闸门: {}", err);
                    prepared.skipped.push(data.name.clone());
                }
                Err(err) => return Err(err),
            }
        }

        for source in &table.statics {
            if !source.is_collidable {
                log::debug!("[桌面] 跳过不可碰撞物体 '{}'", source.name);
                prepared.skipped.push(source.name.clone());
                continue;
            }
            match build_static(source, config.elasticity_scale) {
                Ok(body) => prepared.push(self.hub.add(body)?),
                Err(err @ PhysicsError::NoCollisionGeometry(_)) => {
                    log::warn!("[桌面] 跳过静态物体: {}", err);
                    prepared.skipped.push(source.name.clone());
                }
                Err(err) => return Err(err),
            }
        }

        log::info!(
            "[桌面] '{}': {} 个刚体, {} 个挡板, 跳过 {} 个",
            table.name,
            self.hub.body_count(),
            table.flippers.len(),
            prepared.skipped.len()
        );
        Ok(prepared)
    }

    /// 完成延迟注册
    pub fn complete(&mut self, registration: DeferredRegistration, entity: EntityId) -> Result<()> {
        registration.complete(&mut self.hub, entity)
    }

    /// 每帧调用：按步调策略处理帧间隔，返回执行的子步数
    pub fn update(&mut self, raw_delta: f64) -> Result<u64> {
        let frame_delta = self.timing_mode.frame_delta(raw_delta);
        self.hub.update(frame_delta)
    }

    /// 生成球：位置、速度、缩放、质量、半径都取自请求
    pub fn ball_create<F: BallFactory + ?Sized>(
        &mut self,
        factory: &mut F,
        spawn: BallSpawn,
    ) -> Result<EntityId> {
        self.hub.ball_create(factory, spawn)
    }

    /// 由世界坐标得到桌面局部坐标（生成球时填写 `local_position`）
    pub fn world_to_local(&self, world_position: Vec3) -> Vec3 {
        self.hub.world_to_local().transform_point3(world_position)
    }

    pub fn ball_destroy(&mut self, entity: EntityId) -> Result<()> {
        self.hub.ball_destroy(entity)
    }

    /// 挡板通电
    pub fn on_rotate_to_end(&mut self, entity: EntityId) -> Result<()> {
        self.hub.rotate_to_end(entity)
    }

    /// 挡板断电
    pub fn on_rotate_to_start(&mut self, entity: EntityId) -> Result<()> {
        self.hub.rotate_to_start(entity)
    }

    /// 把最近生成的球推向世界坐标 `target`；没有球时什么都不做
    pub fn manual_ball_roller(&mut self, target: Vec3) -> Result<()> {
        match self.hub.last_ball() {
            Some(ball) => self.hub.manual_ball_roller(ball, target),
            None => {
                log::debug!("[手动滚球] 没有球");
                Ok(())
            }
        }
    }

    pub fn get_float(&self, param: FlipperParam) -> f32 {
        self.hub.flipper_param(param)
    }

    pub fn set_float(&mut self, param: FlipperParam, value: f32) {
        self.hub.set_flipper_param(param, value);
    }
}

impl Default for PinballPhysics {
    fn default() -> Self {
        Self::new()
    }
}

impl PreparedTable {
    fn push(&mut self, outcome: crate::physics::AddOutcome) {
        if let Some(token) = outcome.into_deferred() {
            self.registrations.push(token);
        }
    }
}
