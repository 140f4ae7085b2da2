//! 物理配置
//!
//! 所有参数扁平化。`PhysicsHub::new()` 创建时读取一次全局配置快照，
//! 之后对全局配置的修改不会影响已创建的物理世界。

use once_cell::sync::Lazy;
use std::sync::RwLock;

use super::timing::TimingMode;

/// 物理配置（扁平化，不嵌套）
#[derive(Debug, Clone)]
pub struct PhysicsConfig {
    // ========== 重力 ==========
    /// 重力加速度（m/s²），默认 9.81
    pub gravity: f32,
    /// 桌面倾角（度），默认 9.0
    pub slope: f32,

    // ========== 模拟参数 ==========
    /// 内部固定步频（每秒步数），默认 1000
    pub steps_per_second: u32,
    /// 求解器迭代次数，默认 4
    pub solver_iterations: usize,
    /// 帧步调策略，默认 AtLeast60
    pub timing_mode: TimingMode,

    // ========== 挡板（flipper）==========
    /// 挡板加速度（通电时的力），默认 1.5
    pub flipper_acceleration: f32,
    /// 挡板质量倍率（以 10 为底的对数）：-1=0.1, 0=1, 1=10, 2=100
    pub flipper_mass_multiplier_log: f32,
    /// 断电时力的缩放（off = on * 此值），默认 0.1
    pub flipper_solenoid_off_acceleration_scale: f32,
    /// 接近行程末端时力的缩放，默认 0.1
    pub flipper_on_near_end_acceleration_scale: f32,
    /// "接近末端" 的角度阈值（度），默认 5.0
    pub flipper_number_of_degree_near_end: f32,
    /// 只生成前侧的一个盒子（false 时两侧都生成）
    pub flipper_front_box_only: bool,

    // ========== 材质 ==========
    /// 弹性系数缩放（桌面数据里的 elasticity 乘以此值作为 restitution）
    pub elasticity_scale: f32,
    /// 球的摩擦系数
    pub ball_friction: f32,
    /// 球的弹性系数
    pub ball_restitution: f32,
    /// 闸门质量
    pub gate_mass: f32,

    // ========== 调试 ==========
    /// 是否输出调试日志，默认 false
    pub debug_log: bool,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            // ====== 重力 ======
            // 桌面坐标是毫米，重力在内部乘以 1000
            gravity: 9.81,
            slope: 9.0,

            // ====== 模拟参数 ======
            // 1000Hz 内部步频，与渲染帧率解耦
            steps_per_second: 1000,
            solver_iterations: 4,
            timing_mode: TimingMode::AtLeast60,

            // ====== 挡板 ======
            flipper_acceleration: 1.5,
            flipper_mass_multiplier_log: 0.0,
            flipper_solenoid_off_acceleration_scale: 0.1,
            flipper_on_near_end_acceleration_scale: 0.1,
            flipper_number_of_degree_near_end: 5.0,
            flipper_front_box_only: true,

            // ====== 材质 ======
            // 弹性系数按乘法组合（两个物体的 restitution 相乘），
            // 桌面数据的 elasticity 很小，因此放大 100 倍
            elasticity_scale: 100.0,
            ball_friction: 0.1,
            ball_restitution: 0.01,
            gate_mass: 0.2,

            // ====== 调试 ======
            debug_log: false,
        }
    }
}

impl PhysicsConfig {
    /// 固定步长（秒）
    pub fn step_duration(&self) -> f64 {
        1.0 / self.steps_per_second.max(1) as f64
    }

    /// 读取可调参数
    pub fn flipper_param(&self, param: FlipperParam) -> f32 {
        match param {
            FlipperParam::Acceleration => self.flipper_acceleration,
            FlipperParam::MassMultiplierLog => self.flipper_mass_multiplier_log,
            FlipperParam::SolenoidOffScale => self.flipper_solenoid_off_acceleration_scale,
            FlipperParam::OnNearEndScale => self.flipper_on_near_end_acceleration_scale,
            FlipperParam::DegreesNearEnd => self.flipper_number_of_degree_near_end,
        }
    }

    /// 写入可调参数
    pub fn set_flipper_param(&mut self, param: FlipperParam, value: f32) {
        let slot = match param {
            FlipperParam::Acceleration => &mut self.flipper_acceleration,
            FlipperParam::MassMultiplierLog => &mut self.flipper_mass_multiplier_log,
            FlipperParam::SolenoidOffScale => &mut self.flipper_solenoid_off_acceleration_scale,
            FlipperParam::OnNearEndScale => &mut self.flipper_on_near_end_acceleration_scale,
            FlipperParam::DegreesNearEnd => &mut self.flipper_number_of_degree_near_end,
        };
        *slot = value;
    }
}

/// 挡板可调参数（调试面板滑块）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlipperParam {
    Acceleration,
    MassMultiplierLog,
    SolenoidOffScale,
    OnNearEndScale,
    DegreesNearEnd,
}

/// 全局配置实例
static PHYSICS_CONFIG: Lazy<RwLock<PhysicsConfig>> = Lazy::new(|| {
    RwLock::new(PhysicsConfig::default())
});

/// 获取当前配置（只读）
pub fn get_config() -> PhysicsConfig {
    PHYSICS_CONFIG
        .read()
        .map(|c| c.clone())
        .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
}

/// 手动设置配置（用于运行时调试）
pub fn set_config(config: PhysicsConfig) {
    match PHYSICS_CONFIG.write() {
        Ok(mut guard) => *guard = config,
        Err(poisoned) => *poisoned.into_inner() = config,
    }
}

/// 重置为默认配置
pub fn reset_config() {
    set_config(PhysicsConfig::default());
}
