//! 物理步观察者
//!
//! 调试面板等外部组件通过 [`PhysicsObserver`] 接收每步统计和发布通知。

use super::registration::TransformRecord;

/// 一个物理子步的统计信息
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepStats {
    /// 子步循环的迭代次数
    pub step_counter: u64,
    /// 已模拟的时间（秒）
    pub simulated_time: f64,
    /// 本次执行的步数
    pub steps: u32,
    /// 本次子步耗时（毫秒）
    pub elapsed_ms: f64,
}

/// 可选的观察者，所有方法默认为空
pub trait PhysicsObserver {
    /// 每个子步结束后调用
    fn on_physics_step(&mut self, _stats: &StepStats) {}

    /// 每个子步发布变换之后调用
    fn on_transforms_published(&mut self, _records: &[TransformRecord]) {}
}
