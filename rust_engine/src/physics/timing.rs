//! 固定步长时间累积器
//!
//! 外部每帧给出可变的帧间隔，内部以固定步长推进模拟。
//! 帧间隔先经过 [`TimingMode`] 的步调策略处理，再累积到墙钟时间上。

/// 60Hz 一帧的时长（秒）
pub const DT_60FPS: f64 = 1.0 / 60.0;

/// 帧步调策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimingMode {
    /// 不限制：帧间隔原样传入。
    ///
    /// 长时间停顿（如调试器中断）之后，单次调用可能执行任意多个子步。
    RealTime,
    /// 每次调用最多推进一个 60Hz 帧（默认）
    #[default]
    AtLeast60,
    /// 每次调用固定推进一个 60Hz 帧，与实际经过的时间无关（用于录制/回放）
    Locked60,
}

impl TimingMode {
    /// 按策略处理原始帧间隔
    pub fn frame_delta(self, raw_delta: f64) -> f64 {
        let raw_delta = raw_delta.max(0.0);
        match self {
            TimingMode::RealTime => raw_delta,
            TimingMode::AtLeast60 => raw_delta.min(DT_60FPS),
            TimingMode::Locked60 => DT_60FPS,
        }
    }
}

/// 固定步长模拟时钟
#[derive(Debug, Clone)]
pub struct FixedStepClock {
    /// 墙钟时间（累积的帧间隔）
    wall_time: f64,
    /// 固定步长（秒）
    step_duration: f64,
    /// 实际执行的物理步数（模拟时间 = 此值 * 步长）
    executed_steps: u64,
    /// 子步循环的迭代次数
    step_counter: u64,
}

impl FixedStepClock {
    pub fn new(step_duration: f64) -> Self {
        Self {
            wall_time: 0.0,
            step_duration,
            executed_steps: 0,
            step_counter: 0,
        }
    }

    pub fn from_steps_per_second(steps_per_second: u32) -> Self {
        Self::new(1.0 / steps_per_second.max(1) as f64)
    }

    /// 已模拟的时间（秒）
    pub fn simulated_time(&self) -> f64 {
        self.executed_steps as f64 * self.step_duration
    }

    pub fn wall_time(&self) -> f64 {
        self.wall_time
    }

    pub fn step_duration(&self) -> f64 {
        self.step_duration
    }

    /// 子步循环的迭代次数（单调递增）
    pub fn step_counter(&self) -> u64 {
        self.step_counter
    }

    pub fn executed_steps(&self) -> u64 {
        self.executed_steps
    }

    /// 墙钟与模拟时间之差可以容纳的完整步数
    pub fn pending_steps(&self) -> u64 {
        let lag = self.wall_time - self.simulated_time();
        if lag <= 0.0 {
            return 0;
        }
        (lag / self.step_duration).floor() as u64
    }

    /// 推进墙钟并执行所有待处理的子步
    ///
    /// `step` 每次执行一个固定步，返回实际执行的步数（通常为 1）。
    /// 返回 0 表示本次没有推进：模拟时间不变，但仍消耗一次迭代，
    /// 因此循环一定会结束，未推进的时间留给下一次调用。
    ///
    /// 返回本次调用的迭代次数。
    pub fn advance<F>(&mut self, frame_delta: f64, mut step: F) -> u64
    where
        F: FnMut(&FixedStepClock) -> u32,
    {
        self.wall_time += frame_delta.max(0.0);

        let mut pending = self.pending_steps();
        let mut iterations = 0;
        while pending > 0 {
            let executed = step(self);
            self.executed_steps += executed as u64;
            self.step_counter += 1;
            iterations += 1;
            pending -= 1;
        }
        iterations
    }
}
