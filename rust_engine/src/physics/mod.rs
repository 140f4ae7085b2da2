//! 弹球物理系统模块
//!
//! 使用 Rapier3D 物理引擎实现弹球桌的刚体模拟。
//!
//! ## 功能对应关系
//! | 桌面元素 | Rapier |
//! |----------|--------|
//! | 台面 | 固定刚体 + cuboid |
//! | 墙、橡胶等静态物体 | 固定刚体 + trimesh |
//! | 球 | 动态刚体 + ball |
//! | 挡板 | 动态刚体 + compound(cylinder, cuboid) + 带限制的铰链 |
//! | 闸门 | 动态刚体 + cuboid + 无限制的铰链 |

mod ball;
mod body;
pub mod config;
mod flipper;
mod gate;
mod hub;
mod observer;
mod registration;
mod static_body;
pub mod timing;

pub use ball::{build_ball, BallFactory, BallState};
pub use body::{BodyId, BodyKind, CollisionMap, HingeParams, PhyBody, PhyType, EVERYTHING};
pub use config::{get_config, reset_config, set_config, FlipperParam, PhysicsConfig};
pub use flipper::{
    build_flipper, flipper_shape, FlipperDebugState, FlipperRegistry, FlipperState, FlipperTuning,
    SolenoidState, TORQUE_SCALE,
};
pub use gate::{build_gate, GateState};
pub use hub::{gravity_vector, AddOutcome, PhysicsHub};
pub use observer::{PhysicsObserver, StepStats};
pub use registration::{DeferredRegistration, EntityId, Registration, TransformRecord};
pub use static_body::{build_playfield, build_static};
pub use timing::{FixedStepClock, TimingMode, DT_60FPS};
