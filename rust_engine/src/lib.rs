//! Pinball Physics - Rust 实现的弹球桌刚体物理桥
//!
//! 把 Rapier3D 物理引擎接入宿主的实体系统：
//! - 由桌面描述创建台面、挡板、闸门、静态物体、球的刚体和约束
//! - 以固定步长推进物理世界，与可变帧率解耦
//! - 按电磁线圈状态驱动挡板
//! - 把刚体变换发布回宿主实体

pub mod component;
pub mod math;
pub mod physics;
pub mod table;

pub use component::{PinballPhysics, PreparedTable};
pub use physics::{
    BodyId, DeferredRegistration, EntityId, PhyBody, PhyType, PhysicsConfig, PhysicsHub,
    TimingMode, TransformRecord,
};
pub use table::TableDescription;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PhysicsError {
    #[error("no collision geometry: {0}")]
    NoCollisionGeometry(String),

    #[error("gate '{name}' must have exactly one wire, found {wires}")]
    MalformedGate { name: String, wires: usize },

    #[error("unknown entity: {0}")]
    UnknownEntity(EntityId),

    #[error("unknown body: {0:?}")]
    UnknownBody(BodyId),

    #[error("body {0:?} is already registered")]
    AlreadyRegistered(BodyId),

    #[error("entity {0} is already bound to another body")]
    EntityInUse(EntityId),

    #[error("body '{0}' is already in the world")]
    AlreadyInWorld(String),

    #[error("physics world has been disposed")]
    Disposed,
}

pub type Result<T> = std::result::Result<T, PhysicsError>;
