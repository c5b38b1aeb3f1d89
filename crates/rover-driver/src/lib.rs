//! # Rover Driver
//!
//! 运行时核心：帧缓冲、采集线程、会话循环与运动控制。
//!
//! ## 数据流
//!
//! ```text
//! FrameSource → CaptureThread → FrameBuffer → (Pilot | Streamer)
//!                                                │
//!                       Detector → CommandMapper ┘ → 线路编解码 → 对端 Session
//!                                                                   │
//!                                                       MotionController → Actuator
//! ```
//!
//! ## 部署角色
//!
//! | 角色 | 组件 | 分帧 |
//! |------|------|------|
//! | robot | [`Server`] + [`SessionRole::Robot`] | 文本命令进 |
//! | detect | [`Server`] + [`SessionRole::Detection`] | JPEG 帧进，命令出 |
//! | pilot | [`Pilot`] | 命令出 |
//! | stream | [`Streamer`] | JPEG 帧出，命令进 |

pub mod capture;
pub mod client;
pub mod config;
mod error;
pub mod fps_stats;
pub mod frame_buffer;
mod join;
pub mod mapper;
pub mod motion;
pub mod pilot;
pub mod server;
pub mod session;
pub mod streamer;

pub use capture::{CaptureStats, CaptureThread};
pub use client::{ClientConfig, connect};
pub use config::RoverConfig;
pub use error::DriverError;
pub use fps_stats::FpsEstimator;
pub use frame_buffer::{BufferStats, FrameBuffer};
pub use mapper::{CommandMapper, SteeringMode, TriggerTable, TriggerTier};
pub use motion::{Direction, DriveVector, MotionConfig, MotionController, MotionOutcome, MotionState};
pub use pilot::Pilot;
pub use server::{REPORT_QUEUE_CAPACITY, Server, ServerStats, ServerStatsSnapshot, ShutdownHandle};
pub use session::{
    AtomicSessionState, CloseReason, Session, SessionConfig, SessionContext, SessionReport, SessionRole,
    SessionState, SharedDetector, SharedMotion,
};
pub use streamer::{EncodeSettings, Streamer};
