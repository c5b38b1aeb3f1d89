//! 驱动层错误类型定义

use rover_hal::HalError;
use rover_protocol::ProtocolError;
use std::io;
use thiserror::Error;

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// 协议错误（分帧、连接关闭、读写失败）
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 硬件层错误
    #[error("Hardware error: {0}")]
    Hal(#[from] HalError),

    /// 执行器已释放（收到过 CLEANUP）
    #[error("Actuator already released")]
    ActuatorReleased,

    /// IO 错误（bind / accept / 线程创建）
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// 配置值非法
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// 配置文件解析失败
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// 配置序列化失败
    #[error("Config serialize error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    /// 线程未在期限内退出
    #[error("Thread '{0}' did not stop in time")]
    JoinTimeout(String),

    /// 线程 panic
    #[error("Thread '{0}' panicked")]
    ThreadPanicked(String),
}

impl DriverError {
    /// 是否是对端协议违规（长度越界、行过长、中途断开）
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, DriverError::Protocol(e) if e.is_violation())
    }

    /// 是否是对端正常关闭
    pub fn is_peer_closed(&self) -> bool {
        matches!(self, DriverError::Protocol(e) if e.is_closed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_error_display() {
        let err = DriverError::Protocol(ProtocolError::InvalidLength { length: 0 });
        assert!(format!("{}", err).contains("Invalid frame length"));
        assert!(err.is_protocol_violation());
        assert!(!err.is_peer_closed());

        let err = DriverError::from(ProtocolError::Closed);
        assert!(err.is_peer_closed());
        assert!(!err.is_protocol_violation());

        let err = DriverError::JoinTimeout("capture".into());
        assert_eq!(format!("{}", err), "Thread 'capture' did not stop in time");
    }

    #[test]
    fn test_hal_error_conversion() {
        let err: DriverError = HalError::Released.into();
        assert!(matches!(err, DriverError::Hal(HalError::Released)));
    }
}
