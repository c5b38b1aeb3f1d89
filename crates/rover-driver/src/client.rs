//! 客户端公共部分（Pilot / Streamer）

use crate::session::SessionConfig;
use crate::DriverError;
use std::io;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, info};

/// 等待新帧的上限
pub const DEFAULT_FRAME_TIMEOUT: Duration = Duration::from_secs(2);
/// 没有新帧时的退避
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(100);
/// 建立连接的超时
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClientConfig {
    pub frame_timeout: Duration,
    pub retry_delay: Duration,
    pub connect_timeout: Duration,
    pub session: SessionConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            frame_timeout: DEFAULT_FRAME_TIMEOUT,
            retry_delay: DEFAULT_RETRY_DELAY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            session: SessionConfig::default(),
        }
    }
}

/// 依次尝试解析出的每个地址，返回第一个连接成功的
pub fn connect(addr: impl ToSocketAddrs, timeout: Duration) -> Result<TcpStream, DriverError> {
    let mut last_error = None;
    for candidate in addr.to_socket_addrs()? {
        debug!("Connecting to {} ...", candidate);
        match TcpStream::connect_timeout(&candidate, timeout) {
            Ok(stream) => {
                info!("Connected to {}", candidate);
                return Ok(stream);
            },
            Err(e) => last_error = Some(e),
        }
    }
    Err(DriverError::Io(last_error.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "address resolved to nothing")
    })))
}
