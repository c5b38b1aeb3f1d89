//! TCP 服务端
//!
//! 串行 accept，每个连接一个独立线程（`session-N`）。会话之间互不影响：
//! 一个会话的错误只关闭它自己。

use crate::join::{JOIN_TIMEOUT, JoinTimeout};
use crate::session::{Session, SessionContext, SessionReport};
use crate::DriverError;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// accept 出错后的退避（例如文件描述符耗尽）
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);
/// 唤醒 accept 的自连接超时
const WAKE_TIMEOUT: Duration = Duration::from_millis(200);
/// 会话报告队列容量，满了之后新报告被丢弃（只计数）
pub const REPORT_QUEUE_CAPACITY: usize = 64;

/// 服务端会话计数（原子操作，无锁读取）
#[derive(Debug, Default)]
pub struct ServerStats {
    pub(crate) accepted: AtomicU64,
    pub(crate) closed_clean: AtomicU64,
    pub(crate) aborted: AtomicU64,
    pub(crate) reports_dropped: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerStatsSnapshot {
    pub accepted: u64,
    pub closed_clean: u64,
    pub aborted: u64,
    pub reports_dropped: u64,
}

impl ServerStatsSnapshot {
    pub fn finished(&self) -> u64 {
        self.closed_clean + self.aborted
    }
}

impl ServerStats {
    pub fn snapshot(&self) -> ServerStatsSnapshot {
        ServerStatsSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            closed_clean: self.closed_clean.load(Ordering::Acquire),
            aborted: self.aborted.load(Ordering::Acquire),
            reports_dropped: self.reports_dropped.load(Ordering::Relaxed),
        }
    }

    fn record(&self, clean: bool) {
        let counter = if clean { &self.closed_clean } else { &self.aborted };
        counter.fetch_add(1, Ordering::Release);
    }
}

pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    context: SessionContext,
    stop: Arc<AtomicBool>,
    stats: Arc<ServerStats>,
    // 只有调用过 `reports()` 才会创建
    reports_tx: Mutex<Option<Sender<SessionReport>>>,
}

/// 从其他线程（如 Ctrl-C 处理器）停止服务端
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    stop: Arc<AtomicBool>,
    wake_addr: SocketAddr,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        if self.stop.swap(true, Ordering::AcqRel) {
            return;
        }
        // 连接自己一次，让阻塞中的 accept 返回
        if let Err(e) = TcpStream::connect_timeout(&self.wake_addr, WAKE_TIMEOUT) {
            debug!("Wake-up connect to {} failed: {}", self.wake_addr, e);
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }
}

impl Server {
    pub fn bind(addr: impl ToSocketAddrs, context: SessionContext) -> Result<Self, DriverError> {
        Self::bind_with_stop(addr, context, Arc::new(AtomicBool::new(false)))
    }

    /// 使用外部停止标志（与其他循环共享）
    pub fn bind_with_stop(
        addr: impl ToSocketAddrs,
        context: SessionContext,
        stop: Arc<AtomicBool>,
    ) -> Result<Self, DriverError> {
        let listener = TcpListener::bind(addr)?;
        let local_addr = listener.local_addr()?;
        info!(
            "Server listening on {} ({})",
            local_addr,
            context.role.mode().as_str()
        );
        Ok(Self {
            listener,
            local_addr,
            context,
            stop,
            stats: Arc::new(ServerStats::default()),
            reports_tx: Mutex::new(None),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        let wake_ip = match self.local_addr.ip() {
            IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
            IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
            ip => ip,
        };
        ShutdownHandle {
            stop: self.stop.clone(),
            wake_addr: SocketAddr::new(wake_ip, self.local_addr.port()),
        }
    }

    pub fn stats(&self) -> Arc<ServerStats> {
        self.stats.clone()
    }

    /// 订阅已结束会话的报告
    ///
    /// 队列有界（[`REPORT_QUEUE_CAPACITY`]），没人读时多出的报告被丢弃并计入
    /// `reports_dropped`。再次调用会替换之前的订阅。只影响之后 accept 的会话。
    pub fn reports(&self) -> Receiver<SessionReport> {
        let (tx, rx) = crossbeam_channel::bounded(REPORT_QUEUE_CAPACITY);
        *self.reports_tx.lock() = Some(tx);
        rx
    }

    /// 运行 accept 循环直到停止标志置位
    ///
    /// 返回前等待仍在运行的会话退出（会话在下一次读超时时看到停止标志）。
    pub fn run(&self) -> Result<(), DriverError> {
        let mut sessions: Vec<JoinHandle<()>> = Vec::new();
        let mut next_id: u64 = 0;

        while !self.stop.load(Ordering::Acquire) {
            let (stream, peer) = match self.listener.accept() {
                Ok(conn) => conn,
                Err(e) => {
                    if self.stop.load(Ordering::Acquire) {
                        break;
                    }
                    warn!("Accept failed: {}", e);
                    thread::sleep(ACCEPT_ERROR_BACKOFF);
                    continue;
                },
            };
            if self.stop.load(Ordering::Acquire) {
                debug!("Dropping connection from {} during shutdown", peer);
                break;
            }

            next_id += 1;
            self.stats.accepted.fetch_add(1, Ordering::Relaxed);
            info!("Connection #{} from {}", next_id, peer);
            let session = Session::new(self.context.clone(), self.stop.clone());
            let stats = self.stats.clone();
            let reports = self.reports_tx.lock().clone();
            let spawned = thread::Builder::new()
                .name(format!("session-{}", next_id))
                .spawn(move || {
                    let report = session.run(stream);
                    let clean = report.close_reason.is_clean();
                    if let Some(reports) = reports {
                        match reports.try_send(report) {
                            Ok(()) | Err(TrySendError::Disconnected(_)) => {},
                            Err(TrySendError::Full(_)) => {
                                stats.reports_dropped.fetch_add(1, Ordering::Relaxed);
                            },
                        }
                    }
                    // 最后计数：看到会话结束时，它的报告已入队或已计入丢弃
                    stats.record(clean);
                });
            match spawned {
                Ok(handle) => sessions.push(handle),
                Err(e) => error!("Failed to spawn session thread for {}: {}", peer, e),
            }
            sessions.retain(|h| !h.is_finished());
        }

        info!("Server on {} stopping ({} live sessions)", self.local_addr, sessions.len());
        for handle in sessions {
            if let Err(e) = handle.join_timeout(self.context.config.read_timeout + JOIN_TIMEOUT) {
                warn!("Session shutdown: {}", e);
            }
        }
        Ok(())
    }
}
