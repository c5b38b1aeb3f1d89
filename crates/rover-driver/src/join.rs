//! 带超时的线程 join

use crate::DriverError;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// 后台线程停止时的默认等待上限
pub(crate) const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

pub(crate) trait JoinTimeout {
    fn join_timeout(self, timeout: Duration) -> Result<(), DriverError>;
}

impl<T: Send + 'static> JoinTimeout for JoinHandle<T> {
    fn join_timeout(self, timeout: Duration) -> Result<(), DriverError> {
        let name = self.thread().name().unwrap_or("<unnamed>").to_string();
        let (tx, rx) = crossbeam_channel::bounded(1);

        // 看门狗线程代为 join；超时后它继续等待，进程退出时由 OS 回收
        thread::spawn(move || {
            let _ = tx.send(self.join().is_ok());
        });

        match rx.recv_timeout(timeout) {
            Ok(true) => Ok(()),
            Ok(false) => Err(DriverError::ThreadPanicked(name)),
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => Err(DriverError::JoinTimeout(name)),
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                Err(DriverError::ThreadPanicked(name))
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_timeout_ok() {
        let handle = thread::Builder::new()
            .name("quick".into())
            .spawn(|| {})
            .unwrap();
        handle.join_timeout(Duration::from_secs(1)).unwrap();
    }

    #[test]
    fn test_join_timeout_expires() {
        let handle = thread::Builder::new()
            .name("slow".into())
            .spawn(|| thread::sleep(Duration::from_millis(300)))
            .unwrap();
        match handle.join_timeout(Duration::from_millis(20)) {
            Err(DriverError::JoinTimeout(name)) => assert_eq!(name, "slow"),
            other => panic!("Expected JoinTimeout, got {:?}", other),
        }
    }

    #[test]
    fn test_join_timeout_reports_panic() {
        let handle = thread::Builder::new()
            .name("boom".into())
            .spawn(|| panic!("boom"))
            .unwrap();
        assert!(matches!(
            handle.join_timeout(Duration::from_secs(1)),
            Err(DriverError::ThreadPanicked(_))
        ));
    }
}
