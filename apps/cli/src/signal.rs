//! Ctrl-C 处理

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};

/// 安装 Ctrl-C 处理器
///
/// 第一次 Ctrl-C 调用 `on_interrupt`（置位停止标志 / 唤醒服务端），第二次直接退出进程。
pub fn install(on_interrupt: impl Fn() + Send + 'static) -> Result<()> {
    let interrupted = AtomicBool::new(false);
    ctrlc::set_handler(move || {
        if interrupted.swap(true, Ordering::AcqRel) {
            eprintln!("\nReceived second interrupt, exiting immediately");
            std::process::exit(130);
        }
        eprintln!("\nReceived interrupt signal. Shutting down...");
        on_interrupt();
    })
    .context("Failed to set signal handler")
}
