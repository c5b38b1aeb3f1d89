//! 命令定义和实现

pub mod config;
pub mod detect;
pub mod pilot;
pub mod robot;
pub mod stream;

pub use config::ConfigCommand;
pub use detect::DetectCommand;
pub use pilot::PilotCommand;
pub use robot::RobotCommand;
pub use stream::StreamCommand;

use anyhow::{Result, bail};
use rover_driver::{SessionReport, Server};
use tracing::{info, warn};

/// 运行服务端直到 Ctrl-C，然后汇总会话结果
fn serve(server: Server) -> Result<()> {
    let stats = server.stats();
    server.run()?;

    let stats = stats.snapshot();
    info!(
        "Server stopped: {} sessions accepted, {} closed, {} aborted",
        stats.accepted, stats.closed_clean, stats.aborted
    );
    Ok(())
}

/// 客户端会话结束：非正常结束时返回错误（进程退出码非 0）
fn finish(role: &str, report: SessionReport) -> Result<()> {
    info!(
        "{} session summary: {} units, {} commands, {} idle timeouts, {:.1} fps",
        role, report.units, report.commands_sent, report.idle_timeouts, report.fps
    );
    if report.close_reason.is_clean() {
        Ok(())
    } else {
        warn!("{} session ended abnormally", role);
        bail!("{} session aborted: {}", role, report.close_reason)
    }
}
