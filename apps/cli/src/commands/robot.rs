//! 机器人端：文本命令服务

use crate::hardware;
use crate::overrides::{Overrides, PortRole, load_config};
use crate::signal;
use anyhow::{Context, Result};
use clap::Args;
use rover_driver::{Server, SessionContext};
use std::path::Path;
use tracing::{info, warn};

#[derive(Args, Debug)]
pub struct RobotCommand {
    #[command(flatten)]
    pub overrides: Overrides,
}

impl RobotCommand {
    pub fn execute(&self, config_path: Option<&Path>) -> Result<()> {
        let config = load_config(config_path, &self.overrides, PortRole::Command, false)?;
        let motion = hardware::open_motion(&config)?;

        let addr = (config.network.host.as_str(), config.network.port);
        let context = SessionContext::robot(motion.clone()).with_config(config.session_config());
        let server = Server::bind(addr, context)
            .with_context(|| format!("Failed to bind {}:{}", addr.0, addr.1))?;
        let shutdown = server.shutdown_handle();
        signal::install(move || shutdown.shutdown())?;

        info!(
            "Robot listening on {} (speed {}%). Press Ctrl+C to stop.",
            server.local_addr(),
            config.motion.speed
        );
        let result = super::serve(server);

        // 退出前停车；控制器 drop 时释放执行器
        if let Err(e) = motion.stop() {
            warn!("Failed to stop motors on exit: {}", e);
        }
        result
    }
}
