//! 检测端：接收 JPEG 帧，回复文本命令

use crate::hardware;
use crate::overrides::{Overrides, PortRole, load_config};
use crate::signal;
use anyhow::{Context, Result};
use clap::Args;
use rover_driver::{Server, SessionContext};
use std::path::Path;
use tracing::info;

#[derive(Args, Debug)]
pub struct DetectCommand {
    #[command(flatten)]
    pub overrides: Overrides,
}

impl DetectCommand {
    pub fn execute(&self, config_path: Option<&Path>) -> Result<()> {
        let config = load_config(config_path, &self.overrides, PortRole::Detection, false)?;
        let detector = hardware::build_detector(&config);

        let addr = (config.network.host.as_str(), config.network.detect_port);
        let context = SessionContext::detection(detector, config.mapper()).with_config(config.session_config());
        let server = Server::bind(addr, context)
            .with_context(|| format!("Failed to bind {}:{}", addr.0, addr.1))?;
        let shutdown = server.shutdown_handle();
        signal::install(move || shutdown.shutdown())?;

        info!(
            "Detection server on {} (conf {}, iou {}, steering {:?}). Press Ctrl+C to stop.",
            server.local_addr(),
            config.detection.conf_threshold,
            config.detection.iou_threshold,
            config.detection.steering
        );
        super::serve(server)
    }
}
