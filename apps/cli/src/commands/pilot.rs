//! PC 端：本地采集 + 检测，向机器人发送文本命令

use crate::hardware;
use crate::overrides::{Overrides, PortRole, load_config};
use crate::signal;
use anyhow::{Context, Result};
use clap::Args;
use rover_driver::{Pilot, connect};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

#[derive(Args, Debug)]
pub struct PilotCommand {
    #[command(flatten)]
    pub overrides: Overrides,
}

impl PilotCommand {
    pub fn execute(&self, config_path: Option<&Path>) -> Result<()> {
        let config = load_config(config_path, &self.overrides, PortRole::Command, true)?;
        let stop = Arc::new(AtomicBool::new(false));
        {
            let stop = stop.clone();
            signal::install(move || stop.store(true, Ordering::Release))?;
        }

        let client = config.client_config();
        let addr = (config.network.host.as_str(), config.network.port);
        let stream = connect(addr, client.connect_timeout)
            .with_context(|| format!("Failed to connect to robot at {}:{}", addr.0, addr.1))?;
        let capture = hardware::spawn_capture(&config)?;
        let detector = hardware::build_detector(&config);

        info!("Piloting robot at {}:{}. Press Ctrl+C to stop.", addr.0, addr.1);
        let report = Pilot::new(capture, detector, config.mapper(), client, stop).run(stream);
        super::finish("Pilot", report)
    }
}
