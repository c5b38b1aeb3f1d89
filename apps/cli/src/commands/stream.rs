//! 机器人端：发送 JPEG 帧，执行检测端回复的命令

use crate::hardware;
use crate::overrides::{Overrides, PortRole, load_config};
use crate::signal;
use anyhow::{Context, Result};
use clap::Args;
use rover_driver::{Streamer, connect};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

#[derive(Args, Debug)]
pub struct StreamCommand {
    #[command(flatten)]
    pub overrides: Overrides,
}

impl StreamCommand {
    pub fn execute(&self, config_path: Option<&Path>) -> Result<()> {
        let config = load_config(config_path, &self.overrides, PortRole::Detection, true)?;
        let stop = Arc::new(AtomicBool::new(false));
        {
            let stop = stop.clone();
            signal::install(move || stop.store(true, Ordering::Release))?;
        }

        let motion = hardware::open_motion(&config)?;
        let client = config.client_config();
        let addr = (config.network.host.as_str(), config.network.detect_port);
        let stream = connect(addr, client.connect_timeout)
            .with_context(|| format!("Failed to connect to detection host at {}:{}", addr.0, addr.1))?;
        let capture = hardware::spawn_capture(&config)?;

        let encode = config.encode_settings();
        info!(
            "Streaming to {}:{} (long side {}, quality {}). Press Ctrl+C to stop.",
            addr.0, addr.1, encode.max_side, encode.quality
        );
        let report = Streamer::new(capture, motion, encode, client, stop).run(stream);
        super::finish("Stream", report)
    }
}
