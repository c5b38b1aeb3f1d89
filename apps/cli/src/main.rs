//! # Rover CLI
//!
//! 视觉导航链路的命令行入口，每个子命令对应一种部署角色。
//!
//! ## 单机模式（检测在 PC 上，机器人只收命令）
//!
//! ```bash
//! # 机器人：监听文本命令，驱动电机
//! rover robot --port 8000
//!
//! # PC：本地采集 + 检测，向机器人发送命令
//! rover pilot --host 192.168.1.20 --port 8000
//! ```
//!
//! ## 流式模式（机器人发送 JPEG，检测端回复命令）
//!
//! ```bash
//! # 检测端
//! rover detect --port 5000 --conf 0.4
//!
//! # 机器人
//! rover stream --host 192.168.1.10 --port 5000 --image-size 320 --quality 80
//! ```
//!
//! 所有参数都可以写在配置文件（`rover config show` 查看生效值）或通过 `ROVER_*` 环境变量覆盖。

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod hardware;
mod overrides;
mod signal;

use commands::{ConfigCommand, DetectCommand, PilotCommand, RobotCommand, StreamCommand};

/// Rover CLI - 视觉导航链路
#[derive(Parser, Debug)]
#[command(name = "rover")]
#[command(about = "Vision-driven navigation link between a camera robot and a detection host", long_about = None)]
#[command(version)]
struct Cli {
    /// 输出调试日志
    #[arg(short, long, global = true)]
    verbose: bool,

    /// 配置文件路径（默认：<config_dir>/rover/config.toml）
    #[arg(short, long, global = true, env = "ROVER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 机器人端：接收文本命令并驱动电机
    Robot {
        #[command(flatten)]
        args: RobotCommand,
    },

    /// PC 端：本地采集和检测，向机器人发送文本命令
    Pilot {
        #[command(flatten)]
        args: PilotCommand,
    },

    /// 检测端：接收 JPEG 帧，回复文本命令
    Detect {
        #[command(flatten)]
        args: DetectCommand,
    },

    /// 机器人端：发送 JPEG 帧，执行回复的命令
    Stream {
        #[command(flatten)]
        args: StreamCommand,
    },

    /// 配置管理
    #[command(subcommand)]
    Config(ConfigCommand),
}

fn init_tracing(verbose: bool) -> Result<()> {
    let default_level = if verbose { "rover=debug" } else { "rover=info" };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.parse()?))
        .with_thread_names(true)
        .init();
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Robot { args } => args.execute(config_path),

        Commands::Pilot { args } => args.execute(config_path),

        Commands::Detect { args } => args.execute(config_path),

        Commands::Stream { args } => args.execute(config_path),

        Commands::Config(cmd) => cmd.execute(config_path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_stream_with_overrides() {
        let cli = Cli::try_parse_from([
            "rover",
            "-v",
            "stream",
            "--host",
            "10.0.0.2",
            "--port",
            "5001",
            "--quality",
            "60",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Stream { args } => {
                assert_eq!(args.overrides.host.as_deref(), Some("10.0.0.2"));
                assert_eq!(args.overrides.port, Some(5001));
                assert_eq!(args.overrides.quality, Some(60));
            },
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_subcommand_rejected() {
        assert!(Cli::try_parse_from(["rover", "fly"]).is_err());
    }
}
