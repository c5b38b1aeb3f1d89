//! 配置管理命令
//!
//! 查看生效配置、生成默认配置文件

use crate::overrides::{Overrides, PortRole};
use anyhow::{Context, Result, bail};
use clap::Subcommand;
use rover_driver::RoverConfig;
use std::path::{Path, PathBuf};

fn target_path(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => RoverConfig::default_path().ok_or_else(|| anyhow::anyhow!("Cannot determine config directory")),
    }
}

/// 配置命令
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// 打印生效的配置（配置文件 + 环境变量 / 命令行覆盖）
    Show {
        #[command(flatten)]
        overrides: Overrides,
    },

    /// 打印配置文件路径
    Path,

    /// 写入默认配置文件
    Init {
        /// 覆盖已存在的文件
        #[arg(long)]
        force: bool,
    },
}

impl ConfigCommand {
    pub fn execute(self, config_path: Option<&Path>) -> Result<()> {
        match self {
            ConfigCommand::Show { overrides } => Self::show_(config_path, &overrides),

            ConfigCommand::Path => Self::path_(config_path),

            ConfigCommand::Init { force } => Self::init_(config_path, force),
        }
    }

    fn show_(config_path: Option<&Path>, overrides: &Overrides) -> Result<()> {
        let mut config = RoverConfig::load(config_path).context("Failed to load config")?;
        overrides.apply(&mut config, PortRole::Command);
        print!("{}", config.to_toml_string()?);

        if let Err(e) = config.validate() {
            eprintln!("⚠️  {}", e);
        }
        Ok(())
    }

    fn path_(config_path: Option<&Path>) -> Result<()> {
        let path = target_path(config_path)?;
        let status = if path.is_file() { "exists" } else { "not found, using defaults" };
        println!("{} ({})", path.display(), status);
        Ok(())
    }

    fn init_(config_path: Option<&Path>, force: bool) -> Result<()> {
        let path = target_path(config_path)?;
        if path.exists() && !force {
            bail!("{} already exists (use --force to overwrite)", path.display());
        }
        RoverConfig::default()
            .save_to_file(&path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("✅ Wrote default config to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_writes_loadable_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rover").join("config.toml");

        ConfigCommand::Init { force: false }.execute(Some(&path)).unwrap();
        let loaded = RoverConfig::load(Some(&path)).unwrap();
        assert_eq!(loaded, RoverConfig::default());

        // 已存在且未加 --force
        assert!(ConfigCommand::Init { force: false }.execute(Some(&path)).is_err());
        assert!(ConfigCommand::Init { force: true }.execute(Some(&path)).is_ok());
    }

    #[test]
    fn test_show_missing_explicit_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");
        let cmd = ConfigCommand::Show {
            overrides: Overrides::default(),
        };
        assert!(cmd.execute(Some(&path)).is_err());
    }
}
