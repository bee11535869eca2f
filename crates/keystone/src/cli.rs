use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

/// Keystone: boots modules discovered on disk in dependency order
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Print "pong" and exit
    #[arg(long)]
    pub ping: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Discover and load every module, reporting failures
    Boot(BootArgs),
    /// List the modules found in a modules directory
    List {
        #[arg(long, default_value = "modules")]
        modules_dir: PathBuf,
    },
}

#[derive(Args, Debug)]
pub struct BootArgs {
    /// Directory holding one sub-directory per module, each with a keystone.json
    #[arg(long, default_value = "modules")]
    pub modules_dir: PathBuf,

    /// Configuration file (.json, or .yaml/.toml when built with those features)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Fail any module that is not ready within this many milliseconds
    #[arg(long)]
    pub ready_timeout_ms: Option<u64>,
}

impl BootArgs {
    pub fn ready_timeout(&self) -> Option<Duration> {
        self.ready_timeout_ms.map(Duration::from_millis)
    }

    /// Application root: the parent of the modules directory
    pub fn root_dir(&self) -> PathBuf {
        self.modules_dir
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}
