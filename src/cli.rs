//! Command-line surface

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Command-line client for an MQTT broker with retained-state backup and restore
#[derive(Debug, Parser)]
#[command(name = "mqtt-cli")]
#[command(about = "MQTT client with retained-message backup, restore and purge")]
#[command(version)]
pub struct Cli {
    /// Verbose logging (-v for every action, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Stop subscription commands after this many seconds
    #[arg(long, value_name = "SECS", global = true)]
    pub timeout: Option<u64>,

    /// Configuration file path
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Broker URL (mqtt://, tcp://, mqtts://, ssl://, tls://)
    #[arg(long, env = "MQTT_URL", global = true, hide_env_values = true)]
    pub url: Option<String>,

    /// JWT used as the connection password
    #[arg(long, env = "JWT", global = true, hide_env_values = true)]
    pub jwt: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Print every message on a topic filter
    Sub { filter: String },
    /// Clear every retained message under a topic filter
    Clear { filter: String },
    /// Clear the exact topics listed in a file (or stdin), one per line
    Purge { file: Option<PathBuf> },
    /// Publish one message
    Pub {
        topic: String,
        message: String,
        /// Store the message as the topic's retained value
        #[arg(short, long)]
        retain: bool,
        /// Quality of service level
        #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(0..=2))]
        qos: u8,
    },
    /// Append retained messages under a topic filter to a backup file
    Backup {
        filter: String,
        file: PathBuf,
        /// Also record messages that were not retained
        #[arg(long)]
        include_live: bool,
    },
    /// Replay a backup file (or stdin)
    Restore { file: Option<PathBuf> },
    /// Publish timestamps at a fixed rate until interrupted
    Stress {
        /// Publications per second
        #[arg(short, long, default_value_t = 10, value_parser = clap::value_parser!(u32).range(1..))]
        rate: u32,
    },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Sub { .. } => "sub",
            Command::Clear { .. } => "clear",
            Command::Purge { .. } => "purge",
            Command::Pub { .. } => "pub",
            Command::Backup { .. } => "backup",
            Command::Restore { .. } => "restore",
            Command::Stress { .. } => "stress",
        }
    }

    /// Terminal title while the command runs
    pub fn title(&self) -> String {
        match self {
            Command::Sub { filter } | Command::Clear { filter } | Command::Backup { filter, .. } => {
                format!("mqtt {} {}", self.name(), filter)
            }
            Command::Pub { topic, .. } => format!("mqtt pub {topic}"),
            _ => format!("mqtt {}", self.name()),
        }
    }

    /// One-shot commands exit once their input is drained
    pub fn is_one_shot(&self) -> bool {
        matches!(
            self,
            Command::Pub { .. } | Command::Restore { .. } | Command::Purge { .. }
        )
    }
}
