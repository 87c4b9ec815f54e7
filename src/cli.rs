use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "relochat", about = "Terminal client for a realtime chat backend")]
pub struct Cli {
    /// Path to config file (default: ./config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Store an access token and the local identity
    Login {
        #[arg(long)]
        username: String,
        #[arg(long)]
        user_id: Option<String>,
    },
    /// Remove the stored session
    Logout,
    /// List conversations, most recent first
    Chats,
    /// Search users by name
    Search { query: String },
    /// Open an interactive chat with a user
    Chat { username: String },
    /// Follow chat list and presence changes
    Watch,
}

impl Cli {
    pub fn command_or_default(&self) -> Command {
        self.command.clone().unwrap_or(Command::Watch)
    }
}
