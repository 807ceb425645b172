use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clinic_core::models::Role;

#[derive(Parser, Debug)]
#[command(name = "clinic", version, about = "Clinic portal client")]
pub struct Cli {
    /// Base URL of the clinic API.
    #[arg(long, global = true, env = "CLINIC_API_URL")]
    pub api_url: Option<String>,

    /// Directory holding the persisted session.
    #[arg(long, global = true, env = "CLINIC_SESSION_DIR")]
    pub session_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the client version.
    Version,

    /// Log in and persist the session.
    Login {
        #[arg(long)]
        email: String,

        #[arg(long, env = "CLINIC_PASSWORD", hide_env_values = true)]
        password: String,

        /// Reject the login unless the account has this role.
        #[arg(long)]
        role: Option<Role>,
    },

    /// End the persisted session.
    Logout,

    /// Exchange the refresh token for a new session.
    Refresh,

    /// Show whether a session is stored and still valid.
    Status,

    /// Print the logged-in identity.
    Whoami,

    /// Check a permission against the logged-in identity.
    Can { permission: String },

    /// List the permissions a role grants.
    Role { role: String },

    /// Keep the session alive until interrupted.
    Keepalive,
}
