use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::context::TrackerConfig;
use crate::daemon::DaemonConfig;
use crate::daemon::state::SessionProbe;

#[derive(Parser)]
#[command(name = "shellctxd", about = "Compositor context tracker for desktop shells")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the context daemon
    Daemon(DaemonArgs),

    /// Query a running daemon
    Client {
        #[command(subcommand)]
        action: ClientAction,
    },
}

/// Flags for `daemon`. Defaults match [`DaemonConfig::default`].
#[derive(Args, Debug, Clone)]
pub struct DaemonArgs {
    /// How long a recorded launch stays the last app
    #[arg(long, default_value_t = 600)]
    pub sequence_window_secs: u64,

    /// How long a new session counts as a session start
    #[arg(long, default_value_t = 300)]
    pub session_window_secs: u64,

    /// How long after the screen powers on a resume is reported
    #[arg(long, default_value_t = 300)]
    pub resume_window_secs: u64,

    /// Delay before re-checking the compositor environment
    #[arg(long, default_value_t = 2000)]
    pub redetect_delay_ms: u64,

    /// Compositor age below which the session counts as new
    #[arg(long, default_value_t = 120)]
    pub new_session_threshold_secs: u64,

    /// Treat this run as a new session regardless of compositor age
    #[arg(long)]
    pub new_session: bool,
}

#[derive(Subcommand)]
pub enum ClientAction {
    /// Print the current context snapshot
    Context {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Record that an application was launched
    Launch {
        /// Application id, e.g. org.gnome.Nautilus
        app_id: String,
    },

    /// Print the detected compositor, screens and workspace
    Status {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Stream compositor events until interrupted
    Watch,
}

impl DaemonArgs {
    pub fn config(&self) -> DaemonConfig {
        DaemonConfig {
            tracker: TrackerConfig {
                sequence_window: Duration::from_secs(self.sequence_window_secs),
                session_start_window: Duration::from_secs(self.session_window_secs),
                resume_window: Duration::from_secs(self.resume_window_secs),
            },
            probe: SessionProbe {
                threshold: Duration::from_secs(self.new_session_threshold_secs),
                force_new: self.new_session,
            },
            redetect_delay: Duration::from_millis(self.redetect_delay_ms),
        }
    }
}
