use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "parlor", version, about = "Parlor chat backend", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Override the config file path globally
    #[arg(short, long, global = true, default_value = "config.yaml")]
    pub config: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP API and WebSocket server
    Serve,

    /// Sign in with the configured identity and chat in the terminal
    Chat,

    /// Inspect or maintain the stored history of the configured identity
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
}

#[derive(Subcommand)]
pub enum HistoryAction {
    /// Print every stored message
    List,

    /// Export the history to a .txt file
    Export {
        /// The path to the output file (optional)
        #[arg(short, long)]
        path: Option<String>,
    },

    /// Delete every stored message
    Purge,

    /// Save the current history as one conversation record
    Save {
        /// A title for the saved conversation (optional)
        #[arg(short, long)]
        title: Option<String>,
    },

    /// List saved conversations
    Saved,
}
