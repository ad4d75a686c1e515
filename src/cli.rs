use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "juno")]
#[command(about = "Discord coding assistant that pages Gemini answers")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the Discord bot and the stats dashboard
    Daemon,

    /// Send a single prompt to Gemini and print the answer page by page
    Run {
        /// The prompt to send
        prompt: String,

        /// Characters per page (defaults to the configured page size)
        #[arg(long)]
        page_size: Option<usize>,
    },

    /// Initial setup (Discord token, Gemini API key, owner)
    Install,

    /// Show current configuration
    Config,
}
