use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pandoc-bridge")]
#[command(author, version, about = "Document conversion gateway for Pandoc (REST + MCP)")]
pub struct Cli {
    /// Path to JSON config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server (REST API and MCP endpoint)
    Start {
        /// Host to bind to (overrides config and HOST)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config and PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Convert a single file locally without starting the server
    Convert {
        /// Input file to convert
        #[arg(required = true)]
        input: PathBuf,

        /// Target format
        #[arg(short, long)]
        to: String,

        /// Source format (detected from the file when omitted)
        #[arg(short, long)]
        from: Option<String>,

        /// Output file (stdout for text formats when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// PDF engine for PDF output (e.g. xelatex for CJK text)
        #[arg(long)]
        pdf_engine: Option<String>,
    },

    /// List supported input and output formats
    Formats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that Pandoc and the optional PDF engines are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses --config if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,

    /// Generate a random API key for the API_KEYS setting
    GenerateApiKey,
}
