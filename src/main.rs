mod cli;
mod core;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "pace", about = "AI assistant quota and pace tracking CLI", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Output format (text|json)
    #[arg(short, long, global = true)]
    format: Option<String>,

    /// Shorthand for --format json
    #[arg(short = 'j', long = "json", global = true)]
    json: bool,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,

    /// Disable ANSI colors
    #[arg(long, global = true)]
    no_color: bool,

    /// Verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch and display provider usage once
    Usage {
        /// Provider to query (default: all enabled)
        #[arg(short, long)]
        provider: Option<String>,
    },
    /// Poll continuously until interrupted
    Watch {
        /// Provider to query (default: all enabled)
        #[arg(short, long)]
        provider: Option<String>,

        /// Seconds between polls (default: config refresh_interval_secs)
        #[arg(short, long)]
        interval: Option<u64>,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Generate default config file
    Init,
    /// Validate config file
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let output_opts = cli::output::OutputOptions {
        format: if cli.json {
            cli::output::OutputFormat::Json
        } else {
            cli.format
                .as_deref()
                .and_then(cli::output::OutputFormat::from_name)
                .unwrap_or(cli::output::OutputFormat::Text)
        },
        pretty: cli.pretty,
        use_color: cli::output::detect_color(!cli.no_color),
        verbose: cli.verbose,
    };

    match cli.command {
        None | Some(Commands::Usage { .. }) => {
            let provider = match cli.command {
                Some(Commands::Usage { provider }) => provider,
                _ => None,
            };
            cli::usage_cmd::run(provider, &output_opts).await?;
        }
        Some(Commands::Watch { provider, interval }) => {
            cli::watch_cmd::run(provider, interval, &output_opts).await?;
        }
        Some(Commands::Config { action }) => match action {
            ConfigAction::Init => cli::config_cmd::init(&output_opts)?,
            ConfigAction::Check => cli::config_cmd::check(&output_opts)?,
        },
    }

    Ok(())
}
