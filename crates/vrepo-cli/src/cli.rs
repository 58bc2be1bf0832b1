use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "vrepo",
    about = "vrepo: browse a repository snapshot without cloning it",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Directory holding content.txt and tree.txt
    #[arg(short = 'C', long, global = true, default_value = ".")]
    pub snapshot: PathBuf,

    /// Repository id used for cache keys
    #[arg(long, global = true, default_value = "local/snapshot")]
    pub repo: String,

    /// TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// List a directory
    Ls(LsArgs),
    /// Print a file, or a range of its lines
    Cat(CatArgs),
    /// Show file or directory metadata
    Stat(StatArgs),
    /// Find files by glob pattern
    Find(FindArgs),
    /// Search files by name with filters
    Search(SearchArgs),
    /// Print the file tree
    Tree(TreeArgs),
    /// Show load outcome, index statistics and cache health
    Status(StatusArgs),
    /// Show which caches a page transition clears
    Nav(NavArgs),
    /// Print the effective configuration
    Config(ConfigArgs),
}

#[derive(Args)]
pub struct LsArgs {
    pub path: Option<String>,
    /// Include kinds and sizes
    #[arg(short, long)]
    pub long: bool,
}

#[derive(Args)]
pub struct CatArgs {
    pub path: String,
    /// First line to print (1-based)
    #[arg(long)]
    pub start: Option<usize>,
    /// Last line to print (inclusive)
    #[arg(long)]
    pub end: Option<usize>,
}

#[derive(Args)]
pub struct StatArgs {
    pub path: String,
}

#[derive(Args)]
pub struct FindArgs {
    pub pattern: String,
}

#[derive(Args)]
pub struct SearchArgs {
    pub query: String,
    #[arg(long)]
    pub ext: Option<String>,
    #[arg(long)]
    pub language: Option<String>,
    #[arg(long)]
    pub min_size: Option<u64>,
    #[arg(long)]
    pub max_size: Option<u64>,
    /// Only files under this directory
    #[arg(long)]
    pub dir: Option<String>,
    #[arg(short = 'n', long, default_value = "50")]
    pub limit: usize,
}

#[derive(Args)]
pub struct TreeArgs {
    /// Only paths under this directory
    pub dir: Option<String>,
}

#[derive(Args)]
pub struct StatusArgs {}

#[derive(Args)]
pub struct NavArgs {
    /// Page type name or route, e.g. `chat_session` or `/chat/42`
    pub from: Option<String>,
    pub to: Option<String>,
    #[arg(long, default_value = "cli")]
    pub user: String,
    #[arg(long)]
    pub session: Option<String>,
    /// Print the whole transition table
    #[arg(long)]
    pub table: bool,
}

#[derive(Args)]
pub struct ConfigArgs {
    /// Print built-in defaults instead of the loaded file
    #[arg(long)]
    pub defaults: bool,
}
