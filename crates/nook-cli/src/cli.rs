use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "nook",
    about = "Nook feed client against a seeded in-memory backend",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// TOML file with feed and ledger settings
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Number of demo posts to seed the backend with
    #[arg(long, global = true, default_value = "45")]
    pub posts: usize,

    /// Override the configured page size
    #[arg(long, global = true)]
    pub page_size: Option<usize>,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Load and print the home feed
    Feed(FeedArgs),
    /// Like a post, or withdraw a like
    Like(LikeArgs),
    /// Comment on a post
    Comment(CommentArgs),
    /// Print the most liked public posts
    Trending(TrendingArgs),
    /// Walk through a failed write, a rollback and a retry
    Simulate(SimulateArgs),
    /// Print the effective configuration
    Config,
}

#[derive(Args)]
pub struct FeedArgs {
    /// Pages to load, starting from the top
    #[arg(short = 'n', long, default_value = "1")]
    pub pages: usize,
    /// Show one author's profile feed instead of the home feed
    #[arg(long)]
    pub author: Option<String>,
    /// Visibilities to include, comma separated (public, friends, only_me)
    #[arg(long, value_delimiter = ',')]
    pub visibility: Vec<String>,
}

#[derive(Args)]
pub struct LikeArgs {
    pub post: String,
    #[arg(long)]
    pub undo: bool,
}

#[derive(Args)]
pub struct CommentArgs {
    pub post: String,
    pub text: String,
}

#[derive(Args)]
pub struct TrendingArgs {
    /// Number of posts to show
    #[arg(short = 'n', long, default_value = "5")]
    pub limit: usize,
}

#[derive(Args)]
pub struct SimulateArgs {
    /// Post to act on; defaults to the newest one
    pub post: Option<String>,
}
