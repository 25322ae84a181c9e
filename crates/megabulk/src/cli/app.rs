use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

use super::verify::VerifyArg;

#[derive(Clone, Debug, Parser)]
#[command(
    name = "megabulk",
    version = env!("CARGO_PKG_VERSION"),
    about,
    long_about = None,
    args_conflicts_with_subcommands = true,
    subcommand_negates_reqs = true
)]
pub struct App {
    #[command(subcommand)]
    pub cmd: Option<Commands>,

    #[command(flatten)]
    pub download: DownloadArg,

    /// Raise log verbosity (-v debug, -vv trace); RUST_LOG takes precedence.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Clone, Debug, Subcommand)]
pub enum Commands {
    #[command(
        name = "verify",
        about = "Authenticate a downloaded file against its tag",
        long_about = "Authenticate a downloaded file against its tag. Prints `progress <bytes>` lines on \
                      stdout, exits 0 when the tag matches and 1 when it does not."
    )]
    Verify(VerifyArg),
}

#[derive(Args, Clone, Debug)]
pub struct DownloadArg {
    #[arg(help = "Share link, e.g. https://mega.nz/folder/<id>#<key>", required = true)]
    pub link: Option<String>,

    #[arg(help = "Destination directory", required = true)]
    pub dest: Option<PathBuf>,

    #[arg(long, short, help = "TOML file with run options")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Maximum concurrent transfers")]
    pub max_transfers: Option<usize>,

    #[arg(long, help = "Maximum concurrent download-URL requests")]
    pub max_probing: Option<usize>,

    #[arg(long, help = "Number of proxy workers")]
    pub workers: Option<usize>,

    #[arg(long, help = "Verify files in a child process instead of a thread pool")]
    pub subprocess_verify: bool,

    #[arg(long, help = "Do not draw a progress bar")]
    pub no_progress: bool,
}
