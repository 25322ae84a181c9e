use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::app::{App, Commands};

mod cli;
mod config;
mod ui;

fn init_tracing(verbose: u8) {
    let fallback = match verbose {
        0 => "info",
        1 => "megabulk=debug,megabulk_fetch=debug,info",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)))
        .with_writer(std::io::stderr)
        .init();
}

fn run(app: App) -> Result<ExitCode> {
    match app.cmd {
        Some(Commands::Verify(arg)) => cli::verify::verify(arg),
        None => {
            let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
            runtime.block_on(cli::download::download(app.download))
        }
    }
}

fn main() -> ExitCode {
    let app = App::parse();
    init_tracing(app.verbose);

    match run(app) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(2)
        }
    }
}
