use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use console::style;
use megabulk_fetch::{RemoteProxyLists, ReqwestClient, ReqwestConnector, RunReport, Scheduler, ShareCredential};
use tracing::info;

use crate::cli::app::DownloadArg;
use crate::config;
use crate::ui::tracker::RunTracker;

const REDRAW: Duration = Duration::from_millis(250);

pub async fn download(arg: DownloadArg) -> Result<ExitCode> {
    let options = config::resolve(&arg)?;
    let link = arg.link.context("missing share link")?;
    let dest = arg.dest.context("missing destination directory")?;

    let credential = ShareCredential::parse(&link).context("cannot parse share link")?;
    std::fs::create_dir_all(&dest).with_context(|| format!("cannot create {}", dest.display()))?;

    let source = RemoteProxyLists::new(ReqwestClient::new().context("cannot build HTTP client")?);
    let scheduler = Scheduler::prepare(&credential, &dest, ReqwestConnector, source, options)
        .await
        .context("cannot list shared folder")?;
    info!(files = scheduler.tasks().len(), dest = %dest.display(), "prepared download");

    let tracker = RunTracker::new(!arg.no_progress);
    let mut redraw = tokio::time::interval(REDRAW);

    let run = scheduler.run();
    tokio::pin!(run);
    let outcome = loop {
        tokio::select! {
            outcome = &mut run => break outcome,
            _ = redraw.tick() => tracker.update(&scheduler.snapshot()),
        }
    };
    tracker.finish(&scheduler.snapshot());

    let report = outcome.context("download aborted")?;
    print_report(&report);

    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_report(report: &RunReport) {
    println!(
        "{} {} downloaded, {} already present",
        style("done").green().bold(),
        report.downloaded,
        report.already_downloaded
    );
    for (item, reason) in &report.skipped {
        println!("{} item {item}: {reason}", style("skipped").yellow().bold());
    }
    for failed in &report.failed {
        println!("{} {}: {}", style("failed").red().bold(), failed.path.display(), failed.reason);
    }
}
