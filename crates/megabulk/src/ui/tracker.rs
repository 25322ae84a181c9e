use indicatif::{HumanBytes, ProgressBar, ProgressStyle};
use megabulk_fetch::RunSnapshot;
use once_cell::sync::Lazy;

const PB_STYLE: &str = "{spinner:.blue} {prefix:>12.cyan.bold} [{elapsed_precise}] {wide_bar:.cyan/blue} {bytes}/{total_bytes} ({msg})";

const TICK: &str = "⠁⠂⠄⡀⢀⠠⠐⠈ ";

const PB_CHARS: &str = "█▓▒░  ";

static PB_TEMPLATE: Lazy<Option<ProgressStyle>> = Lazy::new(|| {
    let pb_style = match ProgressStyle::with_template(PB_STYLE) {
        Ok(pb_style) => pb_style.tick_chars(TICK).progress_chars(PB_CHARS),
        Err(_) => return None,
    };

    Some(pb_style)
});

/// Aggregate progress of a run on one bar.
pub struct RunTracker {
    pb: ProgressBar,
}

impl RunTracker {
    pub fn new(visible: bool) -> Self {
        let pb = if visible { ProgressBar::new(0) } else { ProgressBar::hidden() };
        let pb = match PB_TEMPLATE.as_ref() {
            Some(style) => pb.with_style(style.clone()),
            None => pb,
        };
        pb.set_prefix("Downloading");
        Self { pb }
    }

    pub fn update(&self, snapshot: &RunSnapshot) {
        self.pb.set_length(snapshot.bytes_total);
        self.pb.set_position(snapshot.bytes_downloaded);
        self.pb.set_message(summary(snapshot));
        self.pb.tick();
    }

    pub fn finish(self, snapshot: &RunSnapshot) {
        self.pb.set_position(snapshot.bytes_downloaded);
        self.pb.finish_with_message(summary(snapshot));
    }
}

fn summary(snapshot: &RunSnapshot) -> String {
    let mut parts = vec![format!("{}/{} files", snapshot.finished(), snapshot.total)];
    if snapshot.downloading + snapshot.requesting_stream > 0 {
        parts.push(format!(
            "{} transferring at {}/s",
            snapshot.downloading + snapshot.requesting_stream,
            HumanBytes(snapshot.speed as u64)
        ));
    }
    if snapshot.verifying > 0 {
        parts.push(format!("{} verifying", snapshot.verifying));
    }
    if snapshot.failed > 0 {
        parts.push(format!("{} failed", snapshot.failed));
    }
    parts.push(format!(
        "proxies {}/{}",
        snapshot.proxies.working,
        snapshot.proxies.total()
    ));
    parts.join(", ")
}
