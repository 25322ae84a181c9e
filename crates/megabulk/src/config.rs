use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use megabulk_fetch::{RunOptions, VerifyMode};

use crate::cli::app::DownloadArg;

const DEFAULT_CONFIG: &str = ".megabulk.toml";

/// `~/.megabulk.toml`, if a home directory is known.
pub fn default_path() -> Option<PathBuf> {
    home::home_dir().map(|home| home.join(DEFAULT_CONFIG))
}

/// Read run options from a TOML file. Missing keys keep their defaults.
pub fn load(path: &Path) -> Result<RunOptions> {
    let text = std::fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("invalid config {}", path.display()))
}

/// Options for a download: the explicit config file, else the default one if present, else
/// built-in defaults; command-line flags win over all of them.
pub fn resolve(arg: &DownloadArg) -> Result<RunOptions> {
    let mut options = match &arg.config {
        Some(path) => load(path)?,
        None => match default_path().filter(|path| path.is_file()) {
            Some(path) => load(&path)?,
            None => RunOptions::default(),
        },
    };

    if let Some(max) = arg.max_transfers {
        options = options.max_transferring(max);
    }
    if let Some(max) = arg.max_probing {
        options = options.max_probing(max);
    }
    if let Some(workers) = arg.workers {
        options = options.workers(workers);
    }
    if arg.subprocess_verify {
        let program = std::env::current_exe().context("cannot locate own executable")?;
        options = options.verify(VerifyMode::Subprocess { program });
    }

    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    fn arg(config: Option<PathBuf>) -> DownloadArg {
        DownloadArg {
            link: Some("link".into()),
            dest: Some("out".into()),
            config,
            max_transfers: None,
            max_probing: None,
            workers: None,
            subprocess_verify: false,
            no_progress: true,
        }
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("megabulk.toml");
        std::fs::write(&path, "max_transferring = 3\ninactivity_timeout_secs = 45\n").unwrap();

        let options = load(&path).unwrap();
        assert_eq!(options.max_transferring, 3);
        assert_eq!(options.inactivity_timeout, Duration::from_secs(45));
        assert_eq!(options.max_probing, RunOptions::default().max_probing);
    }

    #[test]
    fn test_flags_override_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("megabulk.toml");
        std::fs::write(&path, "max_transferring = 3\nworkers = 8\n").unwrap();

        let mut arg = arg(Some(path));
        arg.max_transfers = Some(9);
        arg.subprocess_verify = true;

        let options = resolve(&arg).unwrap();
        assert_eq!(options.max_transferring, 9);
        assert_eq!(options.workers, 8);
        assert!(matches!(options.verify, VerifyMode::Subprocess { .. }));
    }

    #[test]
    fn test_invalid_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "max_transferring = \"many\"").unwrap();
        assert!(resolve(&arg(Some(path))).is_err());
    }
}
