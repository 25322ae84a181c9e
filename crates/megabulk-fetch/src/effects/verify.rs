use std::path::{Path, PathBuf};
use std::process::Stdio;

use megabulk_crypto::{CryptoParams, verify_file};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::data::VerifyMode;
use crate::error::{Error, Result};

/// Messages sent by a running verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyEvent {
    /// This many bytes have been authenticated so far.
    Progress(u64),
}

/// Authenticate the file at `path` against `params.tag`.
///
/// The work runs off the async executor, on the blocking pool or in a child process, and
/// reports progress on `events`. A closed receiver does not abort the verification.
/// Returns the number of bytes authenticated.
pub async fn verify(
    mode: &VerifyMode,
    path: &Path,
    params: &CryptoParams,
    events: mpsc::Sender<VerifyEvent>,
) -> Result<u64> {
    match mode {
        VerifyMode::InProcess => verify_in_process(path.to_path_buf(), params.clone(), events).await,
        VerifyMode::Subprocess { program } => verify_in_child(program, path, params, events).await,
    }
}

async fn verify_in_process(path: PathBuf, params: CryptoParams, events: mpsc::Sender<VerifyEvent>) -> Result<u64> {
    let joined = tokio::task::spawn_blocking(move || {
        verify_file(&path, &params.key, &params.nonce, &params.tag, |bytes| {
            let _ = events.blocking_send(VerifyEvent::Progress(bytes));
        })
    })
    .await
    .map_err(|e| Error::Verifier(e.to_string()))?;

    match joined {
        Ok(bytes) => Ok(bytes),
        Err(megabulk_crypto::Error::IntegrityMismatch { expected, actual }) => {
            Err(Error::IntegrityMismatch { expected, actual })
        }
        Err(e) => Err(e.into()),
    }
}

/// Line protocol spoken by the `verify` subcommand on stdout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyLine {
    Progress(u64),
    Mismatch(String),
}

impl VerifyLine {
    pub fn parse(line: &str) -> Option<Self> {
        let (word, rest) = line.trim().split_once(' ')?;
        match word {
            "progress" => rest.trim().parse().ok().map(Self::Progress),
            "mismatch" => Some(Self::Mismatch(rest.trim().to_string())),
            _ => None,
        }
    }
}

impl std::fmt::Display for VerifyLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Progress(bytes) => write!(f, "progress {bytes}"),
            Self::Mismatch(actual) => write!(f, "mismatch {actual}"),
        }
    }
}

/// Exit status of the `verify` subcommand when the tag does not match.
pub const MISMATCH_EXIT_CODE: i32 = 1;

async fn verify_in_child(
    program: &Path,
    path: &Path,
    params: &CryptoParams,
    events: mpsc::Sender<VerifyEvent>,
) -> Result<u64> {
    let mut child = Command::new(program)
        .arg("verify")
        .arg(path)
        .args(["--key", &hex::encode(params.key)])
        .args(["--nonce", &hex::encode(params.nonce)])
        .args(["--tag", &hex::encode(params.tag)])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::Verifier(format!("spawn {}: {e}", program.display())))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| Error::Verifier("child stdout unavailable".into()))?;
    let mut lines = BufReader::new(stdout).lines();

    let mut verified = 0;
    let mut mismatch = None;
    while let Some(line) = lines.next_line().await.map_err(|e| Error::Verifier(e.to_string()))? {
        match VerifyLine::parse(&line) {
            Some(VerifyLine::Progress(bytes)) => {
                verified = bytes;
                let _ = events.send(VerifyEvent::Progress(bytes)).await;
            }
            Some(VerifyLine::Mismatch(actual)) => mismatch = Some(actual),
            None => trace!(line, "ignoring verifier output"),
        }
    }

    let status = child.wait().await.map_err(|e| Error::Verifier(e.to_string()))?;
    debug!(path = %path.display(), ?status, "verifier exited");

    match status.code() {
        Some(0) => Ok(verified),
        Some(MISMATCH_EXIT_CODE) => Err(Error::IntegrityMismatch {
            expected: hex::encode(params.tag),
            actual: mismatch.unwrap_or_default(),
        }),
        _ => Err(Error::Verifier(format!("verifier exited with {status}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use megabulk_crypto::ChunkMac;
    use tempfile::tempdir;

    fn params_for(data: &[u8]) -> CryptoParams {
        let key = [3u8; 16];
        let nonce = [5u8; 8];
        let mut mac = ChunkMac::new(&key, &nonce);
        mac.update(data);
        let mut iv = [0u8; 16];
        iv[..8].copy_from_slice(&nonce);
        CryptoParams {
            key,
            iv,
            nonce,
            tag: mac.finish(),
        }
    }

    #[test]
    fn test_line_protocol() {
        assert_eq!(VerifyLine::parse("progress 131072"), Some(VerifyLine::Progress(131072)));
        assert_eq!(
            VerifyLine::parse("mismatch 00ff00ff00ff00ff\n"),
            Some(VerifyLine::Mismatch("00ff00ff00ff00ff".into()))
        );
        assert_eq!(VerifyLine::parse("progress x"), None);
        assert_eq!(VerifyLine::parse("hello"), None);
        assert_eq!(VerifyLine::Progress(7).to_string(), "progress 7");
    }

    #[tokio::test]
    async fn test_in_process_accepts_and_reports() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f");
        let data = vec![0xabu8; 300_000];
        std::fs::write(&path, &data).unwrap();

        let (tx, mut rx) = mpsc::channel(64);
        let bytes = verify(&VerifyMode::InProcess, &path, &params_for(&data), tx).await.unwrap();
        assert_eq!(bytes, 300_000);

        let mut last = 0;
        while let Some(VerifyEvent::Progress(n)) = rx.recv().await {
            assert!(n >= last);
            last = n;
        }
        assert_eq!(last, 300_000);
    }

    #[tokio::test]
    async fn test_in_process_rejects() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f");
        std::fs::write(&path, b"tampered").unwrap();

        let (tx, _rx) = mpsc::channel(1);
        let result = verify(&VerifyMode::InProcess, &path, &params_for(b"original"), tx).await;
        assert!(matches!(result, Err(Error::IntegrityMismatch { .. })));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let dir = tempdir().unwrap();
        let mode = VerifyMode::Subprocess {
            program: dir.path().join("no-such-binary"),
        };
        let (tx, _rx) = mpsc::channel(1);
        let result = verify(&mode, &dir.path().join("f"), &params_for(b""), tx).await;
        assert!(matches!(result, Err(Error::Verifier(_))));
    }
}
