use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::Args;
use megabulk_fetch::{MISMATCH_EXIT_CODE, VerifyLine};

#[derive(Args, Clone, Debug)]
pub struct VerifyArg {
    #[arg(help = "File to verify")]
    pub path: PathBuf,

    #[arg(long, help = "Content key, 32 hex digits")]
    pub key: String,

    #[arg(long, help = "Nonce, 16 hex digits")]
    pub nonce: String,

    #[arg(long, help = "Expected tag, 16 hex digits")]
    pub tag: String,
}

fn decode<const N: usize>(name: &str, value: &str) -> Result<[u8; N]> {
    let bytes = hex::decode(value).with_context(|| format!("--{name} is not hex"))?;
    match <[u8; N]>::try_from(bytes.as_slice()) {
        Ok(array) => Ok(array),
        Err(_) => bail!("--{name} must be {} hex digits, got {}", N * 2, value.len()),
    }
}

pub fn verify(arg: VerifyArg) -> Result<ExitCode> {
    let key = decode::<16>("key", &arg.key)?;
    let nonce = decode::<8>("nonce", &arg.nonce)?;
    let tag = decode::<8>("tag", &arg.tag)?;

    let mut stdout = std::io::stdout().lock();
    let outcome = megabulk_crypto::verify_file(&arg.path, &key, &nonce, &tag, |bytes| {
        // progress is best effort; the exit status carries the verdict
        let _ = writeln!(stdout, "{}", VerifyLine::Progress(bytes)).and_then(|()| stdout.flush());
    });

    match outcome {
        Ok(_) => Ok(ExitCode::SUCCESS),
        Err(megabulk_crypto::Error::IntegrityMismatch { actual, .. }) => {
            writeln!(stdout, "{}", VerifyLine::Mismatch(actual))?;
            Ok(ExitCode::from(MISMATCH_EXIT_CODE as u8))
        }
        Err(e) => Err(e).with_context(|| format!("cannot verify {}", arg.path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_lengths() {
        assert_eq!(decode::<2>("key", "0aff").unwrap(), [0x0a, 0xff]);
        assert!(decode::<2>("key", "0a").is_err());
        assert!(decode::<2>("key", "zz00").is_err());
    }
}
