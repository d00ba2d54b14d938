//! Opening links in the user's default browser.

use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{RunnerError, RunnerResult};
use crate::platform::Platform;

/// Only web links are handed to the system opener.
pub fn validate_link(url: &str) -> RunnerResult<()> {
    let lower = url.trim().to_lowercase();
    let rest = lower
        .strip_prefix("https://")
        .or_else(|| lower.strip_prefix("http://"));
    match rest {
        Some(host) if !host.is_empty() && !url.chars().any(char::is_whitespace) => Ok(()),
        _ => Err(RunnerError::InvalidUrl(url.to_string())),
    }
}

/// Program and arguments that open `url` on `platform`.
pub fn opener_command(platform: Platform, url: &str) -> (String, Vec<String>) {
    match platform {
        Platform::Windows => ("explorer".to_string(), vec![url.to_string()]),
        Platform::MacOs => ("open".to_string(), vec![url.to_string()]),
        Platform::Linux => ("xdg-open".to_string(), vec![url.to_string()]),
    }
}

/// Open an http(s) link with the system handler without waiting for it.
pub fn open_external_link(url: &str) -> RunnerResult<()> {
    validate_link(url)?;

    let (program, args) = opener_command(Platform::current(), url);
    info!("Opening {}", url);
    debug!("Using {} to open link", program);

    let mut cmd = Command::new(&program);
    cmd.args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(false);

    cmd.spawn().map_err(|source| RunnerError::Spawn { program, source })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_link() {
        assert!(validate_link("http://localhost:5173").is_ok());
        assert!(validate_link("https://example.com/docs").is_ok());
        assert!(validate_link("file:///etc/passwd").is_err());
        assert!(validate_link("javascript:alert(1)").is_err());
        assert!(validate_link("https://").is_err());
        assert!(validate_link("https://exa mple.com").is_err());
    }

    #[test]
    fn test_opener_command_per_platform() {
        assert_eq!(opener_command(Platform::Windows, "http://x").0, "explorer");
        assert_eq!(opener_command(Platform::MacOs, "http://x").0, "open");
        assert_eq!(
            opener_command(Platform::Linux, "http://x"),
            ("xdg-open".to_string(), vec!["http://x".to_string()])
        );
    }
}
