//! Locally installed code signing identities.
//!
//! Reads the output of `security find-identity -v -p codesigning` so a scan
//! can tell whether the identity an archive used is present on this
//! machine. Identity material itself is never read or exported.

use std::process::Command;
use std::sync::OnceLock;

use regex_lite::Regex;

use serde::{Deserialize, Serialize};

use crate::build::{capture_command, CaptureError};
use crate::cancel::CancelToken;
use crate::timeout::TimeoutConfig;

/// One valid code signing identity in the keychain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalIdentity {
    /// SHA-1 fingerprint of the certificate, upper-case hex
    pub sha1: String,
    /// Common name, e.g. `Apple Distribution: Acme Inc (ABCDE12345)`
    pub name: String,
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error("security find-identity failed: {0}")]
    Failed(String),
}

/// Lists identities installed on this machine.
pub trait IdentitySource {
    fn identities(&self) -> Result<Vec<LocalIdentity>, IdentityError>;
}

/// Queries the macOS `security` tool.
#[derive(Debug, Clone)]
pub struct SecurityIdentitySource {
    program: String,
}

impl Default for SecurityIdentitySource {
    fn default() -> Self {
        Self {
            program: "security".to_string(),
        }
    }
}

impl SecurityIdentitySource {
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl IdentitySource for SecurityIdentitySource {
    fn identities(&self) -> Result<Vec<LocalIdentity>, IdentityError> {
        let mut command = Command::new(&self.program);
        command.args(["find-identity", "-v", "-p", "codesigning"]);
        let transcript = capture_command(
            command,
            &CancelToken::new(),
            TimeoutConfig::overall(60),
        )?;
        if !transcript.succeeded() {
            return Err(IdentityError::Failed(transcript.into_text()));
        }
        Ok(parse_find_identity(transcript.raw_text()))
    }
}

/// Parse `security find-identity` output.
///
/// ```text
///   1) 0123456789ABCDEF0123456789ABCDEF01234567 "Apple Development: Jane Doe (ABCDE12345)"
///      1 valid identities found
/// ```
pub fn parse_find_identity(output: &str) -> Vec<LocalIdentity> {
    let mut identities: Vec<LocalIdentity> = Vec::new();
    for line in output.lines() {
        let Some(parsed) = parse_identity_line(line) else {
            continue;
        };
        if !identities.iter().any(|i| i.sha1 == parsed.sha1) {
            identities.push(parsed);
        }
    }
    identities
}

fn parse_identity_line(line: &str) -> Option<LocalIdentity> {
    static IDENTITY_LINE: OnceLock<Regex> = OnceLock::new();
    // Revoked/expired identities carry a trailing "(CSSMERR_...)" marker
    let re = IDENTITY_LINE
        .get_or_init(|| Regex::new(r#"^\s*\d+\)\s+([0-9A-Fa-f]{40})\s+"(.+)""#).unwrap());
    let caps = re.captures(line)?;
    Some(LocalIdentity {
        sha1: caps[1].to_ascii_uppercase(),
        name: caps[2].to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const OUTPUT: &str = r#"  1) 0123456789ABCDEF0123456789ABCDEF01234567 "Apple Development: Jane Doe (ABCDE12345)"
  2) 89abcdef0123456789abcdef0123456789abcdef "Apple Distribution: Acme Inc (ABCDE12345)"
  3) 0123456789ABCDEF0123456789ABCDEF01234567 "Apple Development: Jane Doe (ABCDE12345)"
     3 valid identities found
"#;

    #[test]
    fn test_parse_find_identity() {
        let identities = parse_find_identity(OUTPUT);
        assert_eq!(identities.len(), 2);
        assert_eq!(identities[0].name, "Apple Development: Jane Doe (ABCDE12345)");
        assert_eq!(identities[1].sha1, "89ABCDEF0123456789ABCDEF0123456789ABCDEF");
        assert_eq!(identities[1].name, "Apple Distribution: Acme Inc (ABCDE12345)");
    }

    #[test]
    fn test_parse_revoked_marker() {
        let line = r#"  1) 0123456789ABCDEF0123456789ABCDEF01234567 "iPhone Distribution: Old (ABCDE12345)" (CSSMERR_TP_CERT_REVOKED)"#;
        let identities = parse_find_identity(line);
        assert_eq!(identities[0].name, "iPhone Distribution: Old (ABCDE12345)");
    }

    #[test]
    fn test_parse_no_identities() {
        assert!(parse_find_identity("     0 valid identities found\n").is_empty());
        assert!(parse_find_identity("").is_empty());
    }
}
