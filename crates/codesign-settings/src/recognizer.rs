//! Per-line recognizers for xcodebuild archive output.
//!
//! Each recognizer looks at a single line and yields at most one fact.
//! Stitching facts together (which target a profile belongs to, which
//! uuid line continues which profile line) is left to the caller.

use std::sync::OnceLock;

use regex_lite::Regex;

/// Target name used for profiles reported before any target context line.
pub const UNKNOWN_TARGET: &str = "<unknown target>";

/// A signing-related fact recognized on one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fact {
    /// A build step header naming the target it belongs to.
    Target(String),
    /// A development team identifier.
    TeamIdentifier(String),
    /// `Signing Identity:     "<name>"`
    SigningIdentity(String),
    /// `Provisioning Profile: "<name>"`
    ProfileName(String),
    /// `(<uuid>)` continuation line following a profile name.
    ProfileUuid(String),
}

struct Patterns {
    step_target: Regex,
    banner_target: Regex,
    team_setting: Regex,
    team_entitlement: Regex,
    signing_identity: Regex,
    profile_name: Regex,
    profile_uuid: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        // CodeSign /path/App.app (in target 'App' from project 'App')
        step_target: Regex::new(r"\(in target '([^']+)' from project ").unwrap(),
        // === BUILD TARGET App OF PROJECT App WITH CONFIGURATION Release ===
        banner_target: Regex::new(r"^=== (?:BUILD|ARCHIVE|ANALYZE) TARGET (.+?) OF PROJECT ")
            .unwrap(),
        // export DEVELOPMENT_TEAM\=ABCDE12345  /  DEVELOPMENT_TEAM = ABCDE12345
        team_setting: Regex::new(r"\bDEVELOPMENT_TEAM\s*\\?=\s*([A-Z0-9]{10})\b").unwrap(),
        // "com.apple.developer.team-identifier" = ABCDE12345;
        team_entitlement: Regex::new(
            r#""?com\.apple\.developer\.team-identifier"?\s*=\s*"?([A-Z0-9]{10})"?;"#,
        )
        .unwrap(),
        signing_identity: Regex::new(r#"^Signing Identity:\s*"(.+)"$"#).unwrap(),
        profile_name: Regex::new(r#"^Provisioning Profile:\s*"(.+)"$"#).unwrap(),
        profile_uuid: Regex::new(r"^\(([0-9A-Fa-f-]+)\)$").unwrap(),
    })
}

/// Recognize a single transcript line.
///
/// Returns `None` for every line that carries no signing fact.
pub fn recognize(line: &str) -> Option<Fact> {
    let p = patterns();
    let trimmed = line.trim();

    if let Some(caps) = p.signing_identity.captures(trimmed) {
        return Some(Fact::SigningIdentity(caps[1].to_string()));
    }
    if let Some(caps) = p.profile_name.captures(trimmed) {
        return Some(Fact::ProfileName(caps[1].to_string()));
    }
    if let Some(caps) = p.profile_uuid.captures(trimmed) {
        return Some(Fact::ProfileUuid(caps[1].to_string()));
    }
    if let Some(caps) = p.team_setting.captures(trimmed) {
        return Some(Fact::TeamIdentifier(caps[1].to_string()));
    }
    if let Some(caps) = p.team_entitlement.captures(trimmed) {
        return Some(Fact::TeamIdentifier(caps[1].to_string()));
    }

    // Step headers start at column 0; indented lines are command bodies
    // whose paths may contain the same text.
    if line.starts_with(char::is_whitespace) {
        return None;
    }
    if let Some(caps) = p.banner_target.captures(trimmed) {
        return Some(Fact::Target(caps[1].to_string()));
    }
    if let Some(caps) = p.step_target.captures(trimmed) {
        return Some(Fact::Target(caps[1].to_string()));
    }

    None
}
