//! Code signing settings extraction from xcodebuild archive output.
//!
//! An archive build prints, for every product it signs, the signing identity
//! and provisioning profile it settled on. This crate turns that free-text
//! transcript into a structured [`SigningSettings`] record. It performs no
//! I/O; the transcript is captured elsewhere and handed in as a value.

mod recognizer;
mod result;
mod transcript;

pub use recognizer::{recognize, Fact, UNKNOWN_TARGET};
pub use result::{ExtractError, SigningSettings, TargetProfileRef};
pub use transcript::BuildTranscript;

/// Extract signing settings from a build transcript.
///
/// A failed transcript never yields settings, not even partial ones.
/// Lines no recognizer claims are ignored so that new xcodebuild log
/// formats degrade to "nothing found" instead of an error.
pub fn extract(transcript: &BuildTranscript) -> Result<SigningSettings, ExtractError> {
    if !transcript.succeeded() {
        return Err(ExtractError::BuildFailed);
    }

    let mut state = ExtractState::default();
    for line in transcript.lines() {
        state.feed(line);
    }
    state.finish()
}

/// Running context for the line scan.
#[derive(Debug, Default)]
struct ExtractState {
    current_target: Option<String>,
    team_identifier: Option<String>,
    signing_identity_name: Option<String>,
    refs: Vec<TargetProfileRef>,
    /// Set right after a `Provisioning Profile: "<name>"` line so the
    /// following `(<uuid>)` line can be attached to it.
    pending_profile: Option<usize>,
    recognized_any: bool,
}

impl ExtractState {
    fn feed(&mut self, line: &str) {
        if line.trim().is_empty() {
            return;
        }

        let fact = recognize(line);
        let pending = self.pending_profile.take();

        let fact = match fact {
            Some(fact) => fact,
            None => return,
        };
        self.recognized_any = true;

        match fact {
            Fact::Target(name) => {
                tracing::debug!(target_name = %name, "entering target context");
                self.current_target = Some(name);
            }
            Fact::TeamIdentifier(team) => {
                if self.team_identifier.is_none() {
                    self.team_identifier = Some(team);
                }
            }
            Fact::SigningIdentity(identity) => match &self.signing_identity_name {
                None => self.signing_identity_name = Some(identity),
                Some(existing) if *existing != identity => {
                    tracing::warn!(
                        first = %existing,
                        other = %identity,
                        "archive signs with more than one identity, keeping the first"
                    );
                }
                Some(_) => {}
            },
            Fact::ProfileName(name) => {
                let target = self
                    .current_target
                    .clone()
                    .unwrap_or_else(|| UNKNOWN_TARGET.to_string());
                self.refs.push(TargetProfileRef {
                    target_name: target,
                    profile_identifier: name.clone(),
                    profile_name: Some(name),
                });
                self.pending_profile = Some(self.refs.len() - 1);
            }
            Fact::ProfileUuid(uuid) => match pending {
                Some(index) => self.refs[index].profile_identifier = uuid,
                None => tracing::debug!(%uuid, "profile uuid without a preceding profile name"),
            },
        }
    }

    fn finish(self) -> Result<SigningSettings, ExtractError> {
        if !self.recognized_any {
            return Err(ExtractError::NoSigningSettingsFound);
        }

        let team_identifier = self.team_identifier.or_else(|| {
            self.signing_identity_name
                .as_deref()
                .and_then(team_from_identity_name)
        });

        // One ref per (target, profile) pair, first appearance order.
        let mut per_target_profiles: Vec<TargetProfileRef> = Vec::with_capacity(self.refs.len());
        for r in self.refs {
            let seen = per_target_profiles.iter().any(|existing| {
                existing.target_name == r.target_name
                    && existing.profile_identifier == r.profile_identifier
            });
            if !seen {
                per_target_profiles.push(r);
            }
        }

        if team_identifier.is_none()
            && self.signing_identity_name.is_none()
            && per_target_profiles.is_empty()
        {
            return Err(ExtractError::NoSigningSettingsFound);
        }

        Ok(SigningSettings {
            team_identifier,
            signing_identity_name: self.signing_identity_name,
            per_target_profiles,
        })
    }
}

/// Team id from identities like `Apple Distribution: Acme Inc (ABCDE12345)`.
fn team_from_identity_name(identity: &str) -> Option<String> {
    let inner = identity.trim_end().strip_suffix(')')?;
    let start = inner.rfind('(')?;
    let candidate = &inner[start + 1..];
    let valid = candidate.len() == 10
        && candidate
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit());
    valid.then(|| candidate.to_string())
}
