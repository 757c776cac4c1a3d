//! Provisioning profile decoding.
//!
//! Profile files are CMS signed-data envelopes whose encapsulated content
//! is a property list. The envelope is parsed for its content only; the
//! signature is not verified.

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use cryptographic_message_syntax::{CmsError, SignedData};
use plist::Value;
use serde::{Deserialize, Serialize};

/// File format, chosen by suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileFormat {
    /// `.mobileprovision` (iOS, tvOS, watchOS)
    MobileProvision,
    /// `.provisionprofile` (macOS)
    ProvisionProfile,
}

impl ProfileFormat {
    /// Format for a file path; anything that is not `.provisionprofile`
    /// is treated as `.mobileprovision`.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("provisionprofile") => ProfileFormat::ProvisionProfile,
            _ => ProfileFormat::MobileProvision,
        }
    }

    /// Whether `path` carries one of the two known profile suffixes
    pub fn is_profile_path(path: &Path) -> bool {
        matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("mobileprovision") | Some("provisionprofile")
        )
    }

    /// Extension including the leading dot
    pub fn extension(&self) -> &'static str {
        match self {
            ProfileFormat::MobileProvision => ".mobileprovision",
            ProfileFormat::ProvisionProfile => ".provisionprofile",
        }
    }
}

/// One provisioning profile file on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningProfileDescriptor {
    pub file_path: PathBuf,
    pub uuid: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_identifier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_id_name: Option<String>,
    pub format: ProfileFormat,
}

impl ProvisioningProfileDescriptor {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration_date.map_or(false, |exp| exp <= now)
    }
}

/// Why a profile file could not be decoded
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("failed to read profile: {0}")]
    Io(#[from] std::io::Error),

    #[error("not a CMS signed-data envelope: {0}")]
    Envelope(#[from] CmsError),

    #[error("signed-data envelope has no content")]
    NoContent,

    #[error("invalid property list: {0}")]
    Plist(#[from] plist::Error),

    #[error("property list is not a dictionary")]
    NotADictionary,

    #[error("missing or non-string key {0}")]
    MissingKey(&'static str),
}

const BINARY_PLIST_MAGIC: &[u8] = b"bplist00";

/// A bare plist, outside any envelope.
fn is_bare_plist(bytes: &[u8]) -> bool {
    if bytes.starts_with(BINARY_PLIST_MAGIC) {
        return true;
    }
    let text = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .map_or(&bytes[..0], |start| &bytes[start..]);
    text.starts_with(b"<?xml") || text.starts_with(b"<plist")
}

/// Decode a profile file.
pub fn decode_profile(path: &Path) -> Result<ProvisioningProfileDescriptor, DecodeError> {
    let bytes = fs::read(path)?;
    decode_profile_bytes(path, &bytes)
}

/// Decode profile bytes read from `path`.
///
/// Accepts the CMS-wrapped form as well as a bare XML or binary plist.
pub fn decode_profile_bytes(
    path: &Path,
    bytes: &[u8],
) -> Result<ProvisioningProfileDescriptor, DecodeError> {
    let value = if is_bare_plist(bytes) {
        Value::from_reader(Cursor::new(bytes))?
    } else {
        let signed_data = SignedData::parse_ber(bytes)?;
        let content = signed_data.signed_content().ok_or(DecodeError::NoContent)?;
        Value::from_reader(Cursor::new(content))?
    };

    let dict = value.as_dictionary().ok_or(DecodeError::NotADictionary)?;
    let string = |key: &'static str| dict.get(key).and_then(Value::as_string);

    let uuid = string("UUID").ok_or(DecodeError::MissingKey("UUID"))?;
    let name = string("Name").ok_or(DecodeError::MissingKey("Name"))?;
    let team_identifier = dict
        .get("TeamIdentifier")
        .and_then(Value::as_array)
        .and_then(|teams| teams.iter().find_map(Value::as_string))
        .map(str::to_string);
    let expiration_date = dict
        .get("ExpirationDate")
        .and_then(Value::as_date)
        .map(|date| DateTime::<Utc>::from(SystemTime::from(date)));

    Ok(ProvisioningProfileDescriptor {
        file_path: path.to_path_buf(),
        uuid: uuid.to_string(),
        name: name.to_string(),
        team_identifier,
        expiration_date,
        app_id_name: string("AppIDName").map(str::to_string),
        format: ProfileFormat::from_path(path),
    })
}
