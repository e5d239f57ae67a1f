//! Registry binding scan events to the achievements they advance.
//!
//! Loaded from JSON at startup so achievement sets can change without a
//! release:
//!
//! ```json
//! {
//!   "version": 1,
//!   "bindings": {
//!     "onIncrement": ["06efe0b2-394e-4a7e-afad-f5499f9542f3"],
//!     "onRedemption": ["18c44de5-f201-49c3-8dc2-ba005978b0ac"]
//!   }
//! }
//! ```

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use uuid::Uuid;

use super::{AchievementEvent, AchievementId};

/// Current supported registry version.
const SUPPORTED_VERSION: u32 = 1;

/// Errors raised while loading an achievement binding registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AchievementBindingsError {
    /// The registry file could not be read.
    #[error("failed to read achievement bindings at '{path}': {message}")]
    Io {
        /// Path to the registry file.
        path: PathBuf,
        /// Description of the I/O error.
        message: String,
    },
    /// The registry JSON is malformed or missing required fields.
    #[error("invalid achievement bindings JSON: {message}")]
    Parse {
        /// Description of the parse error.
        message: String,
    },
    /// The registry version is not supported.
    #[error("unsupported achievement bindings version: expected {expected}, found {actual}")]
    UnsupportedVersion {
        /// Expected version number.
        expected: u32,
        /// Version found in the registry.
        actual: u32,
    },
    /// An achievement id is not a valid UUID.
    #[error("invalid achievement UUID for {event} at index {index}: {value}")]
    InvalidAchievementId {
        /// Event whose list holds the id.
        event: AchievementEvent,
        /// Index of the invalid id.
        index: usize,
        /// The rejected text.
        value: String,
    },
    /// The same achievement is listed twice for one event.
    #[error("achievement {id} is bound to {event} more than once")]
    DuplicateAchievement {
        /// Event whose list holds the duplicate.
        event: AchievementEvent,
        /// Duplicated id.
        id: Uuid,
    },
}

/// Validated mapping from scan event to bound achievements.
///
/// # Example
///
/// ```
/// use loyalty_backend::domain::{AchievementBindings, AchievementEvent};
///
/// let json = r#"{
///     "version": 1,
///     "bindings": {
///         "onIncrement": ["8eb923a2-44b3-4439-a6a4-c89d9781dd87"],
///         "onRedemption": []
///     }
/// }"#;
///
/// let bindings = AchievementBindings::from_json(json).expect("valid bindings");
/// assert_eq!(bindings.for_event(AchievementEvent::OnIncrement).len(), 1);
/// assert!(bindings.for_event(AchievementEvent::OnRedemption).is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AchievementBindings {
    on_increment: Vec<AchievementId>,
    on_redemption: Vec<AchievementId>,
}

impl AchievementBindings {
    /// Build bindings directly, sorting and deduplicating each list.
    pub fn new(
        on_increment: impl IntoIterator<Item = AchievementId>,
        on_redemption: impl IntoIterator<Item = AchievementId>,
    ) -> Self {
        let sorted = |ids: BTreeSet<AchievementId>| -> Vec<AchievementId> { ids.into_iter().collect() };
        Self {
            on_increment: sorted(on_increment.into_iter().collect()),
            on_redemption: sorted(on_redemption.into_iter().collect()),
        }
    }

    /// Parse bindings from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns [`AchievementBindingsError`] if the JSON is malformed, the
    /// version is unsupported, an id is not a UUID, or an id repeats within
    /// one event.
    pub fn from_json(json: &str) -> Result<Self, AchievementBindingsError> {
        let raw: RawBindingsFile =
            serde_json::from_str(json).map_err(|e| AchievementBindingsError::Parse {
                message: e.to_string(),
            })?;
        Self::from_raw(raw)
    }

    /// Load bindings from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`AchievementBindingsError`] if the file cannot be read or
    /// parsed.
    pub fn from_file(path: &Path) -> Result<Self, AchievementBindingsError> {
        let contents = fs::read_to_string(path).map_err(|e| AchievementBindingsError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_json(&contents)
    }

    fn from_raw(raw: RawBindingsFile) -> Result<Self, AchievementBindingsError> {
        if raw.version != SUPPORTED_VERSION {
            return Err(AchievementBindingsError::UnsupportedVersion {
                expected: SUPPORTED_VERSION,
                actual: raw.version,
            });
        }
        Ok(Self {
            on_increment: parse_ids(AchievementEvent::OnIncrement, raw.bindings.on_increment)?,
            on_redemption: parse_ids(AchievementEvent::OnRedemption, raw.bindings.on_redemption)?,
        })
    }

    /// Achievements advanced by `event`, in ascending id order.
    pub fn for_event(&self, event: AchievementEvent) -> &[AchievementId] {
        match event {
            AchievementEvent::OnIncrement => &self.on_increment,
            AchievementEvent::OnRedemption => &self.on_redemption,
        }
    }
}

fn parse_ids(
    event: AchievementEvent,
    raw: Vec<String>,
) -> Result<Vec<AchievementId>, AchievementBindingsError> {
    let mut seen = BTreeSet::new();
    for (index, value) in raw.into_iter().enumerate() {
        let uuid = Uuid::parse_str(&value).map_err(|_| {
            AchievementBindingsError::InvalidAchievementId {
                event,
                index,
                value: value.clone(),
            }
        })?;
        if !seen.insert(AchievementId::from_uuid(uuid)) {
            return Err(AchievementBindingsError::DuplicateAchievement { event, id: uuid });
        }
    }
    Ok(seen.into_iter().collect())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawBindingsFile {
    version: u32,
    bindings: RawBindings,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawBindings {
    #[serde(default)]
    on_increment: Vec<String>,
    #[serde(default)]
    on_redemption: Vec<String>,
}
