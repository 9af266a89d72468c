//! API schema version parsing and range checks.
//!
//! Servers report versions such as `2.0.0`, `3.0.1.4` or `3.1.0-beta0001`.
//! Missing numeric components count as zero; a pre-release sorts before the
//! matching release.

use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::error::ClientError;

/// Lowest API schema version this client understands.
pub const SUPPORTED_API_VERSION_MIN: ApiVersion = ApiVersion::new(2, 0, 0);
/// Highest API schema version this client understands.
pub const SUPPORTED_API_VERSION_MAX: ApiVersion = ApiVersion::new(3, 0, 0);

/// Dotted API schema version with an optional pre-release tag.
///
/// Equality, hashing and ordering all ignore the case of the pre-release tag.
#[derive(Debug, Clone)]
pub struct ApiVersion {
    major: u64,
    minor: u64,
    patch: u64,
    revision: u64,
    pre_release: Option<String>,
}

impl ApiVersion {
    /// Construct a release version.
    #[must_use]
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            revision: 0,
            pre_release: None,
        }
    }

    /// Major component.
    #[must_use]
    pub const fn major(&self) -> u64 {
        self.major
    }

    /// Pre-release tag, if any.
    #[must_use]
    pub fn pre_release(&self) -> Option<&str> {
        self.pre_release.as_deref()
    }

    const fn numeric(&self) -> [u64; 4] {
        [self.major, self.minor, self.patch, self.revision]
    }
}

/// Reason an API version string could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid API version '{value}': {reason}")]
pub struct ParseVersionError {
    value: String,
    reason: &'static str,
}

impl FromStr for ApiVersion {
    type Err = ParseVersionError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let invalid = |reason| ParseVersionError {
            value: input.to_string(),
            reason,
        };

        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(invalid("version is empty"));
        }

        let (numbers, pre_release) = match trimmed.split_once('-') {
            Some((_, tag)) if tag.is_empty() => return Err(invalid("pre-release tag is empty")),
            Some((numbers, tag)) => (numbers, Some(tag.to_string())),
            None => (trimmed, None),
        };

        let mut parts = [0_u64; 4];
        let mut count = 0;
        for component in numbers.split('.') {
            if count == parts.len() {
                return Err(invalid("too many numeric components"));
            }
            parts[count] = component
                .parse::<u64>()
                .map_err(|_| invalid("numeric component expected"))?;
            count += 1;
        }

        Ok(Self {
            major: parts[0],
            minor: parts[1],
            patch: parts[2],
            revision: parts[3],
            pre_release,
        })
    }
}

impl Ord for ApiVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.numeric()
            .cmp(&other.numeric())
            .then_with(|| match (&self.pre_release, &other.pre_release) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(left), Some(right)) => left
                    .to_ascii_lowercase()
                    .cmp(&right.to_ascii_lowercase()),
            })
    }
}

impl PartialEq for ApiVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ApiVersion {}

impl Hash for ApiVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.numeric().hash(state);
        self.pre_release
            .as_ref()
            .map(|tag| tag.to_ascii_lowercase())
            .hash(state);
    }
}

impl PartialOrd for ApiVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Display for ApiVersion {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if self.revision > 0 {
            write!(formatter, ".{}", self.revision)?;
        }
        if let Some(tag) = &self.pre_release {
            write!(formatter, "-{tag}")?;
        }
        Ok(())
    }
}

/// Inclusive range of API versions accepted during session establishment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    /// Lowest accepted version.
    pub min: ApiVersion,
    /// Highest accepted version.
    pub max: ApiVersion,
}

impl Default for VersionRange {
    fn default() -> Self {
        Self {
            min: SUPPORTED_API_VERSION_MIN,
            max: SUPPORTED_API_VERSION_MAX,
        }
    }
}

impl VersionRange {
    /// Whether `version` lies within `[min, max]`.
    #[must_use]
    pub fn contains(&self, version: &ApiVersion) -> bool {
        *version >= self.min && *version <= self.max
    }

    /// Validate a server-reported version string against the range.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::IncompatibleServer`] when the string is empty,
    /// unparseable, or outside the range.
    pub fn check(&self, reported: &str) -> Result<ApiVersion, ClientError> {
        let incompatible = || ClientError::IncompatibleServer {
            reported: reported.to_string(),
            min: self.min.clone(),
            max: self.max.clone(),
        };

        let version = reported.parse::<ApiVersion>().map_err(|_| incompatible())?;
        if self.contains(&version) {
            Ok(version)
        } else {
            Err(incompatible())
        }
    }
}
