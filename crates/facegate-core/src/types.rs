use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Dimensionality of descriptors produced by the face recognition model.
pub const DESCRIPTOR_DIM: usize = 128;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DescriptorError {
    #[error("expected {expected}-dim descriptor, got {actual}")]
    Dimension { expected: usize, actual: usize },
    #[error("descriptor component {index} is not finite")]
    NonFinite { index: usize },
    #[error("distance is not finite")]
    NonFiniteDistance,
}

/// Face descriptor (128-dimensional embedding).
///
/// Values are kept as produced; a descriptor loaded from storage may be
/// malformed, so anything that relies on the shape calls [`validate`](Self::validate)
/// or goes through [`euclidean_distance`](Self::euclidean_distance), which
/// reports the problem instead of panicking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Descriptor {
    values: Vec<f32>,
}

impl Descriptor {
    /// Build a descriptor, rejecting wrong dimensionality and non-finite values.
    pub fn new(values: Vec<f32>) -> Result<Self, DescriptorError> {
        let descriptor = Self { values };
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Wrap values without checking them.
    pub fn from_raw(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn validate(&self) -> Result<(), DescriptorError> {
        if self.values.len() != DESCRIPTOR_DIM {
            return Err(DescriptorError::Dimension {
                expected: DESCRIPTOR_DIM,
                actual: self.values.len(),
            });
        }
        if let Some(index) = self.values.iter().position(|v| !v.is_finite()) {
            return Err(DescriptorError::NonFinite { index });
        }
        Ok(())
    }

    /// Compute Euclidean distance between two descriptors.
    ///
    /// Accumulates in f64. Fails if the lengths differ or the result is not
    /// a finite number.
    pub fn euclidean_distance(&self, other: &Descriptor) -> Result<f64, DescriptorError> {
        if self.values.len() != other.values.len() {
            return Err(DescriptorError::Dimension {
                expected: self.values.len(),
                actual: other.values.len(),
            });
        }

        let distance = self
            .values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (f64::from(*a) - f64::from(*b)).powi(2))
            .sum::<f64>()
            .sqrt();

        if distance.is_finite() {
            Ok(distance)
        } else {
            Err(DescriptorError::NonFiniteDistance)
        }
    }
}

/// An enrolled identity.
///
/// Serialized with the field names of the persisted record list
/// (`registrationDate`, `lastLogin`). The legacy `faceDescriptor` key is
/// accepted on read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    id: String,
    username: String,
    email: String,
    #[serde(alias = "faceDescriptor")]
    descriptor: Descriptor,
    #[serde(rename = "registrationDate", with = "timestamp")]
    registered_at: DateTime<Utc>,
    #[serde(rename = "lastLogin", with = "timestamp")]
    last_seen_at: DateTime<Utc>,
}

impl Identity {
    /// Create a new identity with a fresh id and both timestamps set to now.
    pub fn enroll(username: &str, email: &str, descriptor: Descriptor) -> Self {
        Self::enroll_at(username, email, descriptor, Utc::now())
    }

    /// Timestamps are truncated to the millisecond precision they are
    /// stored with.
    pub fn enroll_at(
        username: &str,
        email: &str,
        descriptor: Descriptor,
        now: DateTime<Utc>,
    ) -> Self {
        let now = now.trunc_subsecs(3);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            username: username.to_string(),
            email: email.to_string(),
            descriptor,
            registered_at: now,
            last_seen_at: now,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    pub fn registered_at(&self) -> DateTime<Utc> {
        self.registered_at
    }

    pub fn last_seen_at(&self) -> DateTime<Utc> {
        self.last_seen_at
    }

    /// Copy of this identity with `lastSeenAt` moved to `now`. Every other
    /// field, the id included, is carried over untouched.
    pub fn seen_at(&self, now: DateTime<Utc>) -> Self {
        Self {
            last_seen_at: now.trunc_subsecs(3),
            ..self.clone()
        }
    }

    pub fn has_username(&self, username: &str) -> bool {
        self.username.to_lowercase() == username.to_lowercase()
    }

    pub fn has_email(&self, email: &str) -> bool {
        self.email.to_lowercase() == email.to_lowercase()
    }

    /// Structural checks applied to records decoded from storage.
    pub fn check_schema(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("empty id".into());
        }
        if self.username.trim().is_empty() {
            return Err("empty username".into());
        }
        if self.email.trim().is_empty() {
            return Err("empty email".into());
        }
        Ok(())
    }
}

/// ISO-8601 timestamps with millisecond precision and a `Z` suffix.
mod timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
