//! Identity store contract.
//!
//! The store does not enforce username/email uniqueness; enrollment checks
//! it before appending.

use crate::types::Identity;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("storage backend: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("stored identity list is unreadable: {0}")]
    Corrupt(String),
    #[error("no identity with id {0}")]
    UnknownId(String),
}

/// Username and email held by one stored record, lowercased. Taken from
/// the raw record, so records that fail the schema check still hold theirs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Claim {
    pub username: Option<String>,
    pub email: Option<String>,
}

impl Claim {
    pub fn new(username: Option<&str>, email: Option<&str>) -> Self {
        Self {
            username: username.map(str::to_lowercase),
            email: email.map(str::to_lowercase),
        }
    }
}

impl From<&Identity> for Claim {
    fn from(identity: &Identity) -> Self {
        Self::new(Some(identity.username()), Some(identity.email()))
    }
}

/// All decodable identities in store order, plus the number of stored
/// records that failed the schema check and were left out.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    pub identities: Vec<Identity>,
    pub rejected: usize,
    /// One entry per stored record, rejected records included.
    pub claims: Vec<Claim>,
}

impl Roster {
    pub fn from_identities(identities: Vec<Identity>) -> Self {
        let claims = identities.iter().map(Claim::from).collect();
        Self {
            identities,
            rejected: 0,
            claims,
        }
    }

    /// Whether any stored record holds this username, ignoring case.
    pub fn username_taken(&self, username: &str) -> bool {
        let username = username.to_lowercase();
        self.claims
            .iter()
            .any(|c| c.username.as_deref() == Some(username.as_str()))
    }

    /// Whether any stored record holds this email, ignoring case.
    pub fn email_taken(&self, email: &str) -> bool {
        let email = email.to_lowercase();
        self.claims
            .iter()
            .any(|c| c.email.as_deref() == Some(email.as_str()))
    }
}

/// Durable list of enrolled identities.
///
/// Every operation reads or rewrites the whole list atomically; a failed
/// operation leaves the stored list as it was.
pub trait IdentityStore {
    /// Load every record, reporting read faults.
    fn load(&self) -> Result<Roster, StoreError>;

    /// Add one record at the end of the list.
    fn append(&self, identity: &Identity) -> Result<(), StoreError>;

    /// Replace the record with the same id. Fails with
    /// [`StoreError::UnknownId`] and changes nothing if there is none.
    fn update(&self, identity: &Identity) -> Result<(), StoreError>;

    /// All records in insertion order. A missing or unreadable store reads
    /// as empty.
    fn list(&self) -> Vec<Identity> {
        match self.load() {
            Ok(roster) => roster.identities,
            Err(err) => {
                tracing::warn!(error = %err, "identity store unreadable; treating as empty");
                Vec::new()
            }
        }
    }

    fn find_by_username(&self, username: &str) -> Option<Identity> {
        self.list().into_iter().find(|i| i.has_username(username))
    }

    fn find_by_email(&self, email: &str) -> Option<Identity> {
        self.list().into_iter().find(|i| i.has_email(email))
    }

    /// First record whose username or email equals the given one, ignoring case.
    fn exists_by_username_or_email(&self, username: &str, email: &str) -> Option<Identity> {
        self.list()
            .into_iter()
            .find(|i| i.has_username(username) || i.has_email(email))
    }
}
