use crate::codec;
use crate::medium::KvMedium;
use facegate_core::{Identity, IdentityStore, Roster, StoreError};
use serde_json::Value;

/// Key under which the identity list is stored.
pub const IDENTITIES_KEY: &str = "registeredUsers";

/// [`IdentityStore`] keeping the whole identity list under one key of a
/// [`KvMedium`].
///
/// Records that fail the schema check on load are invisible to callers but
/// are written back verbatim when the list is rewritten.
pub struct KvIdentityStore<M> {
    medium: M,
    key: String,
}

impl<M: KvMedium> KvIdentityStore<M> {
    pub fn new(medium: M) -> Self {
        Self::with_key(medium, IDENTITIES_KEY)
    }

    pub fn with_key(medium: M, key: &str) -> Self {
        Self {
            medium,
            key: key.to_string(),
        }
    }

    pub fn medium(&self) -> &M {
        &self.medium
    }

    fn rewrite(
        &self,
        mut change: impl FnMut(&mut Vec<Value>) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        self.medium.modify(&self.key, &mut |current| {
            let mut records = match current {
                Some(raw) => codec::parse_list(&raw)?,
                None => Vec::new(),
            };
            change(&mut records)?;
            codec::encode(&records)
        })
    }
}

impl<M: KvMedium> IdentityStore for KvIdentityStore<M> {
    fn load(&self) -> Result<Roster, StoreError> {
        match self.medium.get(&self.key)? {
            Some(raw) => Ok(codec::decode(codec::parse_list(&raw)?)),
            None => Ok(Roster::default()),
        }
    }

    fn append(&self, identity: &Identity) -> Result<(), StoreError> {
        let record = serde_json::to_value(identity)?;
        self.rewrite(|records| {
            records.push(record.clone());
            Ok(())
        })?;
        tracing::debug!(id = identity.id(), "identity appended");
        Ok(())
    }

    fn update(&self, identity: &Identity) -> Result<(), StoreError> {
        let record = serde_json::to_value(identity)?;
        self.rewrite(|records| {
            let slot = records
                .iter_mut()
                .find(|r| codec::record_id(r) == Some(identity.id()))
                .ok_or_else(|| StoreError::UnknownId(identity.id().to_string()))?;
            *slot = record.clone();
            Ok(())
        })?;
        tracing::debug!(id = identity.id(), "identity updated");
        Ok(())
    }
}
