//! Enrollment state machine.
//!
//! One instance per unrecognised capture:
//!
//! ```text
//! Idle -> PendingDescriptor -> CollectingAttributes -> Committed
//!              \                      /
//!               +----> Cancelled <---+
//! ```
//!
//! The pending descriptor lives inside the machine and is dropped on commit
//! or cancel. Nothing is persisted until commit.

use crate::store::{IdentityStore, StoreError};
use crate::types::{Descriptor, DescriptorError, Identity};
use crate::validation::{self, FieldErrors, Registration};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A captured descriptor awaiting identity attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingDescriptor {
    pub descriptor: Descriptor,
    pub captured_at: DateTime<Utc>,
    /// Reference to the captured preview image, if the capture step kept one.
    #[serde(default)]
    pub preview: Option<String>,
}

impl PendingDescriptor {
    pub fn new(descriptor: Descriptor, preview: Option<String>) -> Self {
        Self {
            descriptor,
            captured_at: Utc::now(),
            preview,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnrollmentState {
    Idle,
    PendingDescriptor(PendingDescriptor),
    CollectingAttributes {
        pending: PendingDescriptor,
        /// Field errors from the last rejected submission.
        errors: FieldErrors,
    },
    Committed(Identity),
    Cancelled,
}

impl EnrollmentState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::PendingDescriptor(_) => "pending_descriptor",
            Self::CollectingAttributes { .. } => "collecting_attributes",
            Self::Committed(_) => "committed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Committed(_) | Self::Cancelled)
    }
}

#[derive(Error, Debug)]
pub enum EnrollmentError {
    #[error("cannot {action} while enrollment is {state}")]
    InvalidTransition {
        action: &'static str,
        state: &'static str,
    },
    #[error("descriptor cannot be enrolled: {0}")]
    Descriptor(#[from] DescriptorError),
}

#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("{0}")]
    Validation(FieldErrors),
    #[error("Registration failed. Please try again. ({0})")]
    Persistence(#[from] StoreError),
    #[error(transparent)]
    State(#[from] EnrollmentError),
}

/// Enrollment of one unrecognised descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct Enrollment {
    state: EnrollmentState,
}

impl Default for Enrollment {
    fn default() -> Self {
        Self::new()
    }
}

impl Enrollment {
    pub fn new() -> Self {
        Self {
            state: EnrollmentState::Idle,
        }
    }

    /// Rebuild a machine around a pending descriptor handed over from an
    /// earlier step (e.g. across a process boundary).
    pub fn resume(pending: PendingDescriptor) -> Result<Self, EnrollmentError> {
        pending.descriptor.validate()?;
        Ok(Self {
            state: EnrollmentState::PendingDescriptor(pending),
        })
    }

    pub fn state(&self) -> &EnrollmentState {
        &self.state
    }

    /// The staged descriptor, while one is held.
    pub fn pending(&self) -> Option<&PendingDescriptor> {
        match &self.state {
            EnrollmentState::PendingDescriptor(p)
            | EnrollmentState::CollectingAttributes { pending: p, .. } => Some(p),
            _ => None,
        }
    }

    /// `Idle -> PendingDescriptor`.
    pub fn stage(&mut self, pending: PendingDescriptor) -> Result<(), EnrollmentError> {
        if !matches!(self.state, EnrollmentState::Idle) {
            return Err(self.invalid("stage a descriptor"));
        }
        pending.descriptor.validate()?;
        tracing::debug!("descriptor staged for enrollment");
        self.state = EnrollmentState::PendingDescriptor(pending);
        Ok(())
    }

    /// Submit identity attributes.
    ///
    /// Validation failures and store faults leave the machine in
    /// `CollectingAttributes` with the descriptor still staged, so the
    /// caller can correct and resubmit. On success the identity is appended
    /// to the store, the staged descriptor is dropped and the machine is
    /// `Committed`.
    pub fn submit<S: IdentityStore + ?Sized>(
        &mut self,
        store: &S,
        form: &Registration,
    ) -> Result<Identity, SubmitError> {
        let pending = match std::mem::replace(&mut self.state, EnrollmentState::Idle) {
            EnrollmentState::PendingDescriptor(p)
            | EnrollmentState::CollectingAttributes { pending: p, .. } => p,
            other => {
                self.state = other;
                return Err(self.invalid("submit attributes").into());
            }
        };

        let errors = validation::validate(form, store);
        if !errors.is_empty() {
            tracing::info!(%errors, "registration rejected");
            self.state = EnrollmentState::CollectingAttributes { pending, errors };
            return Err(SubmitError::Validation(errors));
        }

        let identity = Identity::enroll(
            form.username.trim(),
            form.email.trim(),
            pending.descriptor.clone(),
        );

        if let Err(err) = store.append(&identity) {
            tracing::warn!(error = %err, "failed to persist new identity");
            self.state = EnrollmentState::CollectingAttributes {
                pending,
                errors: FieldErrors::default(),
            };
            return Err(SubmitError::Persistence(err));
        }

        tracing::info!(id = identity.id(), username = identity.username(), "identity enrolled");
        self.state = EnrollmentState::Committed(identity.clone());
        Ok(identity)
    }

    /// Discard the staged descriptor. Only valid while a descriptor is held.
    pub fn cancel(&mut self) -> Result<(), EnrollmentError> {
        if self.pending().is_none() {
            return Err(self.invalid("cancel"));
        }
        tracing::debug!(from = self.state.name(), "enrollment cancelled");
        self.state = EnrollmentState::Cancelled;
        Ok(())
    }

    fn invalid(&self, action: &'static str) -> EnrollmentError {
        EnrollmentError::InvalidTransition {
            action,
            state: self.state.name(),
        }
    }
}
