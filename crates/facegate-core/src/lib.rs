//! facegate-core — Face descriptor matching and enrollment.
//!
//! A captured descriptor is matched against enrolled identities with a fixed
//! Euclidean threshold; unrecognised descriptors enter an enrollment state
//! machine that validates attributes and commits a new identity.

pub mod auth;
pub mod capture;
pub mod enrollment;
pub mod matcher;
pub mod store;
pub mod types;
pub mod validation;

pub use auth::{Authenticator, ScanOutcome};
pub use capture::{CaptureFailure, CaptureOutcome, CaptureReport};
pub use enrollment::{
    Enrollment, EnrollmentError, EnrollmentState, PendingDescriptor, SubmitError,
};
pub use matcher::{FirstMatchMatcher, MatchResult, Matcher, MATCH_THRESHOLD};
pub use store::{Claim, IdentityStore, Roster, StoreError};
pub use types::{Descriptor, DescriptorError, Identity, DESCRIPTOR_DIM};
pub use validation::{EmailError, FieldErrors, Registration, UsernameError};
