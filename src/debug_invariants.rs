//! Structural self-checks for the setup tables.
//!
//! Tables are built once and never written again, so one check right after
//! construction covers their whole lifetime. Release builds skip the check
//! unless the `check-invariants` feature is on.

use crate::halo_error::HaloError;

pub trait DebugInvariants {
    /// Validate invariants and return the first violation.
    fn validate_invariants(&self) -> Result<(), HaloError>;

    /// Panic on a violation in debug builds or with `check-invariants`.
    fn debug_assert_invariants(&self) {
        #[cfg(any(debug_assertions, feature = "check-invariants"))]
        if let Err(e) = self.validate_invariants() {
            panic!("[invariants] {}: {e}", std::any::type_name::<Self>());
        }
    }
}
