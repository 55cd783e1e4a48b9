//! Shared open/complete bookkeeping for container builders

use crate::common::errors::{ValidationError, ValidationResult};

/// Fail if entries are added to a completed container
pub(crate) fn ensure_open(completed: bool, container: &'static str) -> ValidationResult<()> {
    if completed {
        Err(ValidationError::AddAfterComplete { container })
    } else {
        Ok(())
    }
}

/// Mark a container complete, rejecting a second call or an empty container
pub(crate) fn complete(
    completed: &mut bool,
    entries: usize,
    container: &'static str,
) -> ValidationResult<()> {
    if *completed {
        return Err(ValidationError::AlreadyCompleted { container });
    }
    if entries == 0 {
        return Err(ValidationError::EmptyContainer { container });
    }
    *completed = true;
    Ok(())
}
