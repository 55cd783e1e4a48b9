//! Checks over what a consumer client observed

use crate::fixtures::Observed;
use access::Handle;
use thiserror::Error;
use types::{DataState, StreamState};

#[derive(Debug, Error, PartialEq)]
pub enum StreamViolation {
    #[error("handle {handle}: first message was not a refresh")]
    MissingRefresh { handle: u64 },

    #[error("handle {handle}: {count} refreshes, expected one")]
    RepeatedRefresh { handle: u64, count: usize },

    #[error("handle {handle}: update {got} arrived where {expected} was due")]
    OutOfOrder { handle: u64, expected: u32, got: u32 },

    #[error("handle {handle}: {got} updates, expected {expected}")]
    UpdateCount { handle: u64, expected: usize, got: usize },

    #[error("handle {handle}: no Open/Suspect status before the refresh that recovered it")]
    NoSuspectBeforeRecovery { handle: u64 },
}

/// One refresh, then updates 1..=`updates` each exactly once and in order
pub fn validate_item_stream(observed: &[Observed], handle: Handle, updates: u32) -> Result<(), StreamViolation> {
    let raw = handle.raw();
    let stream: Vec<&Observed> = observed.iter().filter(|o| o.handle() == handle).collect();
    if !matches!(stream.first(), Some(Observed::Refresh { .. })) {
        return Err(StreamViolation::MissingRefresh { handle: raw });
    }
    let refreshes = stream
        .iter()
        .filter(|o| matches!(o, Observed::Refresh { .. }))
        .count();
    if refreshes != 1 {
        return Err(StreamViolation::RepeatedRefresh {
            handle: raw,
            count: refreshes,
        });
    }
    let seqs: Vec<u32> = stream
        .iter()
        .filter_map(|o| match o {
            Observed::Update { seq, .. } => Some(*seq),
            _ => None,
        })
        .collect();
    for (expected, &got) in (1..).zip(&seqs) {
        if got != expected {
            return Err(StreamViolation::OutOfOrder {
                handle: raw,
                expected,
                got,
            });
        }
    }
    if seqs.len() != updates as usize {
        return Err(StreamViolation::UpdateCount {
            handle: raw,
            expected: updates as usize,
            got: seqs.len(),
        });
    }
    Ok(())
}

/// The stream went Open/Suspect after its first refresh and a later refresh reopened it
pub fn validate_recovery(observed: &[Observed], handle: Handle) -> Result<(), StreamViolation> {
    let violation = StreamViolation::NoSuspectBeforeRecovery { handle: handle.raw() };
    let stream: Vec<&Observed> = observed.iter().filter(|o| o.handle() == handle).collect();
    let suspect = stream
        .iter()
        .position(|o| {
            matches!(o, Observed::Status { state: Some(state), .. }
                if state.stream_state == StreamState::Open && state.data_state == DataState::Suspect)
        })
        .ok_or(violation)?;
    let recovered = stream[suspect..].iter().any(|o| {
        matches!(o, Observed::Refresh { state, .. }
            if state.stream_state == StreamState::Open && state.data_state == DataState::Ok)
    });
    if recovered {
        Ok(())
    } else {
        Err(StreamViolation::NoSuspectBeforeRecovery { handle: handle.raw() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::{State, StatusCode};

    fn refresh(handle: Handle) -> Observed {
        Observed::Refresh {
            handle,
            parent: None,
            state: State::open_ok(""),
        }
    }

    #[test]
    fn ordered_stream_passes() {
        let h = Handle::from_raw(1);
        let observed = vec![
            refresh(h),
            Observed::Update { handle: h, seq: 1 },
            Observed::Update { handle: h, seq: 2 },
        ];
        assert_eq!(validate_item_stream(&observed, h, 2), Ok(()));
    }

    #[test]
    fn swapped_updates_are_reported() {
        let h = Handle::from_raw(1);
        let observed = vec![
            refresh(h),
            Observed::Update { handle: h, seq: 2 },
            Observed::Update { handle: h, seq: 1 },
        ];
        assert_eq!(
            validate_item_stream(&observed, h, 2),
            Err(StreamViolation::OutOfOrder {
                handle: 1,
                expected: 1,
                got: 2
            })
        );
    }

    #[test]
    fn recovery_needs_suspect_then_refresh() {
        let h = Handle::from_raw(3);
        let suspect = Observed::Status {
            handle: h,
            state: Some(State::open_suspect(StatusCode::NONE, "channel down")),
        };
        assert!(validate_recovery(&[refresh(h), suspect.clone()], h).is_err());
        assert_eq!(validate_recovery(&[refresh(h), suspect, refresh(h)], h), Ok(()));
    }
}
