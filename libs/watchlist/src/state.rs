//! Per-item stream state machine
//!
//! ```text
//! Unopened ─request─→ Pending ─refresh─→ Open ⇄ Suspect
//!                        │                 │
//!                        └──── status ─────┴─→ ClosedRecoverable ─retry─→ Pending
//!                                          └─→ Closed
//! ```
//!
//! A refresh with NonStreaming state, or any request with
//! `interest_after_refresh` off, closes the stream once the final part arrives.

use types::{DataState, State, StreamState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemState {
    /// Registered but no request on the wire yet
    Unopened,
    /// Request sent, waiting for the solicited refresh
    Pending,
    Open,
    /// Open but the data can no longer be trusted
    Suspect,
    /// Closed by the provider or the channel; the watchlist will re-request
    ClosedRecoverable,
    Closed,
}

impl ItemState {
    /// Update, generic and post traffic is only legal in these states
    pub fn is_open(self) -> bool {
        matches!(self, ItemState::Open | ItemState::Suspect)
    }

    pub fn is_closed(self) -> bool {
        self == ItemState::Closed
    }
}

/// Result of applying an inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Deliver and move to the new state
    Deliver(ItemState),
    /// Deliver and retire the handle
    Close,
    /// Deliver rewritten to Open/Suspect and re-request
    Recover(State),
    /// Drop silently
    Discard,
    /// Drop and report misuse
    Violation(&'static str),
}

/// Refresh arriving in `current`
pub fn on_refresh(current: ItemState, state: &State, complete: bool, streaming: bool) -> Transition {
    if current.is_closed() {
        return Transition::Discard;
    }
    match state.stream_state {
        StreamState::Open if !streaming && complete => Transition::Close,
        StreamState::Open | StreamState::Unspecified => Transition::Deliver(data_state(state)),
        StreamState::NonStreaming if complete => Transition::Close,
        StreamState::NonStreaming => Transition::Deliver(data_state(state)),
        StreamState::ClosedRecover => Transition::Recover(suspect(state)),
        StreamState::Closed | StreamState::Redirected => Transition::Close,
    }
}

/// Update arriving in `current`
pub fn on_update(current: ItemState) -> Transition {
    match current {
        ItemState::Open | ItemState::Suspect => Transition::Deliver(current),
        ItemState::Closed => Transition::Discard,
        _ => Transition::Violation("update received before the stream was opened by a refresh"),
    }
}

/// Status arriving in `current`
pub fn on_status(current: ItemState, state: Option<&State>) -> Transition {
    if current.is_closed() {
        return Transition::Discard;
    }
    let Some(state) = state else {
        return Transition::Deliver(current);
    };
    match state.stream_state {
        StreamState::Open | StreamState::Unspecified => match (current, state.data_state) {
            (ItemState::Open | ItemState::Suspect, DataState::Suspect) => {
                Transition::Deliver(ItemState::Suspect)
            }
            (ItemState::Suspect, DataState::Ok) => Transition::Deliver(ItemState::Open),
            _ => Transition::Deliver(current),
        },
        StreamState::NonStreaming => Transition::Deliver(current),
        StreamState::ClosedRecover => Transition::Recover(suspect(state)),
        StreamState::Closed | StreamState::Redirected => Transition::Close,
    }
}

fn data_state(state: &State) -> ItemState {
    if state.data_state == DataState::Suspect {
        ItemState::Suspect
    } else {
        ItemState::Open
    }
}

fn suspect(state: &State) -> State {
    State::open_suspect(state.code, state.text.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::StatusCode;

    #[test]
    fn refresh_opens_pending_stream() {
        let ok = State::open_ok("");
        assert_eq!(
            on_refresh(ItemState::Pending, &ok, true, true),
            Transition::Deliver(ItemState::Open)
        );
        let suspect = State::open_suspect(StatusCode::NONE, "stale");
        assert_eq!(
            on_refresh(ItemState::Pending, &suspect, true, true),
            Transition::Deliver(ItemState::Suspect)
        );
    }

    #[test]
    fn snapshot_closes_after_final_part() {
        let ok = State::open_ok("");
        assert_eq!(
            on_refresh(ItemState::Pending, &ok, false, false),
            Transition::Deliver(ItemState::Open)
        );
        assert_eq!(on_refresh(ItemState::Open, &ok, true, false), Transition::Close);
        let non_streaming = State::non_streaming("");
        assert_eq!(
            on_refresh(ItemState::Pending, &non_streaming, true, true),
            Transition::Close
        );
    }

    #[test]
    fn update_before_open_is_a_violation() {
        assert!(matches!(on_update(ItemState::Pending), Transition::Violation(_)));
        assert!(matches!(on_update(ItemState::Unopened), Transition::Violation(_)));
        assert_eq!(on_update(ItemState::Suspect), Transition::Deliver(ItemState::Suspect));
    }

    #[test]
    fn status_on_closed_stream_is_discarded() {
        let closed = State::closed(StatusCode::NOT_FOUND, "gone");
        assert_eq!(on_status(ItemState::Closed, Some(&closed)), Transition::Discard);
        assert_eq!(on_status(ItemState::Open, Some(&closed)), Transition::Close);
    }

    #[test]
    fn closed_recover_is_rewritten_as_suspect() {
        let recover = State::closed_recover(StatusCode::NO_RESOURCES, "busy");
        assert_eq!(
            on_status(ItemState::Open, Some(&recover)),
            Transition::Recover(State::open_suspect(StatusCode::NO_RESOURCES, "busy"))
        );
    }

    #[test]
    fn suspect_and_ok_statuses_toggle_open_streams() {
        let suspect = State::open_suspect(StatusCode::NONE, "");
        let ok = State::open_ok("");
        assert_eq!(
            on_status(ItemState::Open, Some(&suspect)),
            Transition::Deliver(ItemState::Suspect)
        );
        assert_eq!(
            on_status(ItemState::Suspect, Some(&ok)),
            Transition::Deliver(ItemState::Open)
        );
        assert_eq!(
            on_status(ItemState::Pending, Some(&suspect)),
            Transition::Deliver(ItemState::Pending)
        );
    }
}
