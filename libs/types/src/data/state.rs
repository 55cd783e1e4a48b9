//! Stream state × data state × status code × text

use crate::protocol::{DataState, StatusCode, StreamState};
use std::fmt;

/// State carried by refresh and status messages
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct State {
    pub stream_state: StreamState,
    pub data_state: DataState,
    pub code: StatusCode,
    pub text: String,
}

impl State {
    pub fn new(
        stream_state: StreamState,
        data_state: DataState,
        code: StatusCode,
        text: impl Into<String>,
    ) -> Self {
        Self {
            stream_state,
            data_state,
            code,
            text: text.into(),
        }
    }

    /// Open / Ok / None
    pub fn open_ok(text: impl Into<String>) -> Self {
        Self::new(StreamState::Open, DataState::Ok, StatusCode::NONE, text)
    }

    /// Open / Suspect with the given code
    pub fn open_suspect(code: StatusCode, text: impl Into<String>) -> Self {
        Self::new(StreamState::Open, DataState::Suspect, code, text)
    }

    /// Closed / Suspect with the given code
    pub fn closed(code: StatusCode, text: impl Into<String>) -> Self {
        Self::new(StreamState::Closed, DataState::Suspect, code, text)
    }

    /// ClosedRecover / Suspect with the given code
    pub fn closed_recover(code: StatusCode, text: impl Into<String>) -> Self {
        Self::new(StreamState::ClosedRecover, DataState::Suspect, code, text)
    }

    /// NonStreaming / Ok
    pub fn non_streaming(text: impl Into<String>) -> Self {
        Self::new(StreamState::NonStreaming, DataState::Ok, StatusCode::NONE, text)
    }

    pub fn is_ok(&self) -> bool {
        self.data_state == DataState::Ok
    }

    pub fn is_final(&self) -> bool {
        self.stream_state.is_final()
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} / {:?} / {} / '{}'",
            self.stream_state, self.data_state, self.code, self.text
        )
    }
}
