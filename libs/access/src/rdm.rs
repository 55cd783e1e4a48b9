//! Request builders for the control-plane domains
//!
//! Registering one of these requests gives the application its own view of
//! the login, directory or dictionary stream the consumer runs internally.

use codec::{Verbosity, ENUM_DICTIONARY_NAME, FIELD_DICTIONARY_NAME};
use types::rdm::directory::filter_mask;
use types::rdm::login::LoginRtt;
use types::{DomainType, GenericMsg, ReqMsg};

/// Login stream: the cached refresh, then channel state changes and RTT probes
pub fn login_request() -> ReqMsg {
    ReqMsg::new().domain(DomainType::LOGIN)
}

/// Source directory with service info and state, for every service
pub fn directory_request() -> ReqMsg {
    ReqMsg::new()
        .domain(DomainType::SOURCE)
        .filter(filter_mask::INFO_STATE)
}

/// Source directory restricted to one service
pub fn service_directory_request(service: impl Into<String>) -> ReqMsg {
    directory_request().service_name(service)
}

/// Field definitions published by `service`
pub fn field_dictionary_request(service: impl Into<String>, verbosity: Verbosity) -> ReqMsg {
    dictionary_request(FIELD_DICTIONARY_NAME, service, verbosity)
}

/// Enumerated type tables published by `service`
pub fn enum_dictionary_request(service: impl Into<String>, verbosity: Verbosity) -> ReqMsg {
    dictionary_request(ENUM_DICTIONARY_NAME, service, verbosity)
}

fn dictionary_request(name: &str, service: impl Into<String>, verbosity: Verbosity) -> ReqMsg {
    ReqMsg::new()
        .domain(DomainType::DICTIONARY)
        .name(name)
        .service_name(service)
        .filter(verbosity.filter())
        .interest_after_refresh(false)
}

/// Round-trip latency reported on a login generic message
pub fn round_trip_latency(generic: &GenericMsg) -> Option<u64> {
    LoginRtt::from_generic(generic).and_then(|rtt| rtt.latency)
}
