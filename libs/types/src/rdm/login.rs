//! Login domain payloads
//!
//! The login request names the user in its key and carries application
//! attributes as an element list in `key.attrib`. The provider's refresh echoes
//! the attributes it supports. A provider that measures round-trip latency sends
//! Generic messages carrying `Ticks`; the consumer echoes them back unchanged.

use super::{name_type, names};
use crate::common::errors::ValidationResult;
use crate::data::{Data, ElementList};
use crate::messages::{GenericMsg, RefreshMsg, ReqMsg};
use crate::protocol::DomainType;

/// `RoundTripLatency` attribute value advertising RTT support
pub const RTT_SUPPORTED: u64 = 2;

/// Consumer login request attributes
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LoginRequest {
    pub user_name: String,
    pub name_type: u8,
    pub application_id: Option<String>,
    pub application_name: Option<String>,
    pub position: Option<String>,
    pub password: Option<String>,
    pub single_open: bool,
    pub allow_suspect_data: bool,
    pub support_rtt: bool,
}

impl LoginRequest {
    pub fn new(user_name: impl Into<String>) -> Self {
        Self {
            user_name: user_name.into(),
            name_type: name_type::USER_NAME,
            // The watchlist performs recovery itself
            single_open: false,
            allow_suspect_data: true,
            ..Self::default()
        }
    }

    pub fn to_req_msg(&self, stream_id: i32) -> ValidationResult<ReqMsg> {
        let mut attrib = ElementList::new();
        if let Some(id) = &self.application_id {
            attrib.add_ascii(names::APPLICATION_ID, id.clone())?;
        }
        if let Some(name) = &self.application_name {
            attrib.add_ascii(names::APPLICATION_NAME, name.clone())?;
        }
        if let Some(position) = &self.position {
            attrib.add_ascii(names::POSITION, position.clone())?;
        }
        if let Some(password) = &self.password {
            attrib.add_ascii(names::PASSWORD, password.clone())?;
        }
        attrib
            .add_uint(names::SINGLE_OPEN, self.single_open as u64)?
            .add_uint(names::ALLOW_SUSPECT_DATA, self.allow_suspect_data as u64)?;
        if self.support_rtt {
            attrib.add_uint(names::ROUND_TRIP_LATENCY, RTT_SUPPORTED)?;
        }
        attrib.complete()?;

        Ok(ReqMsg::new()
            .stream_id(stream_id)
            .domain(DomainType::LOGIN)
            .name(self.user_name.clone())
            .name_type(self.name_type)
            .attrib(attrib))
    }

    pub fn from_req_msg(request: &ReqMsg) -> Self {
        let attrib = request.key.attrib.as_deref().and_then(Data::as_element_list);
        let text = |name: &str| {
            attrib
                .and_then(|list| list.get(name))
                .and_then(Data::as_str)
                .map(str::to_string)
        };
        let flag = |name: &str| attrib.and_then(|list| list.get(name)).and_then(Data::as_u64);
        Self {
            user_name: request.key.name.clone().unwrap_or_default(),
            name_type: request.key.name_type.unwrap_or(name_type::USER_NAME),
            application_id: text(names::APPLICATION_ID),
            application_name: text(names::APPLICATION_NAME),
            position: text(names::POSITION),
            password: text(names::PASSWORD),
            single_open: flag(names::SINGLE_OPEN).unwrap_or(1) != 0,
            allow_suspect_data: flag(names::ALLOW_SUSPECT_DATA).unwrap_or(1) != 0,
            support_rtt: flag(names::ROUND_TRIP_LATENCY) == Some(RTT_SUPPORTED),
        }
    }
}

/// Capabilities a provider advertises in its login refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginSupport {
    pub batch_requests: bool,
    pub view_requests: bool,
    pub omm_post: bool,
    pub rtt: bool,
}

impl Default for LoginSupport {
    fn default() -> Self {
        Self {
            batch_requests: true,
            view_requests: true,
            omm_post: true,
            rtt: false,
        }
    }
}

impl LoginSupport {
    /// Attribute element list for a login refresh
    pub fn to_attrib(&self, application_id: Option<&str>) -> ValidationResult<ElementList> {
        let mut attrib = ElementList::new();
        if let Some(id) = application_id {
            attrib.add_ascii(names::APPLICATION_ID, id)?;
        }
        attrib
            .add_uint(names::SUPPORT_BATCH_REQUESTS, self.batch_requests as u64)?
            .add_uint(names::SUPPORT_VIEW_REQUESTS, self.view_requests as u64)?
            .add_uint(names::SUPPORT_OMM_POST, self.omm_post as u64)?;
        if self.rtt {
            attrib.add_uint(names::ROUND_TRIP_LATENCY, RTT_SUPPORTED)?;
        }
        attrib.complete()?;
        Ok(attrib)
    }

    /// Read capabilities from a login refresh; absent attributes mean unsupported
    pub fn from_refresh(refresh: &RefreshMsg) -> Self {
        let attrib = refresh.key.attrib.as_deref().and_then(Data::as_element_list);
        let flag = |name: &str| {
            attrib
                .and_then(|list| list.get(name))
                .and_then(Data::as_u64)
                .unwrap_or(0)
        };
        Self {
            batch_requests: flag(names::SUPPORT_BATCH_REQUESTS) != 0,
            view_requests: flag(names::SUPPORT_VIEW_REQUESTS) != 0,
            omm_post: flag(names::SUPPORT_OMM_POST) != 0,
            rtt: flag(names::ROUND_TRIP_LATENCY) == RTT_SUPPORTED,
        }
    }
}

/// Round-trip latency probe exchanged on the login stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginRtt {
    /// Provider clock ticks (microseconds) when the probe was sent
    pub ticks: u64,
    /// Latency measured for the previous probe, in microseconds
    pub latency: Option<u64>,
    pub tcp_retrans: Option<u64>,
}

impl LoginRtt {
    pub fn to_generic(&self, stream_id: i32) -> ValidationResult<GenericMsg> {
        let mut elements = ElementList::new();
        elements.add_uint(names::TICKS, self.ticks)?;
        if let Some(latency) = self.latency {
            elements.add_uint(names::ROUND_TRIP_LATENCY, latency)?;
        }
        if let Some(retrans) = self.tcp_retrans {
            elements.add_uint(names::TCP_RETRANS, retrans)?;
        }
        elements.complete()?;
        Ok(GenericMsg::new()
            .stream_id(stream_id)
            .domain(DomainType::LOGIN)
            .name(names::ROUND_TRIP_LATENCY)
            .payload(elements))
    }

    /// Parse a login generic message; `None` if it is not an RTT probe
    pub fn from_generic(generic: &GenericMsg) -> Option<Self> {
        if generic.domain != DomainType::LOGIN {
            return None;
        }
        let elements = generic.payload.as_element_list()?;
        let ticks = elements.get(names::TICKS).and_then(Data::as_u64)?;
        Some(Self {
            ticks,
            latency: elements.get(names::ROUND_TRIP_LATENCY).and_then(Data::as_u64),
            tcp_retrans: elements.get(names::TCP_RETRANS).and_then(Data::as_u64),
        })
    }
}
