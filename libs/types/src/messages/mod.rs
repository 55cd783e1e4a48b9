//! OMM message structures
//!
//! ## Purpose
//!
//! Every message carries a stream id, a [`DomainType`], usually a [`MsgKey`]
//! and a [`Data`] payload. The eight message classes differ in the flags and
//! header fields they add.
//!
//! ## Builders
//!
//! Messages are built by value: `ReqMsg::new().name("IBM.N").service_name("DIRECT_FEED")`.
//! Setters that can receive an out-of-range value return a [`ValidationResult`]
//! so the error surfaces at the call that introduced it:
//!
//! ```rust
//! use types::{ReqMsg, ValidationError};
//!
//! let err = ReqMsg::new().domain_type(300).unwrap_err();
//! assert_eq!(err, ValidationError::DomainTypeOutOfRange { value: 300 });
//! ```

mod key;

use crate::common::errors::ValidationResult;
use crate::data::{Data, Qos, State};
use crate::protocol::{DomainType, MsgClass, NackCode};
use bytes::Bytes;

pub use key::MsgKey;

/// Request priority: class then count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Priority {
    pub class: u8,
    pub count: u16,
}

impl Default for Priority {
    fn default() -> Self {
        Self { class: 1, count: 1 }
    }
}

/// Identity of the user who originated a post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PostUserInfo {
    pub address: u32,
    pub user_id: u32,
}

/// Setters shared by every keyed message type
macro_rules! keyed_builders {
    ($msg:ty) => {
        impl $msg {
            pub fn stream_id(mut self, stream_id: i32) -> Self {
                self.stream_id = stream_id;
                self
            }

            pub fn domain(mut self, domain: DomainType) -> Self {
                self.domain = domain;
                self
            }

            /// Raw domain type; values outside 1..=255 are rejected here
            pub fn domain_type(mut self, value: u16) -> ValidationResult<Self> {
                self.domain = DomainType::new(value)?;
                Ok(self)
            }

            pub fn name(mut self, name: impl Into<String>) -> Self {
                self.key.name = Some(name.into());
                self
            }

            pub fn name_type(mut self, name_type: u8) -> Self {
                self.key.name_type = Some(name_type);
                self
            }

            pub fn service_name(mut self, service: impl Into<String>) -> Self {
                self.key.service_name = Some(service.into());
                self
            }

            pub fn service_id(mut self, service_id: u16) -> Self {
                self.key.service_id = Some(service_id);
                self
            }

            pub fn filter(mut self, filter: u32) -> Self {
                self.key.filter = Some(filter);
                self
            }

            pub fn identifier(mut self, identifier: i32) -> Self {
                self.key.identifier = Some(identifier);
                self
            }

            pub fn attrib(mut self, attrib: impl Into<Data>) -> Self {
                self.key.attrib = Some(Box::new(attrib.into()));
                self
            }

            pub fn key(mut self, key: MsgKey) -> Self {
                self.key = key;
                self
            }

            pub fn payload(mut self, payload: impl Into<Data>) -> Self {
                self.payload = payload.into();
                self
            }

            pub fn extended_header(mut self, header: impl Into<Bytes>) -> Self {
                self.extended_header = Some(header.into());
                self
            }
        }
    };
}

/// Consumer request opening (or reissuing) a stream
#[derive(Debug, Clone, PartialEq)]
pub struct ReqMsg {
    pub stream_id: i32,
    pub domain: DomainType,
    pub key: MsgKey,
    /// Interest after refresh; false requests a snapshot
    pub streaming: bool,
    pub initial_image: bool,
    pub pause: bool,
    pub private_stream: bool,
    pub conf_info_in_updates: bool,
    pub has_view: bool,
    pub has_batch: bool,
    pub qualified_stream: bool,
    pub priority: Option<Priority>,
    pub qos: Option<Qos>,
    pub worst_qos: Option<Qos>,
    pub extended_header: Option<Bytes>,
    pub payload: Data,
}

impl Default for ReqMsg {
    fn default() -> Self {
        Self {
            stream_id: 0,
            domain: DomainType::MARKET_PRICE,
            key: MsgKey::default(),
            streaming: true,
            initial_image: true,
            pause: false,
            private_stream: false,
            conf_info_in_updates: false,
            has_view: false,
            has_batch: false,
            qualified_stream: false,
            priority: None,
            qos: None,
            worst_qos: None,
            extended_header: None,
            payload: Data::NoData,
        }
    }
}

impl ReqMsg {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn interest_after_refresh(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn initial_image(mut self, initial_image: bool) -> Self {
        self.initial_image = initial_image;
        self
    }

    pub fn pause(mut self, pause: bool) -> Self {
        self.pause = pause;
        self
    }

    pub fn private_stream(mut self, private_stream: bool) -> Self {
        self.private_stream = private_stream;
        self
    }

    pub fn conf_info_in_updates(mut self, enabled: bool) -> Self {
        self.conf_info_in_updates = enabled;
        self
    }

    pub fn qualified_stream(mut self, qualified: bool) -> Self {
        self.qualified_stream = qualified;
        self
    }

    pub fn priority(mut self, class: u8, count: u16) -> Self {
        self.priority = Some(Priority { class, count });
        self
    }

    pub fn qos(mut self, qos: Qos) -> Self {
        self.qos = Some(qos);
        self
    }

    pub fn worst_qos(mut self, qos: Qos) -> Self {
        self.worst_qos = Some(qos);
        self
    }

    /// Restrict the stream to the given field ids
    pub fn view_fields(mut self, fids: &[i16]) -> ValidationResult<Self> {
        let batch = crate::rdm::batch::item_names(&self.payload);
        self.payload = crate::rdm::view::request_payload(Some(fids), batch.as_deref())?;
        self.has_view = true;
        Ok(self)
    }

    /// Request several items with one message; the key must not carry a name
    pub fn batch_names<I, S>(mut self, names: I) -> ValidationResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let view = crate::rdm::view::field_ids(&self.payload);
        self.payload = crate::rdm::view::request_payload(view.as_deref(), Some(&names))?;
        self.has_batch = true;
        Ok(self)
    }
}

keyed_builders!(ReqMsg);

/// Full image of an item, solicited or unsolicited
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshMsg {
    pub stream_id: i32,
    pub domain: DomainType,
    pub key: MsgKey,
    pub state: State,
    pub solicited: bool,
    /// Final part of a (possibly multi-part) refresh
    pub complete: bool,
    pub clear_cache: bool,
    pub do_not_cache: bool,
    pub private_stream: bool,
    pub qualified_stream: bool,
    pub qos: Option<Qos>,
    pub seq_num: Option<u32>,
    pub part_num: Option<u16>,
    pub group_id: Bytes,
    pub perm_data: Option<Bytes>,
    pub post_user_info: Option<PostUserInfo>,
    pub extended_header: Option<Bytes>,
    pub payload: Data,
}

impl Default for RefreshMsg {
    fn default() -> Self {
        Self {
            stream_id: 0,
            domain: DomainType::MARKET_PRICE,
            key: MsgKey::default(),
            state: State::open_ok(""),
            solicited: true,
            complete: true,
            clear_cache: true,
            do_not_cache: false,
            private_stream: false,
            qualified_stream: false,
            qos: None,
            seq_num: None,
            part_num: None,
            group_id: Bytes::new(),
            perm_data: None,
            post_user_info: None,
            extended_header: None,
            payload: Data::NoData,
        }
    }
}

impl RefreshMsg {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(mut self, state: State) -> Self {
        self.state = state;
        self
    }

    pub fn solicited(mut self, solicited: bool) -> Self {
        self.solicited = solicited;
        self
    }

    pub fn complete(mut self, complete: bool) -> Self {
        self.complete = complete;
        self
    }

    pub fn clear_cache(mut self, clear_cache: bool) -> Self {
        self.clear_cache = clear_cache;
        self
    }

    pub fn do_not_cache(mut self, do_not_cache: bool) -> Self {
        self.do_not_cache = do_not_cache;
        self
    }

    pub fn private_stream(mut self, private_stream: bool) -> Self {
        self.private_stream = private_stream;
        self
    }

    pub fn qos(mut self, qos: Qos) -> Self {
        self.qos = Some(qos);
        self
    }

    pub fn seq_num(mut self, seq_num: u32) -> Self {
        self.seq_num = Some(seq_num);
        self
    }

    pub fn part_num(mut self, part_num: u16) -> Self {
        self.part_num = Some(part_num);
        self
    }

    pub fn group_id(mut self, group_id: impl Into<Bytes>) -> Self {
        self.group_id = group_id.into();
        self
    }

    pub fn perm_data(mut self, perm_data: impl Into<Bytes>) -> Self {
        self.perm_data = Some(perm_data.into());
        self
    }
}

keyed_builders!(RefreshMsg);

/// Incremental change to an open item
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateMsg {
    pub stream_id: i32,
    pub domain: DomainType,
    pub key: MsgKey,
    pub update_type: u8,
    pub seq_num: Option<u32>,
    /// Conflation count and time
    pub conflation: Option<(u16, u16)>,
    pub do_not_cache: bool,
    pub do_not_conflate: bool,
    pub do_not_ripple: bool,
    pub perm_data: Option<Bytes>,
    pub post_user_info: Option<PostUserInfo>,
    pub extended_header: Option<Bytes>,
    pub payload: Data,
}

impl Default for UpdateMsg {
    fn default() -> Self {
        Self {
            stream_id: 0,
            domain: DomainType::MARKET_PRICE,
            key: MsgKey::default(),
            update_type: 0,
            seq_num: None,
            conflation: None,
            do_not_cache: false,
            do_not_conflate: false,
            do_not_ripple: false,
            perm_data: None,
            post_user_info: None,
            extended_header: None,
            payload: Data::NoData,
        }
    }
}

impl UpdateMsg {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update_type(mut self, update_type: u8) -> Self {
        self.update_type = update_type;
        self
    }

    pub fn seq_num(mut self, seq_num: u32) -> Self {
        self.seq_num = Some(seq_num);
        self
    }

    pub fn conflation(mut self, count: u16, time: u16) -> Self {
        self.conflation = Some((count, time));
        self
    }

    pub fn do_not_cache(mut self, value: bool) -> Self {
        self.do_not_cache = value;
        self
    }

    pub fn do_not_conflate(mut self, value: bool) -> Self {
        self.do_not_conflate = value;
        self
    }

    pub fn do_not_ripple(mut self, value: bool) -> Self {
        self.do_not_ripple = value;
        self
    }

    pub fn perm_data(mut self, perm_data: impl Into<Bytes>) -> Self {
        self.perm_data = Some(perm_data.into());
        self
    }
}

keyed_builders!(UpdateMsg);

/// Stream or data state change without a full image
#[derive(Debug, Clone, PartialEq)]
pub struct StatusMsg {
    pub stream_id: i32,
    pub domain: DomainType,
    pub key: MsgKey,
    pub state: Option<State>,
    pub group_id: Option<Bytes>,
    pub clear_cache: bool,
    pub private_stream: bool,
    pub perm_data: Option<Bytes>,
    pub post_user_info: Option<PostUserInfo>,
    pub extended_header: Option<Bytes>,
    pub payload: Data,
}

impl Default for StatusMsg {
    fn default() -> Self {
        Self {
            stream_id: 0,
            domain: DomainType::MARKET_PRICE,
            key: MsgKey::default(),
            state: None,
            group_id: None,
            clear_cache: false,
            private_stream: false,
            perm_data: None,
            post_user_info: None,
            extended_header: None,
            payload: Data::NoData,
        }
    }
}

impl StatusMsg {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(mut self, state: State) -> Self {
        self.state = Some(state);
        self
    }

    pub fn group_id(mut self, group_id: impl Into<Bytes>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    pub fn clear_cache(mut self, clear_cache: bool) -> Self {
        self.clear_cache = clear_cache;
        self
    }

    pub fn private_stream(mut self, private_stream: bool) -> Self {
        self.private_stream = private_stream;
        self
    }
}

keyed_builders!(StatusMsg);

/// Bidirectional side-channel message on an open stream
#[derive(Debug, Clone, PartialEq)]
pub struct GenericMsg {
    pub stream_id: i32,
    pub domain: DomainType,
    pub key: MsgKey,
    pub seq_num: Option<u32>,
    pub secondary_seq_num: Option<u32>,
    pub part_num: Option<u16>,
    pub complete: bool,
    pub perm_data: Option<Bytes>,
    pub extended_header: Option<Bytes>,
    pub payload: Data,
}

impl Default for GenericMsg {
    fn default() -> Self {
        Self {
            stream_id: 0,
            domain: DomainType::MARKET_PRICE,
            key: MsgKey::default(),
            seq_num: None,
            secondary_seq_num: None,
            part_num: None,
            complete: true,
            perm_data: None,
            extended_header: None,
            payload: Data::NoData,
        }
    }
}

impl GenericMsg {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seq_num(mut self, seq_num: u32) -> Self {
        self.seq_num = Some(seq_num);
        self
    }

    pub fn secondary_seq_num(mut self, seq_num: u32) -> Self {
        self.secondary_seq_num = Some(seq_num);
        self
    }

    pub fn part_num(mut self, part_num: u16) -> Self {
        self.part_num = Some(part_num);
        self
    }

    pub fn complete(mut self, complete: bool) -> Self {
        self.complete = complete;
        self
    }
}

keyed_builders!(GenericMsg);

/// Positive or negative acknowledgement of a post
#[derive(Debug, Clone, PartialEq)]
pub struct AckMsg {
    pub stream_id: i32,
    pub domain: DomainType,
    pub key: MsgKey,
    pub ack_id: u32,
    pub nack_code: Option<NackCode>,
    pub text: Option<String>,
    pub seq_num: Option<u32>,
    pub private_stream: bool,
    pub extended_header: Option<Bytes>,
    pub payload: Data,
}

impl Default for AckMsg {
    fn default() -> Self {
        Self {
            stream_id: 0,
            domain: DomainType::MARKET_PRICE,
            key: MsgKey::default(),
            ack_id: 0,
            nack_code: None,
            text: None,
            seq_num: None,
            private_stream: false,
            extended_header: None,
            payload: Data::NoData,
        }
    }
}

impl AckMsg {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ack_id(mut self, ack_id: u32) -> Self {
        self.ack_id = ack_id;
        self
    }

    pub fn nack_code(mut self, code: NackCode) -> Self {
        self.nack_code = Some(code);
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn seq_num(mut self, seq_num: u32) -> Self {
        self.seq_num = Some(seq_num);
        self
    }

    pub fn is_nack(&self) -> bool {
        self.nack_code.is_some_and(|code| code != NackCode::None)
    }
}

keyed_builders!(AckMsg);

/// Consumer contribution towards a provider
#[derive(Debug, Clone, PartialEq)]
pub struct PostMsg {
    pub stream_id: i32,
    pub domain: DomainType,
    pub key: MsgKey,
    pub post_id: Option<u32>,
    pub seq_num: Option<u32>,
    pub post_user_info: PostUserInfo,
    pub post_user_rights: Option<u16>,
    pub ack_requested: bool,
    pub complete: bool,
    pub part_num: Option<u16>,
    pub perm_data: Option<Bytes>,
    pub extended_header: Option<Bytes>,
    pub payload: Data,
}

impl Default for PostMsg {
    fn default() -> Self {
        Self {
            stream_id: 0,
            domain: DomainType::MARKET_PRICE,
            key: MsgKey::default(),
            post_id: None,
            seq_num: None,
            post_user_info: PostUserInfo::default(),
            post_user_rights: None,
            ack_requested: false,
            complete: true,
            part_num: None,
            perm_data: None,
            extended_header: None,
            payload: Data::NoData,
        }
    }
}

impl PostMsg {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn post_id(mut self, post_id: u32) -> Self {
        self.post_id = Some(post_id);
        self
    }

    pub fn seq_num(mut self, seq_num: u32) -> Self {
        self.seq_num = Some(seq_num);
        self
    }

    pub fn post_user_info(mut self, address: u32, user_id: u32) -> Self {
        self.post_user_info = PostUserInfo { address, user_id };
        self
    }

    pub fn post_user_rights(mut self, rights: u16) -> Self {
        self.post_user_rights = Some(rights);
        self
    }

    pub fn solicit_ack(mut self, ack: bool) -> Self {
        self.ack_requested = ack;
        self
    }

    pub fn complete(mut self, complete: bool) -> Self {
        self.complete = complete;
        self
    }
}

keyed_builders!(PostMsg);

/// Consumer close of a stream
#[derive(Debug, Clone, PartialEq)]
pub struct CloseMsg {
    pub stream_id: i32,
    pub domain: DomainType,
    pub ack_requested: bool,
    pub extended_header: Option<Bytes>,
}

impl CloseMsg {
    pub fn new(stream_id: i32, domain: DomainType) -> Self {
        Self {
            stream_id,
            domain,
            ack_requested: false,
            extended_header: None,
        }
    }
}

/// Any OMM message
#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    Request(ReqMsg),
    Refresh(RefreshMsg),
    Update(UpdateMsg),
    Status(StatusMsg),
    Generic(GenericMsg),
    Ack(AckMsg),
    Post(PostMsg),
    Close(CloseMsg),
}

static NO_DATA: Data = Data::NoData;

macro_rules! each_keyed {
    ($self:expr, $msg:ident => $body:expr, $close:ident => $close_body:expr) => {
        match $self {
            Msg::Request($msg) => $body,
            Msg::Refresh($msg) => $body,
            Msg::Update($msg) => $body,
            Msg::Status($msg) => $body,
            Msg::Generic($msg) => $body,
            Msg::Ack($msg) => $body,
            Msg::Post($msg) => $body,
            Msg::Close($close) => $close_body,
        }
    };
}

impl Msg {
    pub fn class(&self) -> MsgClass {
        match self {
            Msg::Request(_) => MsgClass::Request,
            Msg::Refresh(_) => MsgClass::Refresh,
            Msg::Update(_) => MsgClass::Update,
            Msg::Status(_) => MsgClass::Status,
            Msg::Generic(_) => MsgClass::Generic,
            Msg::Ack(_) => MsgClass::Ack,
            Msg::Post(_) => MsgClass::Post,
            Msg::Close(_) => MsgClass::Close,
        }
    }

    pub fn stream_id(&self) -> i32 {
        each_keyed!(self, msg => msg.stream_id, close => close.stream_id)
    }

    pub fn set_stream_id(&mut self, stream_id: i32) {
        each_keyed!(self, msg => msg.stream_id = stream_id, close => close.stream_id = stream_id)
    }

    pub fn domain(&self) -> DomainType {
        each_keyed!(self, msg => msg.domain, close => close.domain)
    }

    pub fn key(&self) -> Option<&MsgKey> {
        each_keyed!(self, msg => Some(&msg.key), _close => None)
    }

    pub fn key_mut(&mut self) -> Option<&mut MsgKey> {
        each_keyed!(self, msg => Some(&mut msg.key), _close => None)
    }

    pub fn payload(&self) -> &Data {
        each_keyed!(self, msg => &msg.payload, _close => &NO_DATA)
    }

    pub fn name(&self) -> Option<&str> {
        self.key().and_then(|key| key.name.as_deref())
    }

    /// State for refresh and status messages
    pub fn state(&self) -> Option<&State> {
        match self {
            Msg::Refresh(refresh) => Some(&refresh.state),
            Msg::Status(status) => status.state.as_ref(),
            _ => None,
        }
    }

    /// Reject payloads containing containers that were never completed
    pub fn validate_complete(&self) -> ValidationResult<()> {
        self.payload().validate_complete()?;
        match self.key().and_then(|key| key.attrib.as_deref()) {
            Some(attrib) => attrib.validate_complete(),
            None => Ok(()),
        }
    }
}

macro_rules! impl_msg_from {
    ($($source:ident => $variant:ident),* $(,)?) => {
        $(
            impl From<$source> for Msg {
                fn from(value: $source) -> Self {
                    Msg::$variant(value)
                }
            }
        )*
    };
}

impl_msg_from! {
    ReqMsg => Request,
    RefreshMsg => Refresh,
    UpdateMsg => Update,
    StatusMsg => Status,
    GenericMsg => Generic,
    AckMsg => Ack,
    PostMsg => Post,
    CloseMsg => Close,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::errors::ValidationError;
    use crate::data::FieldList;
    use crate::protocol::StreamState;

    #[test]
    fn request_defaults_to_streaming_market_price() {
        let request = ReqMsg::new().name("IBM.N").service_name("DIRECT_FEED");
        assert!(request.streaming);
        assert!(request.initial_image);
        assert_eq!(request.domain, DomainType::MARKET_PRICE);
        assert_eq!(request.key.service_name.as_deref(), Some("DIRECT_FEED"));
    }

    #[test]
    fn domain_type_above_255_is_rejected_by_every_builder() {
        assert_eq!(
            ReqMsg::new().domain_type(256).unwrap_err(),
            ValidationError::DomainTypeOutOfRange { value: 256 }
        );
        assert!(RefreshMsg::new().domain_type(1000).is_err());
        assert!(UpdateMsg::new().domain_type(300).is_err());
        assert!(GenericMsg::new().domain_type(200).is_ok());
    }

    #[test]
    fn uncompleted_payload_fails_validation() {
        let mut fields = FieldList::new();
        fields.add_uint(22, 1).unwrap();
        let msg = Msg::from(UpdateMsg::new().payload(fields));
        assert!(matches!(
            msg.validate_complete(),
            Err(ValidationError::NotCompleted { .. })
        ));
    }

    #[test]
    fn accessors_cover_close() {
        let mut msg = Msg::from(CloseMsg::new(5, DomainType::MARKET_BY_ORDER));
        assert_eq!(msg.class(), MsgClass::Close);
        assert!(msg.key().is_none());
        msg.set_stream_id(9);
        assert_eq!(msg.stream_id(), 9);
        assert_eq!(msg.payload(), &Data::NoData);

        let refresh = Msg::from(RefreshMsg::new().state(State::closed(
            crate::protocol::StatusCode::NOT_FOUND,
            "no such item",
        )));
        assert_eq!(refresh.state().map(|s| s.stream_state), Some(StreamState::Closed));
    }
}
