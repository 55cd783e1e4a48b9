//! Message and container decoding
//!
//! ## Container Layouts
//!
//! ```text
//! FieldList   := flags:u8 [dict_id:u16 list_num:i16] count:u16 { fid:i16 type:u8 len content }
//! ElementList := flags:u8 [list_num:i16] count:u16 { len name type:u8 len content }
//! Map         := flags:u8 key_type:u8 container_type:u8 [key_fid:i16] [len summary]
//!                [count_hint:u32] count:u16 { action:u8 [len perm] len key [len payload] }
//! FilterList  := flags:u8 [count_hint:u8] count:u16 { id:u8 action:u8 type:u8 [len perm] len payload }
//! Series      := flags:u8 container_type:u8 [len summary] [count_hint:u32] count:u16 { len entry }
//! Array       := item_type:u8 width:u8 count:u16 { width bytes | len content }
//! ```
//!
//! ## Safety Against Hostile Input
//!
//! Every read is bounds-checked by [`WireReader`]. Nesting is bounded by
//! `max_depth` (default 32) so a crafted buffer cannot drive unbounded
//! recursion, and entry vectors are preallocated no larger than the bytes that
//! remain.

use crate::constants::{
    container_flags, key_flags, msg_flags, DEFAULT_MAX_DEPTH, ENTRY_ACTION_MASK,
    ENTRY_HAS_PERMISSION,
};
use crate::error::{CodecError, CodecResult};
use crate::primitives::{decode_primitive, read_state};
use crate::reader::WireReader;
use bytes::Bytes;
use types::{
    AckMsg, CloseMsg, Data, DataType, DomainType, ElementEntry, ElementList, FieldEntry,
    FieldList, FieldListInfo, FilterAction, FilterEntry, FilterList, GenericMsg, Map, MapAction,
    MapEntry, Msg, MsgClass, MsgKey, NackCode, OmmArray, PostMsg, PostUserInfo, Priority, Qos,
    RefreshMsg, ReqMsg, Series, State, StatusMsg, UpdateMsg,
};

/// Stateless decoder with a nesting limit
#[derive(Debug, Clone, Copy)]
pub struct Decoder {
    max_depth: usize,
}

impl Default for Decoder {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

fn data_type(tag: u8, offset: usize) -> CodecResult<DataType> {
    DataType::try_from(tag).map_err(|_| CodecError::UnknownDataType { tag, offset })
}

fn text(reader: &mut WireReader<'_>, context: &'static str) -> CodecResult<String> {
    let offset = reader.offset();
    let bytes = reader.length_prefixed(context)?;
    String::from_utf8(bytes.to_vec())
        .map_err(|_| CodecError::invalid_content(DataType::AsciiString, offset, format!("{context} is not UTF-8")))
}

fn state_field(reader: &mut WireReader<'_>) -> CodecResult<State> {
    let mut sub = reader.sub_reader("state")?;
    let state = read_state(&mut sub)?;
    sub.expect_end("state")?;
    Ok(state)
}

fn qos_field(reader: &mut WireReader<'_>) -> CodecResult<Qos> {
    let offset = reader.offset();
    let mut sub = reader.sub_reader("qos")?;
    match decode_primitive(DataType::Qos, &mut sub)? {
        Data::Qos(qos) => Ok(qos),
        _ => Err(CodecError::invalid_content(DataType::Qos, offset, "blank qos")),
    }
}

fn post_user_info(reader: &mut WireReader<'_>) -> CodecResult<PostUserInfo> {
    Ok(PostUserInfo {
        address: reader.u32("post user address")?,
        user_id: reader.u32("post user id")?,
    })
}

fn optional<T>(
    flags: u32,
    bit: u32,
    read: impl FnOnce() -> CodecResult<T>,
) -> CodecResult<Option<T>> {
    if flags & bit != 0 {
        read().map(Some)
    } else {
        Ok(None)
    }
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_depth(max_depth: usize) -> Self {
        Self { max_depth }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Decode exactly one message from `bytes`
    pub fn decode_msg(&self, bytes: &[u8]) -> CodecResult<Msg> {
        let mut reader = WireReader::new(bytes);
        let msg = self.msg(&mut reader, 0)?;
        reader.expect_end("message")?;
        Ok(msg)
    }

    /// Decode the content of a value of `data_type`
    pub fn decode_data(&self, data_type: DataType, content: &[u8]) -> CodecResult<Data> {
        self.content(data_type, &mut WireReader::new(content), 0)
    }

    fn check_depth(&self, depth: usize) -> CodecResult<()> {
        if depth > self.max_depth {
            Err(CodecError::DepthExceeded {
                max_depth: self.max_depth,
            })
        } else {
            Ok(())
        }
    }

    /// Decode `reader`, which spans exactly the content of one value
    fn content(&self, data_type: DataType, reader: &mut WireReader<'_>, depth: usize) -> CodecResult<Data> {
        self.check_depth(depth)?;
        if reader.is_empty() {
            return Ok(match data_type {
                DataType::Opaque => Data::Opaque(Bytes::new()),
                DataType::Xml => Data::Xml(String::new()),
                t if t.is_primitive() => Data::Blank(t),
                _ => Data::NoData,
            });
        }
        let data = match data_type {
            DataType::NoData => {
                return Err(CodecError::TrailingBytes {
                    remaining: reader.remaining(),
                    context: "NoData",
                })
            }
            DataType::Array => Data::Array(self.array(reader)?),
            DataType::FieldList => Data::FieldList(self.field_list(reader, depth)?),
            DataType::ElementList => Data::ElementList(self.element_list(reader, depth)?),
            DataType::Map => Data::Map(self.map(reader, depth)?),
            DataType::FilterList => Data::FilterList(self.filter_list(reader, depth)?),
            DataType::Series => Data::Series(self.series(reader, depth)?),
            DataType::Opaque => Data::Opaque(Bytes::copy_from_slice(reader.rest_bytes())),
            DataType::Xml => {
                let offset = reader.offset();
                let bytes = reader.rest_bytes();
                Data::Xml(
                    String::from_utf8(bytes.to_vec())
                        .map_err(|_| CodecError::invalid_content(DataType::Xml, offset, "invalid UTF-8"))?,
                )
            }
            DataType::Msg => Data::Msg(Box::new(self.msg(reader, depth + 1)?)),
            primitive => return decode_primitive(primitive, reader),
        };
        reader.expect_end("container")?;
        Ok(data)
    }

    fn nested(&self, data_type: DataType, reader: &mut WireReader<'_>, depth: usize) -> CodecResult<Data> {
        let mut sub = reader.sub_reader("entry content")?;
        self.content(data_type, &mut sub, depth)
    }

    fn array(&self, reader: &mut WireReader<'_>) -> CodecResult<OmmArray> {
        let offset = reader.offset();
        let item_type = data_type(reader.u8("array item type")?, offset)?;
        if !item_type.is_primitive() || item_type == DataType::Array {
            return Err(CodecError::invalid_content(
                DataType::Array,
                offset,
                format!("item type {item_type:?} is not a primitive"),
            ));
        }
        let width = reader.u8("array width")? as usize;
        let count = reader.u16("array count")? as usize;
        let mut items = Vec::with_capacity(count.min(reader.remaining()));
        for _ in 0..count {
            let item = if width == 0 {
                let mut sub = reader.sub_reader("array item")?;
                decode_primitive(item_type, &mut sub)?
            } else {
                let bytes = reader.bytes(width, "array item")?;
                decode_primitive(item_type, &mut WireReader::new(bytes))?
            };
            items.push(item);
        }
        Ok(OmmArray::from_parts(item_type, width as u8, items))
    }

    fn field_list(&self, reader: &mut WireReader<'_>, depth: usize) -> CodecResult<FieldList> {
        let flags = reader.u8("field list flags")?;
        let info = if flags & container_flags::FIELD_LIST_HAS_INFO != 0 {
            Some(FieldListInfo {
                dictionary_id: reader.u16("field list info")?,
                field_list_num: reader.i16("field list info")?,
            })
        } else {
            None
        };
        let count = reader.u16("field list count")? as usize;
        let mut entries = Vec::with_capacity(count.min(reader.remaining()));
        for _ in 0..count {
            let fid = reader.i16("field id")?;
            let offset = reader.offset();
            let entry_type = data_type(reader.u8("field type")?, offset)?;
            let data = self.nested(entry_type, reader, depth + 1)?;
            entries.push(FieldEntry { fid, data });
        }
        Ok(FieldList::from_parts(info, entries))
    }

    fn element_list(&self, reader: &mut WireReader<'_>, depth: usize) -> CodecResult<ElementList> {
        let flags = reader.u8("element list flags")?;
        let list_num = if flags & container_flags::ELEMENT_LIST_HAS_NUM != 0 {
            Some(reader.i16("element list number")?)
        } else {
            None
        };
        let count = reader.u16("element list count")? as usize;
        let mut entries = Vec::with_capacity(count.min(reader.remaining()));
        for _ in 0..count {
            let name = text(reader, "element name")?;
            let offset = reader.offset();
            let entry_type = data_type(reader.u8("element type")?, offset)?;
            let data = self.nested(entry_type, reader, depth + 1)?;
            entries.push(ElementEntry { name, data });
        }
        Ok(ElementList::from_parts(list_num, entries))
    }

    fn map(&self, reader: &mut WireReader<'_>, depth: usize) -> CodecResult<Map> {
        let flags = reader.u8("map flags")?;
        let offset = reader.offset();
        let key_type = data_type(reader.u8("map key type")?, offset)?;
        if !key_type.is_valid_map_key() {
            return Err(CodecError::invalid_content(
                DataType::Map,
                offset,
                format!("{key_type:?} cannot be a map key"),
            ));
        }
        let offset = reader.offset();
        let container_type = data_type(reader.u8("map container type")?, offset)?;
        let key_fid = if flags & container_flags::MAP_HAS_KEY_FID != 0 {
            Some(reader.i16("map key fid")?)
        } else {
            None
        };
        let summary = if flags & container_flags::MAP_HAS_SUMMARY != 0 {
            Some(self.nested(container_type, reader, depth + 1)?)
        } else {
            None
        };
        let count_hint = if flags & container_flags::MAP_HAS_COUNT_HINT != 0 {
            Some(reader.u32("map count hint")?)
        } else {
            None
        };
        let count = reader.u16("map count")? as usize;
        let mut entries = Vec::with_capacity(count.min(reader.remaining()));
        for _ in 0..count {
            let offset = reader.offset();
            let raw = reader.u8("map entry action")?;
            let action = MapAction::try_from(raw & ENTRY_ACTION_MASK).map_err(|_| {
                CodecError::invalid_content(DataType::Map, offset, format!("entry action {raw}"))
            })?;
            let permission = if raw & ENTRY_HAS_PERMISSION != 0 {
                Some(Bytes::copy_from_slice(reader.length_prefixed("map entry permission")?))
            } else {
                None
            };
            let key_offset = reader.offset();
            let mut key_reader = reader.sub_reader("map entry key")?;
            let key = decode_primitive(key_type, &mut key_reader)?;
            if key.is_blank() {
                return Err(CodecError::invalid_content(DataType::Map, key_offset, "blank key"));
            }
            let payload = if action == MapAction::Delete {
                Data::NoData
            } else {
                self.nested(container_type, reader, depth + 1)?
            };
            entries.push(MapEntry {
                action,
                key,
                permission,
                payload,
            });
        }
        Ok(Map::from_parts(key_type, container_type, key_fid, count_hint, summary, entries))
    }

    fn filter_list(&self, reader: &mut WireReader<'_>, depth: usize) -> CodecResult<FilterList> {
        let flags = reader.u8("filter list flags")?;
        let count_hint = if flags & container_flags::FILTER_HAS_COUNT_HINT != 0 {
            Some(reader.u8("filter count hint")?)
        } else {
            None
        };
        let count = reader.u16("filter list count")? as usize;
        let mut entries = Vec::with_capacity(count.min(reader.remaining()));
        for _ in 0..count {
            let id = reader.u8("filter id")?;
            let offset = reader.offset();
            let raw = reader.u8("filter action")?;
            let action = FilterAction::try_from(raw & ENTRY_ACTION_MASK).map_err(|_| {
                CodecError::invalid_content(DataType::FilterList, offset, format!("entry action {raw}"))
            })?;
            let offset = reader.offset();
            let entry_type = data_type(reader.u8("filter entry type")?, offset)?;
            let permission = if raw & ENTRY_HAS_PERMISSION != 0 {
                Some(Bytes::copy_from_slice(reader.length_prefixed("filter permission")?))
            } else {
                None
            };
            let payload = self.nested(entry_type, reader, depth + 1)?;
            entries.push(FilterEntry {
                id,
                action,
                permission,
                payload,
            });
        }
        Ok(FilterList::from_parts(count_hint, entries))
    }

    fn series(&self, reader: &mut WireReader<'_>, depth: usize) -> CodecResult<Series> {
        let flags = reader.u8("series flags")?;
        let offset = reader.offset();
        let container_type = data_type(reader.u8("series container type")?, offset)?;
        let summary = if flags & container_flags::SERIES_HAS_SUMMARY != 0 {
            Some(self.nested(container_type, reader, depth + 1)?)
        } else {
            None
        };
        let count_hint = if flags & container_flags::SERIES_HAS_COUNT_HINT != 0 {
            Some(reader.u32("series count hint")?)
        } else {
            None
        };
        let count = reader.u16("series count")? as usize;
        let mut entries = Vec::with_capacity(count.min(reader.remaining()));
        for _ in 0..count {
            entries.push(self.nested(container_type, reader, depth + 1)?);
        }
        Ok(Series::from_parts(container_type, count_hint, summary, entries))
    }

    fn key(&self, reader: &mut WireReader<'_>, depth: usize) -> CodecResult<MsgKey> {
        let flags = reader.u8("key flags")?;
        let mut key = MsgKey::default();
        if flags & key_flags::NAME != 0 {
            key.name = Some(text(reader, "key name")?);
        }
        if flags & key_flags::NAME_TYPE != 0 {
            key.name_type = Some(reader.u8("key name type")?);
        }
        if flags & key_flags::SERVICE_ID != 0 {
            key.service_id = Some(reader.u16("key service id")?);
        }
        if flags & key_flags::SERVICE_NAME != 0 {
            key.service_name = Some(text(reader, "key service name")?);
        }
        if flags & key_flags::FILTER != 0 {
            key.filter = Some(reader.u32("key filter")?);
        }
        if flags & key_flags::IDENTIFIER != 0 {
            key.identifier = Some(reader.i32("key identifier")?);
        }
        if flags & key_flags::ATTRIB != 0 {
            let offset = reader.offset();
            let attrib_type = data_type(reader.u8("key attrib type")?, offset)?;
            key.attrib = Some(Box::new(self.nested(attrib_type, reader, depth + 1)?));
        }
        Ok(key)
    }

    fn msg(&self, reader: &mut WireReader<'_>, depth: usize) -> CodecResult<Msg> {
        self.check_depth(depth)?;
        let offset = reader.offset();
        let class_byte = reader.u8("message class")?;
        let class = MsgClass::try_from(class_byte).map_err(|_| CodecError::UnknownMsgClass {
            class: class_byte,
            offset,
        })?;
        let offset = reader.offset();
        let domain_byte = reader.u8("domain type")?;
        let domain = DomainType::from_wire(domain_byte).map_err(|err| {
            CodecError::invalid_content(DataType::Msg, offset, err.to_string())
        })?;
        let stream_id = reader.i32("stream id")?;
        let flags = reader.u32("message flags")?;
        let has = |bit: u32| flags & bit != 0;

        let mut msg = match class {
            MsgClass::Request => {
                let priority = optional(flags, msg_flags::HAS_PRIORITY, || {
                    Ok(Priority {
                        class: reader.u8("priority class")?,
                        count: reader.u16("priority count")?,
                    })
                })?;
                let qos = optional(flags, msg_flags::HAS_QOS, || qos_field(reader))?;
                let worst_qos = optional(flags, msg_flags::HAS_WORST_QOS, || qos_field(reader))?;
                Msg::Request(ReqMsg {
                    stream_id,
                    domain,
                    streaming: has(msg_flags::STREAMING),
                    initial_image: !has(msg_flags::NO_REFRESH),
                    pause: has(msg_flags::PAUSE),
                    private_stream: has(msg_flags::PRIVATE_STREAM),
                    qualified_stream: has(msg_flags::QUALIFIED_STREAM),
                    conf_info_in_updates: has(msg_flags::CONF_INFO_IN_UPDATES),
                    has_view: has(msg_flags::HAS_VIEW),
                    has_batch: has(msg_flags::HAS_BATCH),
                    priority,
                    qos,
                    worst_qos,
                    ..ReqMsg::default()
                })
            }
            MsgClass::Refresh => {
                let state = state_field(reader)?;
                let group_id = optional(flags, msg_flags::HAS_GROUP_ID, || {
                    Ok(Bytes::copy_from_slice(reader.length_prefixed("group id")?))
                })?;
                let seq_num = optional(flags, msg_flags::HAS_SEQ_NUM, || reader.u32("seq num"))?;
                let part_num = optional(flags, msg_flags::HAS_PART_NUM, || reader.u16("part num"))?;
                let qos = optional(flags, msg_flags::HAS_QOS, || qos_field(reader))?;
                let post_user_info =
                    optional(flags, msg_flags::HAS_POST_USER_INFO, || post_user_info(reader))?;
                let perm_data = optional(flags, msg_flags::HAS_PERM_DATA, || {
                    Ok(Bytes::copy_from_slice(reader.length_prefixed("perm data")?))
                })?;
                Msg::Refresh(RefreshMsg {
                    stream_id,
                    domain,
                    state,
                    solicited: has(msg_flags::SOLICITED),
                    complete: has(msg_flags::COMPLETE),
                    clear_cache: has(msg_flags::CLEAR_CACHE),
                    do_not_cache: has(msg_flags::DO_NOT_CACHE),
                    private_stream: has(msg_flags::PRIVATE_STREAM),
                    qualified_stream: has(msg_flags::QUALIFIED_STREAM),
                    qos,
                    seq_num,
                    part_num,
                    group_id: group_id.unwrap_or_default(),
                    perm_data,
                    post_user_info,
                    ..RefreshMsg::default()
                })
            }
            MsgClass::Update => {
                let update_type = reader.u8("update type")?;
                let seq_num = optional(flags, msg_flags::HAS_SEQ_NUM, || reader.u32("seq num"))?;
                let conflation = optional(flags, msg_flags::HAS_CONFLATION, || {
                    Ok((reader.u16("conflation count")?, reader.u16("conflation time")?))
                })?;
                let post_user_info =
                    optional(flags, msg_flags::HAS_POST_USER_INFO, || post_user_info(reader))?;
                let perm_data = optional(flags, msg_flags::HAS_PERM_DATA, || {
                    Ok(Bytes::copy_from_slice(reader.length_prefixed("perm data")?))
                })?;
                Msg::Update(UpdateMsg {
                    stream_id,
                    domain,
                    update_type,
                    seq_num,
                    conflation,
                    do_not_cache: has(msg_flags::DO_NOT_CACHE),
                    do_not_conflate: has(msg_flags::DO_NOT_CONFLATE),
                    do_not_ripple: has(msg_flags::DO_NOT_RIPPLE),
                    perm_data,
                    post_user_info,
                    ..UpdateMsg::default()
                })
            }
            MsgClass::Status => {
                let state = optional(flags, msg_flags::HAS_STATE, || state_field(reader))?;
                let group_id = optional(flags, msg_flags::HAS_GROUP_ID, || {
                    Ok(Bytes::copy_from_slice(reader.length_prefixed("group id")?))
                })?;
                let post_user_info =
                    optional(flags, msg_flags::HAS_POST_USER_INFO, || post_user_info(reader))?;
                let perm_data = optional(flags, msg_flags::HAS_PERM_DATA, || {
                    Ok(Bytes::copy_from_slice(reader.length_prefixed("perm data")?))
                })?;
                Msg::Status(StatusMsg {
                    stream_id,
                    domain,
                    state,
                    group_id,
                    clear_cache: has(msg_flags::CLEAR_CACHE),
                    private_stream: has(msg_flags::PRIVATE_STREAM),
                    perm_data,
                    post_user_info,
                    ..StatusMsg::default()
                })
            }
            MsgClass::Generic => {
                let seq_num = optional(flags, msg_flags::HAS_SEQ_NUM, || reader.u32("seq num"))?;
                let secondary_seq_num = optional(flags, msg_flags::HAS_SECONDARY_SEQ_NUM, || {
                    reader.u32("secondary seq num")
                })?;
                let part_num = optional(flags, msg_flags::HAS_PART_NUM, || reader.u16("part num"))?;
                let perm_data = optional(flags, msg_flags::HAS_PERM_DATA, || {
                    Ok(Bytes::copy_from_slice(reader.length_prefixed("perm data")?))
                })?;
                Msg::Generic(GenericMsg {
                    stream_id,
                    domain,
                    seq_num,
                    secondary_seq_num,
                    part_num,
                    complete: has(msg_flags::COMPLETE),
                    perm_data,
                    ..GenericMsg::default()
                })
            }
            MsgClass::Ack => {
                let ack_id = reader.u32("ack id")?;
                let nack_code = optional(flags, msg_flags::HAS_NACK_CODE, || {
                    let offset = reader.offset();
                    let raw = reader.u8("nack code")?;
                    NackCode::try_from(raw).map_err(|_| {
                        CodecError::invalid_content(DataType::Msg, offset, format!("nack code {raw}"))
                    })
                })?;
                let ack_text = optional(flags, msg_flags::HAS_TEXT, || text(reader, "ack text"))?;
                let seq_num = optional(flags, msg_flags::HAS_SEQ_NUM, || reader.u32("seq num"))?;
                Msg::Ack(AckMsg {
                    stream_id,
                    domain,
                    ack_id,
                    nack_code,
                    text: ack_text,
                    seq_num,
                    private_stream: has(msg_flags::PRIVATE_STREAM),
                    ..AckMsg::default()
                })
            }
            MsgClass::Post => {
                let post_user_info = post_user_info(reader)?;
                let post_id = optional(flags, msg_flags::HAS_POST_ID, || reader.u32("post id"))?;
                let seq_num = optional(flags, msg_flags::HAS_SEQ_NUM, || reader.u32("seq num"))?;
                let part_num = optional(flags, msg_flags::HAS_PART_NUM, || reader.u16("part num"))?;
                let post_user_rights = optional(flags, msg_flags::HAS_POST_USER_RIGHTS, || {
                    reader.u16("post user rights")
                })?;
                let perm_data = optional(flags, msg_flags::HAS_PERM_DATA, || {
                    Ok(Bytes::copy_from_slice(reader.length_prefixed("perm data")?))
                })?;
                Msg::Post(PostMsg {
                    stream_id,
                    domain,
                    post_id,
                    seq_num,
                    post_user_info,
                    post_user_rights,
                    ack_requested: has(msg_flags::ACK_REQUESTED),
                    complete: has(msg_flags::COMPLETE),
                    part_num,
                    perm_data,
                    ..PostMsg::default()
                })
            }
            MsgClass::Close => {
                let mut close = CloseMsg::new(stream_id, domain);
                close.ack_requested = has(msg_flags::ACK_REQUESTED);
                Msg::Close(close)
            }
        };

        if has(msg_flags::HAS_KEY) {
            let key = self.key(reader, depth)?;
            match msg.key_mut() {
                Some(slot) => *slot = key,
                None => {
                    return Err(CodecError::invalid_content(
                        DataType::Msg,
                        offset,
                        "close message cannot carry a key",
                    ))
                }
            }
        }
        if has(msg_flags::HAS_EXTENDED_HEADER) {
            let header = Bytes::copy_from_slice(reader.length_prefixed("extended header")?);
            set_extended_header(&mut msg, header);
        }

        let offset = reader.offset();
        let payload_type = data_type(reader.u8("payload type")?, offset)?;
        let payload = self.nested(payload_type, reader, depth + 1)?;
        set_payload(&mut msg, payload, offset)?;
        Ok(msg)
    }
}

fn set_extended_header(msg: &mut Msg, header: Bytes) {
    let slot = match msg {
        Msg::Request(m) => &mut m.extended_header,
        Msg::Refresh(m) => &mut m.extended_header,
        Msg::Update(m) => &mut m.extended_header,
        Msg::Status(m) => &mut m.extended_header,
        Msg::Generic(m) => &mut m.extended_header,
        Msg::Ack(m) => &mut m.extended_header,
        Msg::Post(m) => &mut m.extended_header,
        Msg::Close(m) => &mut m.extended_header,
    };
    *slot = Some(header);
}

fn set_payload(msg: &mut Msg, payload: Data, offset: usize) -> CodecResult<()> {
    let slot = match msg {
        Msg::Request(m) => &mut m.payload,
        Msg::Refresh(m) => &mut m.payload,
        Msg::Update(m) => &mut m.payload,
        Msg::Status(m) => &mut m.payload,
        Msg::Generic(m) => &mut m.payload,
        Msg::Ack(m) => &mut m.payload,
        Msg::Post(m) => &mut m.payload,
        Msg::Close(_) if payload.is_no_data() => return Ok(()),
        Msg::Close(_) => {
            return Err(CodecError::invalid_content(
                DataType::Msg,
                offset,
                "close message cannot carry a payload",
            ))
        }
    };
    *slot = payload;
    Ok(())
}
