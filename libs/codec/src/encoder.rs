//! Message and container encoding
//!
//! ## Layout
//!
//! ```text
//! message  := class:u8 domain:u8 stream_id:i32 flags:u32 class-header [key] [ext-header] payload
//! payload  := data_type:u8 len content
//! key      := key_flags:u8 [name] [name_type:u8] [service_id:u16] [service_name] [filter:u32]
//!             [identifier:i32] [attrib_type:u8 len content]
//! ```
//!
//! Container contents are described in [`crate::decoder`], which reads them
//! back. Encoding refuses payloads containing uncompleted containers and
//! containers nested deeper than the configured limit.

use crate::constants::{
    container_flags, key_flags, msg_flags, DEFAULT_MAX_DEPTH, ENTRY_HAS_PERMISSION, MAX_ENTRIES,
};
use crate::error::{CodecError, CodecResult};
use crate::primitives::{encode_primitive, int_bytes, uint_bytes};
use crate::reader::{put_length_prefixed, put_nested};
use bytes::{BufMut, Bytes, BytesMut};
use types::{
    Data, ElementList, FieldList, FilterList, Map, Msg, MsgKey, OmmArray, PostUserInfo,
    Qos, Series,
};

/// Stateless encoder with a nesting limit
#[derive(Debug, Clone, Copy)]
pub struct Encoder {
    max_depth: usize,
}

impl Default for Encoder {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

fn put_count(out: &mut BytesMut, count: usize, what: &'static str) -> CodecResult<()> {
    if count > MAX_ENTRIES {
        return Err(CodecError::too_large(what, count, MAX_ENTRIES));
    }
    out.put_u16(count as u16);
    Ok(())
}

fn put_qos_field(out: &mut BytesMut, qos: &Qos) -> CodecResult<()> {
    put_nested(out, |scratch| encode_primitive(&Data::Qos(*qos), scratch))
}

fn put_post_user_info(out: &mut BytesMut, info: &PostUserInfo) {
    out.put_u32(info.address);
    out.put_u32(info.user_id);
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_depth(max_depth: usize) -> Self {
        Self { max_depth }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Encode a complete message into a fresh buffer
    pub fn encode_msg(&self, msg: &Msg) -> CodecResult<Bytes> {
        let mut out = BytesMut::with_capacity(128);
        self.encode_msg_into(msg, &mut out)?;
        Ok(out.freeze())
    }

    /// Encode a complete message, appending to `out`
    pub fn encode_msg_into(&self, msg: &Msg, out: &mut BytesMut) -> CodecResult<()> {
        msg.validate_complete()?;
        self.msg_content(msg, out, 0)
    }

    /// Encode the content of a value (no type tag or length)
    pub fn encode_data(&self, data: &Data, out: &mut BytesMut) -> CodecResult<()> {
        data.validate_complete()?;
        self.data_content(data, out, 0)
    }

    fn data_content(&self, data: &Data, out: &mut BytesMut, depth: usize) -> CodecResult<()> {
        if depth > self.max_depth {
            return Err(CodecError::DepthExceeded {
                max_depth: self.max_depth,
            });
        }
        match data {
            Data::NoData => Ok(()),
            Data::Blank(data_type) if data_type.is_primitive() => Ok(()),
            Data::Blank(data_type) => Err(CodecError::invalid_content(
                *data_type,
                0,
                "containers cannot be blank",
            )),
            Data::Array(array) => self.array(array, out),
            Data::FieldList(list) => self.field_list(list, out, depth),
            Data::ElementList(list) => self.element_list(list, out, depth),
            Data::Map(map) => self.map(map, out, depth),
            Data::FilterList(list) => self.filter_list(list, out, depth),
            Data::Series(series) => self.series(series, out, depth),
            Data::Opaque(bytes) => {
                out.put_slice(bytes);
                Ok(())
            }
            Data::Xml(text) => {
                out.put_slice(text.as_bytes());
                Ok(())
            }
            Data::Msg(msg) => self.msg_content(msg, out, depth + 1),
            primitive => encode_primitive(primitive, out),
        }
    }

    fn nested(&self, data: &Data, out: &mut BytesMut, depth: usize) -> CodecResult<()> {
        put_nested(out, |scratch| self.data_content(data, scratch, depth))
    }

    fn array(&self, array: &OmmArray, out: &mut BytesMut) -> CodecResult<()> {
        out.put_u8(array.item_type() as u8);
        out.put_u8(array.width());
        put_count(out, array.len(), "array items")?;
        let width = array.width() as usize;
        for item in array.items() {
            if width == 0 {
                put_nested(out, |scratch| encode_primitive(item, scratch))?;
                continue;
            }
            let content = match item {
                Data::Int(value) => pad(int_bytes(*value), width, if *value < 0 { 0xFF } else { 0 }),
                Data::UInt(value) => pad(uint_bytes(*value), width, 0),
                Data::Enum(value) => (width == 2).then(|| value.to_be_bytes().to_vec()),
                other => {
                    let mut scratch = BytesMut::new();
                    encode_primitive(other, &mut scratch)?;
                    Some(scratch.to_vec())
                }
            };
            match content {
                Some(bytes) if bytes.len() == width => out.put_slice(&bytes),
                _ => {
                    return Err(CodecError::invalid_content(
                        array.item_type(),
                        0,
                        format!("item does not fit fixed width {width}"),
                    ))
                }
            }
        }
        Ok(())
    }

    fn field_list(&self, list: &FieldList, out: &mut BytesMut, depth: usize) -> CodecResult<()> {
        match list.list_info() {
            Some(info) => {
                out.put_u8(container_flags::FIELD_LIST_HAS_INFO);
                out.put_u16(info.dictionary_id);
                out.put_i16(info.field_list_num);
            }
            None => out.put_u8(0),
        }
        put_count(out, list.len(), "field list entries")?;
        for entry in list.entries() {
            out.put_i16(entry.fid);
            out.put_u8(entry.data.data_type() as u8);
            self.nested(&entry.data, out, depth + 1)?;
        }
        Ok(())
    }

    fn element_list(&self, list: &ElementList, out: &mut BytesMut, depth: usize) -> CodecResult<()> {
        match list.element_list_num() {
            Some(number) => {
                out.put_u8(container_flags::ELEMENT_LIST_HAS_NUM);
                out.put_i16(number);
            }
            None => out.put_u8(0),
        }
        put_count(out, list.len(), "element list entries")?;
        for entry in list.entries() {
            put_length_prefixed(out, entry.name.as_bytes())?;
            out.put_u8(entry.data.data_type() as u8);
            self.nested(&entry.data, out, depth + 1)?;
        }
        Ok(())
    }

    fn map(&self, map: &Map, out: &mut BytesMut, depth: usize) -> CodecResult<()> {
        let mut flags = 0;
        if map.key_fid().is_some() {
            flags |= container_flags::MAP_HAS_KEY_FID;
        }
        if map.summary().is_some() {
            flags |= container_flags::MAP_HAS_SUMMARY;
        }
        if map.count_hint().is_some() {
            flags |= container_flags::MAP_HAS_COUNT_HINT;
        }
        out.put_u8(flags);
        out.put_u8(map.key_type() as u8);
        out.put_u8(map.container_type() as u8);
        if let Some(fid) = map.key_fid() {
            out.put_i16(fid);
        }
        if let Some(summary) = map.summary() {
            self.nested(summary, out, depth + 1)?;
        }
        if let Some(hint) = map.count_hint() {
            out.put_u32(hint);
        }
        put_count(out, map.len(), "map entries")?;
        for entry in map.entries() {
            let mut action = entry.action as u8;
            if entry.permission.is_some() {
                action |= ENTRY_HAS_PERMISSION;
            }
            out.put_u8(action);
            if let Some(permission) = &entry.permission {
                put_length_prefixed(out, permission)?;
            }
            put_nested(out, |scratch| encode_primitive(&entry.key, scratch))?;
            if entry.action != types::MapAction::Delete {
                self.nested(&entry.payload, out, depth + 1)?;
            }
        }
        Ok(())
    }

    fn filter_list(&self, list: &FilterList, out: &mut BytesMut, depth: usize) -> CodecResult<()> {
        match list.count_hint() {
            Some(hint) => {
                out.put_u8(container_flags::FILTER_HAS_COUNT_HINT);
                out.put_u8(hint);
            }
            None => out.put_u8(0),
        }
        put_count(out, list.len(), "filter entries")?;
        for entry in list.entries() {
            out.put_u8(entry.id);
            let mut action = entry.action as u8;
            if entry.permission.is_some() {
                action |= ENTRY_HAS_PERMISSION;
            }
            out.put_u8(action);
            out.put_u8(entry.payload.data_type() as u8);
            if let Some(permission) = &entry.permission {
                put_length_prefixed(out, permission)?;
            }
            self.nested(&entry.payload, out, depth + 1)?;
        }
        Ok(())
    }

    fn series(&self, series: &Series, out: &mut BytesMut, depth: usize) -> CodecResult<()> {
        let mut flags = 0;
        if series.summary().is_some() {
            flags |= container_flags::SERIES_HAS_SUMMARY;
        }
        if series.count_hint().is_some() {
            flags |= container_flags::SERIES_HAS_COUNT_HINT;
        }
        out.put_u8(flags);
        out.put_u8(series.container_type() as u8);
        if let Some(summary) = series.summary() {
            self.nested(summary, out, depth + 1)?;
        }
        if let Some(hint) = series.count_hint() {
            out.put_u32(hint);
        }
        put_count(out, series.len(), "series entries")?;
        for entry in series.entries() {
            self.nested(entry, out, depth + 1)?;
        }
        Ok(())
    }

    fn key(&self, key: &MsgKey, out: &mut BytesMut, depth: usize) -> CodecResult<()> {
        let mut flags = 0;
        if key.name.is_some() {
            flags |= key_flags::NAME;
        }
        if key.name_type.is_some() {
            flags |= key_flags::NAME_TYPE;
        }
        if key.service_id.is_some() {
            flags |= key_flags::SERVICE_ID;
        }
        if key.service_name.is_some() {
            flags |= key_flags::SERVICE_NAME;
        }
        if key.filter.is_some() {
            flags |= key_flags::FILTER;
        }
        if key.identifier.is_some() {
            flags |= key_flags::IDENTIFIER;
        }
        if key.attrib.is_some() {
            flags |= key_flags::ATTRIB;
        }
        out.put_u8(flags);
        if let Some(name) = &key.name {
            put_length_prefixed(out, name.as_bytes())?;
        }
        if let Some(name_type) = key.name_type {
            out.put_u8(name_type);
        }
        if let Some(service_id) = key.service_id {
            out.put_u16(service_id);
        }
        if let Some(service_name) = &key.service_name {
            put_length_prefixed(out, service_name.as_bytes())?;
        }
        if let Some(filter) = key.filter {
            out.put_u32(filter);
        }
        if let Some(identifier) = key.identifier {
            out.put_i32(identifier);
        }
        if let Some(attrib) = &key.attrib {
            out.put_u8(attrib.data_type() as u8);
            self.nested(attrib, out, depth + 1)?;
        }
        Ok(())
    }

    fn msg_content(&self, msg: &Msg, out: &mut BytesMut, depth: usize) -> CodecResult<()> {
        if depth > self.max_depth {
            return Err(CodecError::DepthExceeded {
                max_depth: self.max_depth,
            });
        }
        out.put_u8(msg.class() as u8);
        out.put_u8(msg.domain().value());
        out.put_i32(msg.stream_id());

        let mut header = BytesMut::new();
        let mut flags = match msg {
            Msg::Request(req) => {
                let mut flags = 0;
                set(&mut flags, msg_flags::STREAMING, req.streaming);
                set(&mut flags, msg_flags::NO_REFRESH, !req.initial_image);
                set(&mut flags, msg_flags::PAUSE, req.pause);
                set(&mut flags, msg_flags::PRIVATE_STREAM, req.private_stream);
                set(&mut flags, msg_flags::QUALIFIED_STREAM, req.qualified_stream);
                set(&mut flags, msg_flags::CONF_INFO_IN_UPDATES, req.conf_info_in_updates);
                set(&mut flags, msg_flags::HAS_VIEW, req.has_view);
                set(&mut flags, msg_flags::HAS_BATCH, req.has_batch);
                if let Some(priority) = req.priority {
                    flags |= msg_flags::HAS_PRIORITY;
                    header.put_u8(priority.class);
                    header.put_u16(priority.count);
                }
                if let Some(qos) = &req.qos {
                    flags |= msg_flags::HAS_QOS;
                    put_qos_field(&mut header, qos)?;
                }
                if let Some(qos) = &req.worst_qos {
                    flags |= msg_flags::HAS_WORST_QOS;
                    put_qos_field(&mut header, qos)?;
                }
                flags
            }
            Msg::Refresh(refresh) => {
                let mut flags = msg_flags::HAS_STATE;
                set(&mut flags, msg_flags::SOLICITED, refresh.solicited);
                set(&mut flags, msg_flags::COMPLETE, refresh.complete);
                set(&mut flags, msg_flags::CLEAR_CACHE, refresh.clear_cache);
                set(&mut flags, msg_flags::DO_NOT_CACHE, refresh.do_not_cache);
                set(&mut flags, msg_flags::PRIVATE_STREAM, refresh.private_stream);
                set(&mut flags, msg_flags::QUALIFIED_STREAM, refresh.qualified_stream);
                put_nested(&mut header, |scratch| {
                    encode_primitive(&Data::State(refresh.state.clone()), scratch)
                })?;
                if !refresh.group_id.is_empty() {
                    flags |= msg_flags::HAS_GROUP_ID;
                    put_length_prefixed(&mut header, &refresh.group_id)?;
                }
                if let Some(seq) = refresh.seq_num {
                    flags |= msg_flags::HAS_SEQ_NUM;
                    header.put_u32(seq);
                }
                if let Some(part) = refresh.part_num {
                    flags |= msg_flags::HAS_PART_NUM;
                    header.put_u16(part);
                }
                if let Some(qos) = &refresh.qos {
                    flags |= msg_flags::HAS_QOS;
                    put_qos_field(&mut header, qos)?;
                }
                if let Some(info) = &refresh.post_user_info {
                    flags |= msg_flags::HAS_POST_USER_INFO;
                    put_post_user_info(&mut header, info);
                }
                if let Some(perm) = &refresh.perm_data {
                    flags |= msg_flags::HAS_PERM_DATA;
                    put_length_prefixed(&mut header, perm)?;
                }
                flags
            }
            Msg::Update(update) => {
                let mut flags = 0;
                set(&mut flags, msg_flags::DO_NOT_CACHE, update.do_not_cache);
                set(&mut flags, msg_flags::DO_NOT_CONFLATE, update.do_not_conflate);
                set(&mut flags, msg_flags::DO_NOT_RIPPLE, update.do_not_ripple);
                header.put_u8(update.update_type);
                if let Some(seq) = update.seq_num {
                    flags |= msg_flags::HAS_SEQ_NUM;
                    header.put_u32(seq);
                }
                if let Some((count, time)) = update.conflation {
                    flags |= msg_flags::HAS_CONFLATION;
                    header.put_u16(count);
                    header.put_u16(time);
                }
                if let Some(info) = &update.post_user_info {
                    flags |= msg_flags::HAS_POST_USER_INFO;
                    put_post_user_info(&mut header, info);
                }
                if let Some(perm) = &update.perm_data {
                    flags |= msg_flags::HAS_PERM_DATA;
                    put_length_prefixed(&mut header, perm)?;
                }
                flags
            }
            Msg::Status(status) => {
                let mut flags = 0;
                set(&mut flags, msg_flags::CLEAR_CACHE, status.clear_cache);
                set(&mut flags, msg_flags::PRIVATE_STREAM, status.private_stream);
                if let Some(state) = &status.state {
                    flags |= msg_flags::HAS_STATE;
                    put_nested(&mut header, |scratch| {
                        encode_primitive(&Data::State(state.clone()), scratch)
                    })?;
                }
                if let Some(group_id) = &status.group_id {
                    flags |= msg_flags::HAS_GROUP_ID;
                    put_length_prefixed(&mut header, group_id)?;
                }
                if let Some(info) = &status.post_user_info {
                    flags |= msg_flags::HAS_POST_USER_INFO;
                    put_post_user_info(&mut header, info);
                }
                if let Some(perm) = &status.perm_data {
                    flags |= msg_flags::HAS_PERM_DATA;
                    put_length_prefixed(&mut header, perm)?;
                }
                flags
            }
            Msg::Generic(generic) => {
                let mut flags = 0;
                set(&mut flags, msg_flags::COMPLETE, generic.complete);
                if let Some(seq) = generic.seq_num {
                    flags |= msg_flags::HAS_SEQ_NUM;
                    header.put_u32(seq);
                }
                if let Some(seq) = generic.secondary_seq_num {
                    flags |= msg_flags::HAS_SECONDARY_SEQ_NUM;
                    header.put_u32(seq);
                }
                if let Some(part) = generic.part_num {
                    flags |= msg_flags::HAS_PART_NUM;
                    header.put_u16(part);
                }
                if let Some(perm) = &generic.perm_data {
                    flags |= msg_flags::HAS_PERM_DATA;
                    put_length_prefixed(&mut header, perm)?;
                }
                flags
            }
            Msg::Ack(ack) => {
                let mut flags = 0;
                set(&mut flags, msg_flags::PRIVATE_STREAM, ack.private_stream);
                header.put_u32(ack.ack_id);
                if let Some(code) = ack.nack_code {
                    flags |= msg_flags::HAS_NACK_CODE;
                    header.put_u8(code as u8);
                }
                if let Some(text) = &ack.text {
                    flags |= msg_flags::HAS_TEXT;
                    put_length_prefixed(&mut header, text.as_bytes())?;
                }
                if let Some(seq) = ack.seq_num {
                    flags |= msg_flags::HAS_SEQ_NUM;
                    header.put_u32(seq);
                }
                flags
            }
            Msg::Post(post) => {
                let mut flags = 0;
                set(&mut flags, msg_flags::ACK_REQUESTED, post.ack_requested);
                set(&mut flags, msg_flags::COMPLETE, post.complete);
                put_post_user_info(&mut header, &post.post_user_info);
                if let Some(id) = post.post_id {
                    flags |= msg_flags::HAS_POST_ID;
                    header.put_u32(id);
                }
                if let Some(seq) = post.seq_num {
                    flags |= msg_flags::HAS_SEQ_NUM;
                    header.put_u32(seq);
                }
                if let Some(part) = post.part_num {
                    flags |= msg_flags::HAS_PART_NUM;
                    header.put_u16(part);
                }
                if let Some(rights) = post.post_user_rights {
                    flags |= msg_flags::HAS_POST_USER_RIGHTS;
                    header.put_u16(rights);
                }
                if let Some(perm) = &post.perm_data {
                    flags |= msg_flags::HAS_PERM_DATA;
                    put_length_prefixed(&mut header, perm)?;
                }
                flags
            }
            Msg::Close(close) => {
                let mut flags = 0;
                set(&mut flags, msg_flags::ACK_REQUESTED, close.ack_requested);
                flags
            }
        };

        let key = msg.key().filter(|key| !key.is_empty());
        if key.is_some() {
            flags |= msg_flags::HAS_KEY;
        }
        let extended_header = match msg {
            Msg::Request(m) => m.extended_header.as_ref(),
            Msg::Refresh(m) => m.extended_header.as_ref(),
            Msg::Update(m) => m.extended_header.as_ref(),
            Msg::Status(m) => m.extended_header.as_ref(),
            Msg::Generic(m) => m.extended_header.as_ref(),
            Msg::Ack(m) => m.extended_header.as_ref(),
            Msg::Post(m) => m.extended_header.as_ref(),
            Msg::Close(m) => m.extended_header.as_ref(),
        };
        if extended_header.is_some() {
            flags |= msg_flags::HAS_EXTENDED_HEADER;
        }

        out.put_u32(flags);
        out.put_slice(&header);
        if let Some(key) = key {
            self.key(key, out, depth)?;
        }
        if let Some(extended_header) = extended_header {
            put_length_prefixed(out, extended_header)?;
        }
        let payload = msg.payload();
        out.put_u8(payload.data_type() as u8);
        self.nested(payload, out, depth + 1)
    }
}

fn set(flags: &mut u32, bit: u32, on: bool) {
    if on {
        *flags |= bit;
    }
}

/// Pad minimal integer bytes up to `width` with `fill`; `None` if it does not fit
fn pad(bytes: Vec<u8>, width: usize, fill: u8) -> Option<Vec<u8>> {
    if bytes.len() > width {
        return None;
    }
    let mut padded = vec![fill; width - bytes.len()];
    padded.extend_from_slice(&bytes);
    Some(padded)
}
