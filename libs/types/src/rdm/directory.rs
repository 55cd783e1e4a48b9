//! Source directory payloads
//!
//! A directory refresh or update is a [`Map`] keyed by service id (UInt); each
//! entry is a [`FilterList`] whose Info entry (id 1) and State entry (id 2) are
//! element lists. Consumers request only the filters they need via the key's
//! filter mask. Group entries (id 3) may repeat, one per item group whose
//! state changed; they are events and never part of a cached service.

use super::names;
use crate::common::errors::{ValidationError, ValidationResult};
use crate::data::{Data, ElementList, FilterList, Map, OmmArray, Qos, State};
use crate::protocol::{DataType, FilterAction, MapAction};
use bytes::Bytes;

/// Filter ids inside each service entry
pub mod filter_id {
    pub const INFO: u8 = 1;
    pub const STATE: u8 = 2;
    pub const GROUP: u8 = 3;
    pub const LOAD: u8 = 4;
    pub const DATA: u8 = 5;
    pub const LINK: u8 = 6;
}

/// Filter mask bits requested in the directory request key
pub mod filter_mask {
    pub const INFO: u32 = 0x01;
    pub const STATE: u32 = 0x02;
    pub const GROUP: u32 = 0x04;
    pub const LOAD: u32 = 0x08;
    pub const DATA: u32 = 0x10;
    pub const LINK: u32 = 0x20;

    pub const INFO_STATE: u32 = INFO | STATE;

    /// What the consumer watchlist requests
    pub const WATCHLIST: u32 = INFO | STATE | GROUP;
}

/// Static description of a service
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ServiceInfo {
    pub name: String,
    pub vendor: Option<String>,
    pub is_source: bool,
    /// Domain type values the service supports
    pub capabilities: Vec<u16>,
    pub dictionaries_provided: Vec<String>,
    pub dictionaries_used: Vec<String>,
    pub qos: Vec<Qos>,
}

/// Dynamic state of a service
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceState {
    pub service_up: bool,
    pub accepting_requests: bool,
    pub status: Option<State>,
}

impl Default for ServiceState {
    fn default() -> Self {
        Self {
            service_up: true,
            accepting_requests: true,
            status: None,
        }
    }
}

/// State change of one item group inside a service
///
/// `status` applies to every item the provider tagged with `group`;
/// `merged_to` moves those items into another group.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ServiceGroup {
    pub group: Bytes,
    pub merged_to: Option<Bytes>,
    pub status: Option<State>,
}

impl ServiceGroup {
    pub fn status(group: impl Into<Bytes>, status: State) -> Self {
        Self {
            group: group.into(),
            merged_to: None,
            status: Some(status),
        }
    }

    pub fn merge(group: impl Into<Bytes>, into: impl Into<Bytes>) -> Self {
        Self {
            group: group.into(),
            merged_to: Some(into.into()),
            status: None,
        }
    }
}

/// One service entry in a directory message
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceEntry {
    pub action: MapAction,
    pub id: u16,
    pub info: Option<ServiceInfo>,
    pub state: Option<ServiceState>,
    pub groups: Vec<ServiceGroup>,
}

impl ServiceEntry {
    pub fn add(id: u16, info: ServiceInfo, state: ServiceState) -> Self {
        Self {
            action: MapAction::Add,
            id,
            info: Some(info),
            state: Some(state),
            groups: Vec::new(),
        }
    }

    pub fn delete(id: u16) -> Self {
        Self {
            action: MapAction::Delete,
            id,
            info: None,
            state: None,
            groups: Vec::new(),
        }
    }

    /// Update carrying only item group changes
    pub fn groups(id: u16, groups: Vec<ServiceGroup>) -> Self {
        Self {
            action: MapAction::Update,
            id,
            info: None,
            state: None,
            groups,
        }
    }
}

/// Encode service entries, keeping only the filters in `filter`
///
/// Returns [`Data::NoData`] when there is nothing to send.
pub fn encode(entries: &[ServiceEntry], filter: u32) -> ValidationResult<Data> {
    if entries.is_empty() {
        return Ok(Data::NoData);
    }
    let mut map = Map::new();
    for entry in entries {
        let payload = if entry.action == MapAction::Delete {
            Data::NoData
        } else {
            let filter_action = match entry.action {
                MapAction::Add => FilterAction::Set,
                _ => FilterAction::Update,
            };
            encode_filters(entry, filter, filter_action)?
        };
        map.add_entry(Data::UInt(entry.id as u64), entry.action, payload)?;
    }
    map.complete()?;
    Ok(Data::Map(map))
}

fn encode_filters(entry: &ServiceEntry, filter: u32, action: FilterAction) -> ValidationResult<Data> {
    let mut filters = FilterList::new();
    if filter & filter_mask::INFO != 0 {
        if let Some(info) = &entry.info {
            filters.add_entry(filter_id::INFO, action, encode_info(info)?)?;
        }
    }
    if filter & filter_mask::STATE != 0 {
        if let Some(state) = &entry.state {
            filters.add_entry(filter_id::STATE, action, encode_state(state)?)?;
        }
    }
    if filter & filter_mask::GROUP != 0 {
        for group in &entry.groups {
            filters.add_entry(filter_id::GROUP, FilterAction::Set, encode_group(group)?)?;
        }
    }
    if filters.is_empty() {
        return Ok(Data::NoData);
    }
    filters.complete()?;
    Ok(Data::FilterList(filters))
}

fn ascii_array(values: &[String]) -> ValidationResult<OmmArray> {
    let mut array = OmmArray::new(DataType::AsciiString);
    for value in values {
        array.add_ascii(value.clone())?;
    }
    array.complete()?;
    Ok(array)
}

fn encode_info(info: &ServiceInfo) -> ValidationResult<ElementList> {
    let mut elements = ElementList::new();
    elements.add_ascii(names::NAME, info.name.clone())?;
    if let Some(vendor) = &info.vendor {
        elements.add_ascii(names::VENDOR, vendor.clone())?;
    }
    elements.add_uint(names::IS_SOURCE, info.is_source as u64)?;
    if !info.capabilities.is_empty() {
        let mut array = OmmArray::new(DataType::UInt);
        for capability in &info.capabilities {
            array.add_uint(*capability as u64)?;
        }
        array.complete()?;
        elements.add_entry(names::CAPABILITIES, array)?;
    }
    if !info.dictionaries_provided.is_empty() {
        elements.add_entry(names::DICTIONARIES_PROVIDED, ascii_array(&info.dictionaries_provided)?)?;
    }
    if !info.dictionaries_used.is_empty() {
        elements.add_entry(names::DICTIONARIES_USED, ascii_array(&info.dictionaries_used)?)?;
    }
    if !info.qos.is_empty() {
        let mut array = OmmArray::new(DataType::Qos);
        for qos in &info.qos {
            array.add(*qos)?;
        }
        array.complete()?;
        elements.add_entry(names::QOS, array)?;
    }
    elements.complete()?;
    Ok(elements)
}

fn encode_state(state: &ServiceState) -> ValidationResult<ElementList> {
    let mut elements = ElementList::new();
    elements
        .add_uint(names::SERVICE_STATE, state.service_up as u64)?
        .add_uint(names::ACCEPTING_REQUESTS, state.accepting_requests as u64)?;
    if let Some(status) = &state.status {
        elements.add_entry(names::STATUS, status.clone())?;
    }
    elements.complete()?;
    Ok(elements)
}

fn encode_group(group: &ServiceGroup) -> ValidationResult<ElementList> {
    let mut elements = ElementList::new();
    elements.add_entry(names::GROUP, Data::Buffer(group.group.clone()))?;
    if let Some(merged_to) = &group.merged_to {
        elements.add_entry(names::MERGED_TO_GROUP, Data::Buffer(merged_to.clone()))?;
    }
    if let Some(status) = &group.status {
        elements.add_entry(names::STATUS, status.clone())?;
    }
    elements.complete()?;
    Ok(elements)
}

/// Decode the service entries of a directory refresh or update payload
pub fn decode(payload: &Data) -> ValidationResult<Vec<ServiceEntry>> {
    let map = match payload {
        Data::Map(map) => map,
        Data::NoData => return Ok(Vec::new()),
        other => {
            return Err(ValidationError::invalid(
                "directory payload",
                format!("expected Map, got {:?}", other.data_type()),
            ))
        }
    };

    let mut services = Vec::with_capacity(map.len());
    for entry in map.entries() {
        let id = entry
            .key
            .as_u64()
            .and_then(|id| u16::try_from(id).ok())
            .ok_or_else(|| ValidationError::invalid("service id", format!("{:?}", entry.key)))?;
        let mut service = ServiceEntry {
            action: entry.action,
            id,
            info: None,
            state: None,
            groups: Vec::new(),
        };
        if let Data::FilterList(filters) = &entry.payload {
            for filter in filters.entries() {
                let Some(elements) = filter.payload.as_element_list() else {
                    continue;
                };
                match filter.id {
                    filter_id::INFO => service.info = Some(decode_info(elements)),
                    filter_id::STATE => service.state = Some(decode_state(elements)),
                    filter_id::GROUP => service.groups.extend(decode_group(elements)),
                    _ => {}
                }
            }
        }
        services.push(service);
    }
    Ok(services)
}

fn strings(data: Option<&Data>) -> Vec<String> {
    data.and_then(Data::as_array)
        .map(|array| {
            array
                .items()
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn decode_info(elements: &ElementList) -> ServiceInfo {
    ServiceInfo {
        name: elements
            .get(names::NAME)
            .and_then(Data::as_str)
            .unwrap_or_default()
            .to_string(),
        vendor: elements.get(names::VENDOR).and_then(Data::as_str).map(str::to_string),
        is_source: elements.get(names::IS_SOURCE).and_then(Data::as_u64).unwrap_or(0) != 0,
        capabilities: elements
            .get(names::CAPABILITIES)
            .and_then(Data::as_array)
            .map(|array| {
                array
                    .items()
                    .iter()
                    .filter_map(|item| item.as_u64().and_then(|v| u16::try_from(v).ok()))
                    .collect()
            })
            .unwrap_or_default(),
        dictionaries_provided: strings(elements.get(names::DICTIONARIES_PROVIDED)),
        dictionaries_used: strings(elements.get(names::DICTIONARIES_USED)),
        qos: elements
            .get(names::QOS)
            .and_then(Data::as_array)
            .map(|array| {
                array
                    .items()
                    .iter()
                    .filter_map(|item| match item {
                        Data::Qos(qos) => Some(*qos),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default(),
    }
}

fn decode_state(elements: &ElementList) -> ServiceState {
    ServiceState {
        service_up: elements.get(names::SERVICE_STATE).and_then(Data::as_u64).unwrap_or(1) != 0,
        accepting_requests: elements
            .get(names::ACCEPTING_REQUESTS)
            .and_then(Data::as_u64)
            .unwrap_or(1)
            != 0,
        status: match elements.get(names::STATUS) {
            Some(Data::State(state)) => Some(state.clone()),
            _ => None,
        },
    }
}

fn buffer(data: Option<&Data>) -> Option<Bytes> {
    match data {
        Some(Data::Buffer(bytes)) => Some(bytes.clone()),
        Some(Data::Ascii(text)) => Some(Bytes::from(text.clone())),
        _ => None,
    }
}

fn decode_group(elements: &ElementList) -> Option<ServiceGroup> {
    Some(ServiceGroup {
        group: buffer(elements.get(names::GROUP))?,
        merged_to: buffer(elements.get(names::MERGED_TO_GROUP)),
        status: match elements.get(names::STATUS) {
            Some(Data::State(state)) => Some(state.clone()),
            _ => None,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn direct_feed() -> ServiceInfo {
        ServiceInfo {
            name: "DIRECT_FEED".into(),
            vendor: Some("ACME".into()),
            is_source: true,
            capabilities: vec![6, 7, 8],
            dictionaries_provided: vec![],
            dictionaries_used: vec!["RWFFld".into(), "RWFEnum".into()],
            qos: vec![Qos::realtime()],
        }
    }

    #[test]
    fn services_survive_encoding() {
        let entries = vec![
            ServiceEntry::add(1, direct_feed(), ServiceState::default()),
            ServiceEntry::delete(9),
        ];
        let payload = encode(&entries, filter_mask::INFO_STATE).unwrap();
        assert_eq!(decode(&payload).unwrap(), entries);
    }

    #[test]
    fn filter_mask_limits_what_is_sent() {
        let entries = vec![ServiceEntry::add(1, direct_feed(), ServiceState::default())];
        let payload = encode(&entries, filter_mask::STATE).unwrap();
        let decoded = decode(&payload).unwrap();
        assert!(decoded[0].info.is_none());
        assert!(decoded[0].state.is_some());
    }

    #[test]
    fn group_changes_ride_in_repeated_group_filters() {
        let closed = State::closed_recover(crate::StatusCode::NONE, "Feed restarting");
        let entries = vec![ServiceEntry::groups(
            1,
            vec![
                ServiceGroup::status(&b"\x00\x01"[..], closed),
                ServiceGroup::merge(&b"\x00\x02"[..], &b"\x00\x03"[..]),
            ],
        )];
        let payload = encode(&entries, filter_mask::WATCHLIST).unwrap();
        assert_eq!(decode(&payload).unwrap(), entries);

        let without = decode(&encode(&entries, filter_mask::INFO_STATE).unwrap()).unwrap();
        assert!(without[0].groups.is_empty());
    }
}
