//! # Codec Integration Tests
//!
//! Full-message encode/decode through the public API, and rejection of
//! malformed or hostile frames.

use bytes::{BufMut, BytesMut};
use codec::{decode_msg, encode_msg, CodecError, Decoder, Encoder};
use types::{
    AckMsg, CloseMsg, Data, DataType, DomainType, ElementList, FieldList, FilterAction,
    FilterList, GenericMsg, Map, MapAction, Msg, NackCode, OmmArray, PostMsg, Qos,
    Rate, RealHint, RefreshMsg, ReqMsg, Series, State, StatusCode, StatusMsg, Timeliness,
    UpdateMsg,
};

fn round_trip(msg: Msg) -> Msg {
    let bytes = encode_msg(&msg).unwrap();
    decode_msg(&bytes).unwrap()
}

fn price_fields() -> FieldList {
    let mut fields = FieldList::new();
    fields
        .add_real(22, 3990, RealHint::ExponentNeg2)
        .unwrap()
        .add_real(25, 3994, RealHint::ExponentNeg2)
        .unwrap()
        .add_uint(32, 1500)
        .unwrap()
        .add_ascii(3, "IBM")
        .unwrap()
        .add_date(16, 2024, 7, 4)
        .unwrap()
        .add_enum(14, 1)
        .unwrap()
        .add_blank(30, DataType::Real)
        .unwrap();
    fields.complete().unwrap();
    fields
}

#[test]
fn test_market_price_refresh_round_trip() {
    let refresh = RefreshMsg::new()
        .stream_id(5)
        .name("IBM.N")
        .service_name("DIRECT_FEED")
        .seq_num(42)
        .qos(Qos::realtime())
        .payload(price_fields());
    let decoded = round_trip(refresh.clone().into());
    assert_eq!(decoded, Msg::from(refresh));
    let payload = decoded.payload().as_field_list().unwrap();
    assert_eq!(payload.get(32), Some(&Data::UInt(1500)));
    assert_eq!(payload.get(30), Some(&Data::Blank(DataType::Real)));
}

#[test]
fn test_request_with_view_batch_and_qos_round_trip() {
    let request = ReqMsg::new()
        .stream_id(3)
        .service_name("DIRECT_FEED")
        .priority(2, 10)
        .qos(Qos::new(Timeliness::Delayed(900), Rate::TimeConflated(1000)))
        .worst_qos(Qos::new(Timeliness::DelayedUnknown, Rate::JitConflated))
        .view_fields(&[22, 25])
        .unwrap()
        .batch_names(["IBM.N", "MSFT.O", "GOOG.O"])
        .unwrap()
        .initial_image(false);
    let decoded = round_trip(request.clone().into());
    assert_eq!(decoded, Msg::from(request));
}

#[test]
fn test_every_message_class_round_trips() {
    let mut map = Map::new();
    map.key_field_id(3427)
        .unwrap()
        .add_entry("ORD1", MapAction::Add, price_fields())
        .unwrap()
        .delete("ORD0")
        .unwrap();
    map.complete().unwrap();

    let messages: Vec<Msg> = vec![
        UpdateMsg::new()
            .stream_id(5)
            .update_type(1)
            .conflation(3, 250)
            .domain(DomainType::MARKET_BY_ORDER)
            .payload(map)
            .into(),
        StatusMsg::new()
            .stream_id(5)
            .state(State::closed(StatusCode::NOT_FOUND, "Item not found"))
            .into(),
        GenericMsg::new()
            .stream_id(1)
            .domain(DomainType::LOGIN)
            .secondary_seq_num(9)
            .into(),
        AckMsg::new()
            .stream_id(5)
            .ack_id(7)
            .nack_code(NackCode::AccessDenied)
            .text("denied")
            .into(),
        PostMsg::new()
            .stream_id(5)
            .post_id(7)
            .post_user_info(0x7F00_0001, 42)
            .solicit_ack(true)
            .payload(price_fields())
            .into(),
        CloseMsg::new(5, DomainType::MARKET_PRICE).into(),
    ];
    for msg in messages {
        assert_eq!(round_trip(msg.clone()), msg);
    }
}

#[test]
fn test_directory_filter_list_and_nested_msg_round_trip() {
    let mut info = ElementList::new();
    info.add_ascii("Name", "DIRECT_FEED").unwrap();
    info.complete().unwrap();
    let mut filters = FilterList::new();
    filters
        .total_count_hint(2)
        .unwrap()
        .add_entry(1, FilterAction::Set, info)
        .unwrap()
        .add_entry(2, FilterAction::Clear, Data::NoData)
        .unwrap();
    filters.complete().unwrap();

    let inner = RefreshMsg::new().stream_id(9).payload(filters);
    let generic = GenericMsg::new()
        .stream_id(-3)
        .domain(DomainType::new(200).unwrap())
        .payload(Msg::from(inner));
    let decoded = round_trip(generic.clone().into());
    assert_eq!(decoded, Msg::from(generic));
    assert!(decoded.payload().as_msg().is_some());
}

#[test]
fn test_series_and_fixed_width_array() {
    let mut fids = OmmArray::new(DataType::Int);
    fids.fixed_width(2).unwrap().add_int(-22).unwrap().add_int(300).unwrap();
    fids.complete().unwrap();
    let mut row = ElementList::new();
    row.add_entry("FIDS", fids).unwrap();
    row.complete().unwrap();
    let mut series = Series::new();
    series.add_entry(row).unwrap();
    series.complete().unwrap();

    let refresh = RefreshMsg::new()
        .domain(DomainType::DICTIONARY)
        .name("RWFEnum")
        .payload(series);
    assert_eq!(round_trip(refresh.clone().into()), Msg::from(refresh));
}

#[test]
fn test_uncompleted_payload_is_refused() {
    let mut fields = FieldList::new();
    fields.add_uint(32, 1).unwrap();
    let update = UpdateMsg::new().payload(fields);
    let err = encode_msg(&update.into()).unwrap_err();
    assert!(matches!(err, CodecError::Validation(_)));
}

#[test]
fn test_truncated_frame_is_rejected() {
    let bytes = encode_msg(&RefreshMsg::new().payload(price_fields()).into()).unwrap();
    for len in [0, 1, 5, bytes.len() / 2, bytes.len() - 1] {
        assert!(decode_msg(&bytes[..len]).is_err(), "prefix of {len} bytes decoded");
    }
}

#[test]
fn test_trailing_bytes_are_rejected() {
    let mut bytes = BytesMut::from(&encode_msg(&CloseMsg::new(1, DomainType::MARKET_PRICE).into()).unwrap()[..]);
    bytes.put_u8(0);
    assert!(matches!(decode_msg(&bytes), Err(CodecError::TrailingBytes { .. })));
}

#[test]
fn test_unknown_class_and_domain_zero_are_rejected() {
    let mut bytes = BytesMut::new();
    bytes.put_u8(99);
    bytes.put_u8(6);
    assert!(matches!(
        decode_msg(&bytes),
        Err(CodecError::UnknownMsgClass { class: 99, offset: 0 })
    ));

    let mut bytes = BytesMut::from(&encode_msg(&CloseMsg::new(1, DomainType::MARKET_PRICE).into()).unwrap()[..]);
    bytes[1] = 0;
    assert!(matches!(decode_msg(&bytes), Err(CodecError::InvalidContent { offset: 1, .. })));
}

#[test]
fn test_unknown_data_type_tag_is_rejected() {
    let mut bytes = BytesMut::from(&encode_msg(&CloseMsg::new(1, DomainType::MARKET_PRICE).into()).unwrap()[..]);
    let last = bytes.len() - 2;
    bytes[last] = 7;
    assert!(matches!(decode_msg(&bytes), Err(CodecError::UnknownDataType { tag: 7, .. })));
}

#[test]
fn test_reserved_real_hint_is_rejected() {
    for hint in [31u8, 32, 36] {
        let err = Decoder::new().decode_data(DataType::Real, &[hint, 1]).unwrap_err();
        assert!(matches!(err, CodecError::InvalidRealHint { .. }), "hint {hint}");
    }
}

#[test]
fn test_nesting_beyond_limit_is_rejected() {
    let mut data = Data::UInt(1);
    for _ in 0..8 {
        let mut list = ElementList::new();
        list.add_entry("Nested", data).unwrap();
        list.complete().unwrap();
        data = Data::ElementList(list);
    }
    let mut content = BytesMut::new();
    Encoder::new().encode_data(&data, &mut content).unwrap();

    assert!(Decoder::new().decode_data(DataType::ElementList, &content).is_ok());
    let err = Decoder::with_max_depth(4)
        .decode_data(DataType::ElementList, &content)
        .unwrap_err();
    assert_eq!(err, CodecError::DepthExceeded { max_depth: 4 });
    assert!(Encoder::with_max_depth(4).encode_data(&data, &mut BytesMut::new()).is_err());
}

#[test]
fn test_hostile_entry_count_does_not_overallocate() {
    // Field list claiming 65535 entries with no bytes behind it
    let content = [0u8, 0xFF, 0xFF];
    let err = Decoder::new().decode_data(DataType::FieldList, &content).unwrap_err();
    assert!(matches!(err, CodecError::Truncated { .. }));
}

#[test]
fn test_empty_container_content_is_no_data() {
    let decoder = Decoder::new();
    assert_eq!(decoder.decode_data(DataType::FieldList, &[]).unwrap(), Data::NoData);
    assert_eq!(decoder.decode_data(DataType::Map, &[]).unwrap(), Data::NoData);
    assert_eq!(
        decoder.decode_data(DataType::AsciiString, &[]).unwrap(),
        Data::Blank(DataType::AsciiString)
    );
}
