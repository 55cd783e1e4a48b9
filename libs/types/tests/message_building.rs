//! Building realistic consumer and provider messages through the public API

use types::rdm::{batch, directory, view};
use types::{
    Data, DataType, DomainType, FieldList, Map, MapAction, Msg, RealHint, RefreshMsg, ReqMsg,
    State, StatusCode, StreamState, UpdateMsg, ValidationError,
};

fn quote(bid: i64, ask: i64) -> FieldList {
    let mut fields = FieldList::new();
    fields
        .add_real(22, bid, RealHint::ExponentNeg2)
        .unwrap()
        .add_real(25, ask, RealHint::ExponentNeg2)
        .unwrap();
    fields.complete().unwrap();
    fields
}

#[test]
fn market_price_refresh_carries_state_and_payload() {
    let refresh = RefreshMsg::new()
        .name("IBM.N")
        .service_name("DIRECT_FEED")
        .state(State::open_ok("Refresh Completed"))
        .payload(quote(3990, 3994));

    let msg = Msg::from(refresh);
    assert_eq!(msg.name(), Some("IBM.N"));
    assert_eq!(msg.state().map(|s| s.stream_state), Some(StreamState::Open));
    assert_eq!(msg.payload().entry_count(), 2);
    assert!(msg.validate_complete().is_ok());
}

#[test]
fn market_by_order_map_preserves_actions() {
    let mut orders = Map::new();
    orders
        .add_entry("100", MapAction::Add, quote(1, 2))
        .unwrap()
        .add_entry("101", MapAction::Update, quote(3, 4))
        .unwrap()
        .delete("100")
        .unwrap();
    orders.complete().unwrap();

    let update = UpdateMsg::new()
        .domain(DomainType::MARKET_BY_ORDER)
        .name("AAO.V")
        .payload(orders);
    let map = update.payload.as_map().unwrap();
    assert_eq!(map.key_type(), DataType::AsciiString);
    assert_eq!(
        map.entries().iter().map(|e| e.action).collect::<Vec<_>>(),
        vec![MapAction::Add, MapAction::Update, MapAction::Delete]
    );
}

#[test]
fn batch_with_view_builds_a_single_payload() {
    let request = ReqMsg::new()
        .service_name("DIRECT_FEED")
        .batch_names(["IBM.N", "MSFT.O", "GOOG.O"])
        .unwrap()
        .view_fields(&[22, 25])
        .unwrap();

    assert!(request.has_batch && request.has_view);
    assert_eq!(batch::item_names(&request.payload).map(|n| n.len()), Some(3));
    assert_eq!(view::field_ids(&request.payload), Some(vec![22, 25]));
}

#[test]
fn completing_twice_is_a_usage_error() {
    let mut fields = quote(1, 2);
    assert_eq!(
        fields.complete().unwrap_err(),
        ValidationError::AlreadyCompleted { container: "FieldList" }
    );
    assert_eq!(
        FieldList::new().complete().unwrap_err(),
        ValidationError::EmptyContainer { container: "FieldList" }
    );
}

#[test]
fn custom_domains_are_accepted_up_to_255() {
    let request = ReqMsg::new().domain_type(200).unwrap();
    assert!(request.domain.is_custom());
    assert_eq!(
        ReqMsg::new().domain_type(256).unwrap_err(),
        ValidationError::DomainTypeOutOfRange { value: 256 }
    );
}

#[test]
fn closed_status_text_is_kept() {
    let state = State::closed(StatusCode::NOT_FOUND, "Item not found");
    assert!(state.is_final());
    assert_eq!(directory::filter_mask::INFO_STATE, 0x03);
    assert_eq!(Data::State(state.clone()).data_type(), DataType::State);
}
