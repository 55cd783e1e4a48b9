//! Property tests: arbitrary field lists survive the wire, and arbitrary
//! bytes never panic the decoder.

use codec::{decode_msg, encode_msg, Decoder};
use proptest::prelude::*;
use types::{Data, DataType, FieldList, Msg, Real, RealHint, UpdateMsg};

fn primitive() -> impl Strategy<Value = Data> {
    prop_oneof![
        any::<i64>().prop_map(Data::Int),
        any::<u64>().prop_map(Data::UInt),
        any::<u16>().prop_map(Data::Enum),
        (any::<i64>(), 0u8..=30).prop_map(|(mantissa, hint)| {
            let hint = RealHint::try_from(hint).unwrap_or(RealHint::Exponent0);
            Data::Real(Real::new(mantissa, hint))
        }),
        "[A-Z0-9.]{1,12}".prop_map(Data::Ascii),
        Just(Data::Blank(DataType::Real)),
    ]
}

proptest! {
    #[test]
    fn field_lists_survive_encoding(
        stream_id in 1i32..100_000,
        entries in prop::collection::vec((1i16..32_000, primitive()), 1..40),
    ) {
        let mut fields = FieldList::new();
        for (fid, data) in entries {
            fields.add_entry(fid, data).unwrap();
        }
        fields.complete().unwrap();
        let msg = Msg::from(UpdateMsg::new().stream_id(stream_id).payload(fields));
        let bytes = encode_msg(&msg).unwrap();
        prop_assert_eq!(decode_msg(&bytes).unwrap(), msg);
    }

    #[test]
    fn arbitrary_bytes_never_panic(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = decode_msg(&bytes);
        let _ = Decoder::new().decode_data(DataType::Map, &bytes);
        let _ = Decoder::new().decode_data(DataType::Series, &bytes);
    }
}
