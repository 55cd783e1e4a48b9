//! Encode/decode throughput for a typical market price update

use codec::{Decoder, Encoder};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use types::{FieldList, Msg, RealHint, UpdateMsg};

fn update() -> Msg {
    let mut fields = FieldList::new();
    fields
        .add_real(22, 3990, RealHint::ExponentNeg2)
        .unwrap()
        .add_real(25, 3994, RealHint::ExponentNeg2)
        .unwrap()
        .add_uint(30, 100)
        .unwrap()
        .add_uint(31, 200)
        .unwrap()
        .add_ascii(3, "IBM")
        .unwrap();
    fields.complete().unwrap();
    UpdateMsg::new().stream_id(5).name("IBM.N").payload(fields).into()
}

fn bench_codec(c: &mut Criterion) {
    let msg = update();
    let encoder = Encoder::new();
    let decoder = Decoder::new();
    let bytes = encoder.encode_msg(&msg).unwrap();

    c.bench_function("encode_update", |b| b.iter(|| encoder.encode_msg(black_box(&msg)).unwrap()));
    c.bench_function("decode_update", |b| b.iter(|| decoder.decode_msg(black_box(&bytes)).unwrap()));
}

criterion_group!(benches, bench_codec);
criterion_main!(benches);
