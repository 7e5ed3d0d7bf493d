#![allow(clippy::let_and_return, clippy::let_unit_value)]


use criterion::criterion_group;
use criterion::criterion_main;


criterion_group!(benches, symbolize::benchmark);
criterion_main!(benches);
