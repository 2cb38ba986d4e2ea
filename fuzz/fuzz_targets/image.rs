#![no_main]

use cilmixin::{
    assembly::{decode, Labels, RawTokens},
    metadata::module::Module,
};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = Module::from_mem(data);

    let mut labels = Labels::default();
    let _ = decode(data, 256, &RawTokens, &mut labels);
});
