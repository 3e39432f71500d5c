#![no_main]

use libfuzzer_sys::fuzz_target;
use ssh_encoding::Decode;
use ssh_keyhold::proto::Request;

fuzz_target!(|data: &[u8]| {
    let mut data = data;
    let _ = Request::decode(&mut data);
});
