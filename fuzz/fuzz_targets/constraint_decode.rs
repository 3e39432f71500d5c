#![no_main]

use libfuzzer_sys::fuzz_target;
use ssh_encoding::Decode;
use ssh_keyhold::proto::extension::RestrictDestination;

fuzz_target!(|data: &[u8]| {
    let mut data = data;
    let _ = RestrictDestination::decode(&mut data);
});
