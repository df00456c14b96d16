//! Fuzz target for the vault node wire codec.
//!
//! Arbitrary bytes fed to `read_node` must never panic. Any node that
//! decodes successfully must survive one normalization cycle: its own
//! encoding decodes to an equal node, and that node encodes to the same
//! bytes again.

#![no_main]

use libfuzzer_sys::fuzz_target;

use relto_vault::{read_node, write_node};

fuzz_target!(|data: &[u8]| {
    let Ok(node) = read_node(data) else {
        return;
    };

    let mut encoded = Vec::new();
    write_node(&node, &mut encoded);

    let decoded = read_node(&encoded).expect("own encoding must decode");
    assert_eq!(decoded, node);

    let mut reencoded = Vec::new();
    write_node(&decoded, &mut reencoded);
    assert_eq!(reencoded, encoded);
});
