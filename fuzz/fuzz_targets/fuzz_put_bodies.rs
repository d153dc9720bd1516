//! Fuzz target: inbound `PUT` body parsers
//!
//! Feeds arbitrary bytes to every body parser a device exposes and checks
//! that accepted values respect the documented ranges.
//!
//! cargo fuzz run fuzz_put_bodies

#![no_main]

use libfuzzer_sys::fuzz_target;
use sparkgrid::rpc::resources::{parse_max_power, parse_settings, parse_status};

fuzz_target!(|data: &[u8]| {
    let _ = parse_status(data);

    if let Ok(max_power) = parse_max_power(data) {
        assert!(max_power >= 1, "max_power accepted below 1 W");
    }

    if let Ok(delta) = parse_settings(data) {
        for v in [delta.ia, delta.ib, delta.ic, delta.va, delta.vb, delta.vc]
            .into_iter()
            .flatten()
        {
            assert!(v.is_finite(), "non-finite phase offset accepted");
        }
    }
});
