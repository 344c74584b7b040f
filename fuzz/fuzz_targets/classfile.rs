#![no_main]

use classweave::{transform::ClassTransform, Container};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(container) = Container::parse(data) {
        let _ = classweave::build(&container, &ClassTransform::identity());
    }
});
