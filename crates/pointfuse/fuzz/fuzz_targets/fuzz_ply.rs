#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Parsing must never panic, whatever the input.
    let Ok(points) = pointfuse::read_ply(data, "fuzz.ply") else {
        return;
    };

    // Anything accepted must survive a store and reload with the same count.
    let mut buffer = Vec::new();
    if pointfuse::write_ply(&points, &mut buffer).is_ok() {
        let reloaded = pointfuse::read_ply(buffer.as_slice(), "fuzz.ply");
        assert_eq!(reloaded.map(|p| p.len()).ok(), Some(points.len()));
    }
});
