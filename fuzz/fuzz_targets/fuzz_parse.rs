#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(source) = std::str::from_utf8(data) {
        // Malformed input must come back as an error, never a panic, and
        // anything accepted must dump to text that parses again.
        if let Ok(graph) = opfuse_ir::parse_graph(source) {
            let dumped = opfuse_ir::dump_graph(&graph);
            let reparsed = opfuse_ir::parse_graph(&dumped);
            assert!(reparsed.is_ok(), "dump does not parse back: {reparsed:?}\n{dumped}");
            if let Ok(reparsed) = reparsed {
                assert_eq!(opfuse_ir::dump_graph(&reparsed), dumped);
            }
        }
    }
});
