#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(source) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(mut graph) = opfuse_ir::parse_graph(source) else {
        return;
    };
    // Cyclic inputs are rejected with an error.
    let Ok(report) = opfuse_opt::fuse(&mut graph) else {
        return;
    };
    for family in report.by_family().keys() {
        // Committed groups never close a cycle when contracted. Merging can
        // still fail on a fused name colliding with an existing node.
        if let Ok(merged) = opfuse_opt::merge_groups(&graph, family, &report.groups) {
            assert!(merged.topological_order().is_ok());
        }
    }
});
