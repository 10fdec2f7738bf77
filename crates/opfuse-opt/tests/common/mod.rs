use opfuse_ir::{Graph, parse_graph};
use opfuse_opt::{FusionReport, PassManager};

/// A small network touching every built-in rule.
#[allow(dead_code)]
pub const MODEL: &str = "\
graph model
node in Data dtype=f16 format=nc1hwc0 shape=1,4,56,56,16
node conv1 Conv2D dtype=f16 format=nc1hwc0 shape=1,4,56,56,16
node dq1 AscendDequant
node relu1 Relu
node q1 AscendQuant
node conv2 Conv2D
node add2 Add
node mm MatMul
node bias Add
node v1 Mul exec_unit=vector shape=8,16
node v2 Add exec_unit=vector shape=8,16
node red ReduceSum exec_unit=vector shape=8
node out NetOutput
edge in -> conv1
edge conv1 -> dq1
edge dq1 -> relu1
edge relu1 -> q1
edge q1 -> conv2
edge conv2 -> add2
edge add2 -> mm
edge mm -> bias
edge bias -> v1
edge v1 -> v2
edge v2 -> red
edge red -> out
";

#[allow(dead_code)]
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Parse a graph and run the built-in rules over it.
#[allow(dead_code)]
pub fn fuse_text(source: &str) -> (Graph, FusionReport) {
    init_logger();
    let mut graph = parse_graph(source).expect("graph parse failed");
    let report = PassManager::with_builtins()
        .expect("built-in rules failed to register")
        .run(&mut graph)
        .expect("fusion failed");
    (graph, report)
}

/// Member names of every group of `family`, by group id.
#[allow(dead_code)]
pub fn groups(graph: &Graph, family: &str) -> Vec<Vec<String>> {
    graph
        .groups(family)
        .into_values()
        .map(|members| {
            members
                .into_iter()
                .map(|h| graph.node(h).name.clone())
                .collect()
        })
        .collect()
}
