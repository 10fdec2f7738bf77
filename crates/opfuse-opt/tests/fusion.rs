mod common;

use std::collections::BTreeSet;

use common::{MODEL, fuse_text, groups};
use opfuse_analysis::{
    BranchMode, Category, CategorySet, Mapping, Pattern, PatternBuilder, PatternError,
};
use opfuse_ir::{Graph, GroupId, parse_graph};
use opfuse_opt::{
    FusionConfig, FusionError, FusionRule, PassManager, Refinement, fuse, merge_groups,
    validate_partition,
};

#[test]
fn example_scenario_fuses_whole_chain() {
    let (graph, report) = fuse_text(
        "node conv Conv2D\n\
         node dequant AscendDequant\n\
         node add Add\n\
         node quant AscendQuant\n\
         node stridedwrite StridedWrite\n\
         edge conv -> dequant\n\
         edge dequant -> add\n\
         edge add -> quant\n\
         edge quant -> stridedwrite",
    );
    assert_eq!(report.len(), 1);
    assert_eq!(report.groups[0].rule, "conv_quant_chain");
    assert_eq!(report.groups[0].mapping_size, 5);
    assert_eq!(
        groups(&graph, "ub"),
        vec![vec!["conv", "dequant", "add", "quant", "stridedwrite"]]
    );

    let merged = merge_groups(&graph, "ub", &report.groups).unwrap();
    assert_eq!(merged.len(), 1);
    assert!(merged.find("convdequantaddquantstridedwrite").is_some());
}

#[test]
fn blocked_fusion_stops_at_add() {
    // `side` reads add and feeds quant: contracting add and quant together
    // would route a path out of the group and back in.
    let (graph, report) = fuse_text(
        "node conv Conv2D\n\
         node dequant AscendDequant\n\
         node add Add\n\
         node quant AscendQuant\n\
         node stridedwrite StridedWrite\n\
         node side Transpose\n\
         edge conv -> dequant\n\
         edge dequant -> add\n\
         edge add -> quant\n\
         edge add -> side\n\
         edge side -> quant\n\
         edge quant -> stridedwrite",
    );
    assert_eq!(groups(&graph, "ub"), vec![vec!["conv", "dequant", "add"]]);
    let quant = graph.find("quant").unwrap();
    assert_eq!(graph.node(quant).group("ub"), None);
    assert!(report.groups.iter().all(|g| g.nodes.len() < 5));

    let merged = merge_groups(&graph, "ub", &report.groups).unwrap();
    assert!(merged.topological_order().is_ok());
}

#[test]
fn fallback_on_cycle_through_control_edge() {
    let (graph, report) = fuse_text(
        "node conv Conv2D\n\
         node dq AscendDequant\n\
         node add Add\n\
         node quant AscendQuant\n\
         node y Transpose\n\
         edge conv -> dq\n\
         edge dq -> add\n\
         edge add -> quant\n\
         edge y -> quant\n\
         ctrl dq -> y",
    );
    assert_eq!(report.len(), 1);
    assert_eq!(report.groups[0].node_names, ["conv", "dq", "add"]);
    assert_eq!(report.groups[0].mapping_size, 3);
    assert!(merge_groups(&graph, "ub", &report.groups).is_ok());
}

#[test]
fn longest_match_wins() {
    let (graph, report) = fuse_text(
        "node conv Conv2D\n\
         node e1 Relu\n\
         node e2 Add\n\
         node e3 Mul\n\
         node e4 Cast\n\
         node out NetOutput\n\
         edge conv -> e1\n\
         edge e1 -> e2\n\
         edge e2 -> e3\n\
         edge e3 -> e4\n\
         edge e4 -> out",
    );
    assert_eq!(report.len(), 1);
    assert_eq!(groups(&graph, "ub"), vec![vec!["conv", "e1", "e2", "e3", "e4"]]);
}

#[test]
fn control_edge_inside_group_is_tolerated() {
    let (graph, report) = fuse_text(
        "node conv Conv2D\n\
         node dq AscendDequant\n\
         node add Add\n\
         node out NetOutput\n\
         edge conv -> dq\n\
         edge dq -> add\n\
         edge add -> out\n\
         ctrl conv -> add\n\
         ctrl conv -> dq",
    );
    assert_eq!(report.len(), 1);
    assert_eq!(report.groups[0].node_names, ["conv", "dq", "add"]);

    let merged = merge_groups(&graph, "ub", &report.groups).unwrap();
    let fused = merged.find("convdqadd").unwrap();
    assert!(merged.node(fused).control_successors().is_empty());
    assert!(merged.node(fused).control_predecessors().is_empty());
}

#[test]
fn mixed_model_groups() {
    let (graph, report) = fuse_text(MODEL);
    let rules: Vec<&str> = report.groups.iter().map(|g| g.rule.as_str()).collect();
    assert_eq!(
        rules,
        ["conv_quant_chain", "conv_quant_chain", "matmul_epilogue", "elemwise_reduce"]
    );
    assert_eq!(
        groups(&graph, "ub"),
        vec![
            vec!["conv1", "dq1", "relu1", "q1"],
            vec!["conv2", "add2"],
            vec!["mm", "bias"],
            vec!["v1", "v2", "red"],
        ]
    );

    let merged = merge_groups(&graph, "ub", &report.groups).unwrap();
    assert_eq!(merged.len(), 6);
    let order: Vec<String> = merged
        .topological_order()
        .unwrap()
        .into_iter()
        .map(|h| merged.node(h).name.clone())
        .collect();
    assert_eq!(
        order,
        ["in", "conv1dq1relu1q1", "conv2add2", "mmbias", "v1v2red", "out"]
    );
}

#[test]
fn merged_join_is_named_in_match_order() {
    // The read-select branch is declared first but matched last.
    let (graph, report) = fuse_text(
        "node sel ReadSelect\n\
         node conv Conv2D\n\
         node add Add\n\
         edge conv -> add\n\
         edge sel -> add",
    );
    assert_eq!(report.len(), 1);
    assert_eq!(report.groups[0].rule, "conv_join_read_select");
    assert_eq!(report.groups[0].node_names, ["conv", "add", "sel"]);

    let merged = merge_groups(&graph, "ub", &report.groups).unwrap();
    assert_eq!(merged.len(), 1);
    assert!(merged.find("convaddsel").is_some());
    assert!(merged.find("selconvadd").is_none());
}

#[test]
fn exhausted_group_ids_are_an_error() {
    common::init_logger();
    let mut graph = parse_graph(
        "node x Add group.l2=4294967295\n\
         node conv Conv2D\n\
         node relu Relu\n\
         edge conv -> relu",
    )
    .unwrap();
    let err = fuse(&mut graph).unwrap_err();
    assert!(matches!(err, FusionError::GroupIdsExhausted { .. }));
    assert!(err.to_string().contains("no group id left for family 'ub'"));
}

#[test]
fn runs_are_deterministic() {
    let (first, report1) = fuse_text(MODEL);
    let (second, report2) = fuse_text(MODEL);
    assert_eq!(report1, report2);

    let assignment = |g: &Graph| -> Vec<(String, Option<GroupId>)> {
        g.nodes()
            .map(|(_, n)| (n.name.clone(), n.group("ub")))
            .collect()
    };
    assert_eq!(assignment(&first), assignment(&second));
}

#[test]
fn groups_partition_a_subset_of_nodes() {
    let (graph, report) = fuse_text(MODEL);
    let mut seen = BTreeSet::new();
    for record in &report.groups {
        for &n in &record.nodes {
            assert!(graph.contains(n));
            assert!(seen.insert((record.family.clone(), n)), "node in two groups");
        }
    }
    assert!(seen.len() <= graph.len());
    assert!(validate_partition(&graph, &report.groups).is_ok());
}

#[test]
fn exec_units_do_not_mix() {
    // relu runs on the vector core, so conv has nothing to fuse with, and a
    // lone vector relu is below the minimum group size.
    let (graph, report) = fuse_text(
        "node conv Conv2D\nnode relu Relu exec_unit=vector\nedge conv -> relu",
    );
    assert!(report.is_empty());
    assert!(graph.groups("ub").is_empty());
}

#[test]
fn previous_groups_are_respected() {
    let (graph, report) = fuse_text(
        "node conv Conv2D group.ub=7\n\
         node relu Relu group.ub=7\n\
         node conv2 Conv2D\n\
         node relu2 Relu\n\
         edge conv -> relu\n\
         edge relu -> conv2\n\
         edge conv2 -> relu2",
    );
    assert_eq!(report.len(), 1);
    assert_eq!(report.groups[0].id, GroupId(8));
    assert_eq!(
        groups(&graph, "ub"),
        vec![vec!["conv", "relu"], vec!["conv2", "relu2"]]
    );
}

#[test]
fn family_filter_skips_rules() {
    let mut graph = parse_graph(MODEL).unwrap();
    let config = FusionConfig {
        families: Some(["l2".to_string()].into_iter().collect()),
        ..FusionConfig::default()
    };
    let report = PassManager::with_builtins()
        .unwrap()
        .with_config(config)
        .run(&mut graph)
        .unwrap();
    assert!(report.is_empty());
}

#[derive(Debug)]
struct ConvPair {
    priority: u32,
    family: &'static str,
}

impl FusionRule for ConvPair {
    fn name(&self) -> &str {
        "conv_pair"
    }

    fn family(&self) -> &str {
        self.family
    }

    fn priority(&self) -> u32 {
        self.priority
    }

    fn define_patterns(&self) -> Result<Vec<Pattern>, PatternError> {
        let pattern = PatternBuilder::new("conv_elemwise")
            .add_node("conv", CategorySet::of(&[Category::Conv]), 1, 1)
            .add_node("ew", CategorySet::of(&[Category::Elemwise]), 1, 1)
            .connect("conv", &["ew"], BranchMode::Single, false)
            .set_head(&["conv"])
            .build()?;
        Ok(vec![pattern])
    }

    fn refine(&self, _graph: &Graph, mapping: &Mapping<'_>) -> Refinement {
        Refinement::from_check(self.name(), mapping, Ok(()))
    }
}

const CONV_CHAIN: &str = "node conv Conv2D\n\
                          node relu Relu\n\
                          node sig Sigmoid\n\
                          edge conv -> relu\n\
                          edge relu -> sig";

fn fuse_with(rule: ConvPair) -> (Graph, Vec<(String, Vec<String>)>) {
    common::init_logger();
    let mut graph = parse_graph(CONV_CHAIN).unwrap();
    let mut pm = PassManager::with_builtins().unwrap();
    pm.register(Box::new(rule)).unwrap();
    let report = pm.run(&mut graph).unwrap();
    let summary = report
        .groups
        .into_iter()
        .map(|g| (g.rule, g.node_names))
        .collect();
    (graph, summary)
}

#[test]
fn extension_rule_runs_before_lower_priorities() {
    let (_, summary) = fuse_with(ConvPair {
        priority: 50,
        family: "ub",
    });
    assert_eq!(
        summary,
        vec![("conv_pair".to_string(), vec!["conv".to_string(), "relu".to_string()])]
    );
}

#[test]
fn extension_rule_runs_after_builtins() {
    let (_, summary) = fuse_with(ConvPair {
        priority: 1000,
        family: "ub",
    });
    assert_eq!(summary.len(), 1);
    assert_eq!(summary[0].0, "conv_quant_chain");
    assert_eq!(summary[0].1, ["conv", "relu", "sig"]);
}

#[test]
fn families_are_independent() {
    let (graph, summary) = fuse_with(ConvPair {
        priority: 50,
        family: "l2",
    });
    assert_eq!(summary.len(), 2);
    let conv = graph.find("conv").unwrap();
    assert!(graph.node(conv).group("l2").is_some());
    assert!(graph.node(conv).group("ub").is_some());
    assert_ne!(graph.node(conv).group("l2"), graph.node(conv).group("ub"));
}
