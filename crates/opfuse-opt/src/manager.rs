//! Ordered rule registry and the top-level fusion driver.

use std::collections::BTreeMap;
use std::fmt;

use opfuse_analysis::CategoryRegistry;
use opfuse_ir::Graph;

use crate::error::FusionError;
use crate::rule::{ExecUnit, FusionRule, RegisteredRule};
use crate::rules::builtin_rules;
use crate::runner::{FusionConfig, FusionPassRunner, GroupRecord, PassContext};
use crate::validation::validate_partition;

/// Runs registered rules in priority order over a graph.
#[derive(Debug, Default)]
pub struct PassManager {
    rules: Vec<RegisteredRule>,
    registry: CategoryRegistry,
    config: FusionConfig,
}

impl PassManager {
    /// Creates a manager with no rules and an empty category registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a manager with the built-in rules and operator categories.
    pub fn with_builtins() -> Result<Self, FusionError> {
        let mut pm = Self {
            registry: CategoryRegistry::with_builtins(),
            ..Self::default()
        };
        for rule in builtin_rules() {
            pm.register(rule)?;
        }
        Ok(pm)
    }

    pub fn with_config(mut self, config: FusionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut FusionConfig {
        &mut self.config
    }

    pub fn registry(&self) -> &CategoryRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut CategoryRegistry {
        &mut self.registry
    }

    /// Adds a rule. Rules run by ascending priority; equal priorities keep
    /// registration order.
    pub fn register(&mut self, rule: Box<dyn FusionRule>) -> Result<(), FusionError> {
        if self.rules.iter().any(|r| r.rule().name() == rule.name()) {
            return Err(FusionError::DuplicateRule(rule.name().to_string()));
        }
        let registered = RegisteredRule::new(rule)?;
        let priority = registered.rule().priority();
        let at = self
            .rules
            .partition_point(|r| r.rule().priority() <= priority);
        log::debug!(
            "registered rule '{}' (priority {priority}, {} pattern(s))",
            registered.rule().name(),
            registered.patterns().len()
        );
        self.rules.insert(at, registered);
        Ok(())
    }

    /// Rule names in run order.
    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.rule().name()).collect()
    }

    /// Runs every enabled rule, AI core rules first, then vector core rules.
    pub fn run(&self, graph: &mut Graph) -> Result<FusionReport, FusionError> {
        let runner = FusionPassRunner;
        let mut ctx = PassContext::new(graph, self.config.clone(), &self.registry);

        for unit in ExecUnit::ALL {
            for rule in self.rules.iter().filter(|r| r.rule().unit() == unit) {
                if !self.config.is_enabled(rule.rule().name(), rule.rule().family()) {
                    log::debug!("skipping disabled rule '{}'", rule.rule().name());
                    continue;
                }
                runner.run(graph, rule, &mut ctx)?;
            }
        }

        let groups = ctx.into_records();
        validate_partition(graph, &groups)?;
        log::info!(
            "graph '{}': {} fusion group(s) committed",
            graph.name,
            groups.len()
        );
        Ok(FusionReport {
            graph: graph.name.clone(),
            groups,
        })
    }
}

/// Runs the built-in rules with the default configuration.
pub fn fuse(graph: &mut Graph) -> Result<FusionReport, FusionError> {
    PassManager::with_builtins()?.run(graph)
}

/// Groups committed by one [`PassManager::run`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FusionReport {
    pub graph: String,
    /// Records in commit order.
    pub groups: Vec<GroupRecord>,
}

impl FusionReport {
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Records grouped by family.
    pub fn by_family(&self) -> BTreeMap<&str, Vec<&GroupRecord>> {
        let mut map: BTreeMap<&str, Vec<&GroupRecord>> = BTreeMap::new();
        for record in &self.groups {
            map.entry(record.family.as_str()).or_default().push(record);
        }
        map
    }

    pub fn groups_for<'a>(&'a self, family: &'a str) -> impl Iterator<Item = &'a GroupRecord> {
        self.groups.iter().filter(move |r| r.family == family)
    }
}

impl fmt::Display for FusionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "graph {}: {} group(s)", self.graph, self.groups.len())?;
        for (family, records) in self.by_family() {
            writeln!(f, "family {family}:")?;
            for r in records {
                writeln!(
                    f,
                    "  {} [{}/{}, {} of {}]: {}",
                    r.id,
                    r.rule,
                    r.pattern,
                    r.nodes.len(),
                    r.mapping_size,
                    r.node_names.join(" ")
                )?;
            }
        }
        Ok(())
    }
}
