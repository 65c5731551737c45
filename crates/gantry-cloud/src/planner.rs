//! Dependency planner
//!
//! Orders descriptors into ranked batches with Kahn's algorithm. Nodes of
//! equal rank are ordered by id so plans and logs are reproducible.

use crate::error::{CloudError, Result};
use crate::ledger::{ExecutionState, LedgerRecord};
use gantry_core::ResourceDescriptor;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// What the executor does with a plan entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanAction {
    /// Issue the create call
    Create,
    /// Resource exists with an older spec; issue the update call
    Update,
    /// A previous run left the entry in flight with the same spec; observe,
    /// create if it never landed, then poll
    Resume,
}

impl std::fmt::Display for PlanAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanAction::Create => write!(f, "create"),
            PlanAction::Update => write!(f, "update"),
            PlanAction::Resume => write!(f, "resume"),
        }
    }
}

/// A descriptor scheduled for execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanEntry {
    pub descriptor: ResourceDescriptor,
    /// Topological rank in the full descriptor graph
    pub rank: usize,
    pub action: PlanAction,
}

impl PlanEntry {
    pub fn id(&self) -> &str {
        &self.descriptor.id
    }
}

/// Entries with no dependency edges among them
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub index: usize,
    /// Sorted by id
    pub entries: Vec<PlanEntry>,
}

/// Ordered execution plan
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Plan {
    pub batches: Vec<Batch>,

    /// Ready in the ledger with an unchanged spec; not scheduled
    pub unchanged: Vec<String>,

    /// In the ledger but no longer declared
    pub orphaned: Vec<String>,
}

impl Plan {
    pub fn entries(&self) -> impl Iterator<Item = &PlanEntry> {
        self.batches.iter().flat_map(|b| b.entries.iter())
    }

    pub fn has_changes(&self) -> bool {
        !self.batches.is_empty()
    }

    pub fn batch_ids(&self) -> Vec<Vec<String>> {
        self.batches
            .iter()
            .map(|b| b.entries.iter().map(|e| e.descriptor.id.clone()).collect())
            .collect()
    }

    fn count(&self, action: PlanAction) -> usize {
        self.entries().filter(|e| e.action == action).count()
    }

    /// Summary of the plan
    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            create: self.count(PlanAction::Create),
            update: self.count(PlanAction::Update),
            resume: self.count(PlanAction::Resume),
            unchanged: self.unchanged.len(),
            orphaned: self.orphaned.len(),
        }
    }
}

/// Summary of planned actions
#[derive(Debug, Clone)]
pub struct PlanSummary {
    pub create: usize,
    pub update: usize,
    pub resume: usize,
    pub unchanged: usize,
    pub orphaned: usize,
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to create, {} to update, {} to resume, {} unchanged, {} orphaned",
            self.create, self.update, self.resume, self.unchanged, self.orphaned
        )
    }
}

/// Compute the plan for `descriptors` given what the ledger already records
///
/// Fails before any side effect on duplicate ids, undeclared dependencies or
/// a dependency cycle.
pub fn plan(descriptors: &[ResourceDescriptor], prior: &[LedgerRecord]) -> Result<Plan> {
    let mut by_id: BTreeMap<&str, &ResourceDescriptor> = BTreeMap::new();
    for descriptor in descriptors {
        if by_id.insert(descriptor.id.as_str(), descriptor).is_some() {
            return Err(CloudError::DuplicateId(descriptor.id.clone()));
        }
    }

    for descriptor in descriptors {
        if let Some(missing) = descriptor
            .depends_on
            .iter()
            .find(|dep| !by_id.contains_key(dep.as_str()))
        {
            return Err(CloudError::UnknownDependency {
                id: descriptor.id.clone(),
                dependency: missing.clone(),
            });
        }
    }

    let full_graph: BTreeMap<&str, Vec<&str>> = by_id
        .iter()
        .map(|(id, d)| (*id, d.depends_on.iter().map(String::as_str).collect()))
        .collect();
    let full_layers = layers(&full_graph)?;
    let ranks: BTreeMap<&str, usize> = full_layers
        .iter()
        .enumerate()
        .flat_map(|(rank, layer)| layer.iter().map(move |id| (*id, rank)))
        .collect();

    let records: BTreeMap<&str, &LedgerRecord> =
        prior.iter().map(|r| (r.id.as_str(), r)).collect();

    let mut unchanged = Vec::new();
    let mut actions: BTreeMap<&str, PlanAction> = BTreeMap::new();
    for (id, descriptor) in &by_id {
        match decide(descriptor, records.get(id).copied()) {
            Some(action) => {
                actions.insert(*id, action);
            }
            None => unchanged.push(id.to_string()),
        }
    }

    // Ready resources drop out; edges onto them are already satisfied
    let scheduled: BTreeMap<&str, Vec<&str>> = full_graph
        .iter()
        .filter(|(id, _)| actions.contains_key(*id))
        .map(|(id, deps)| {
            let deps = deps
                .iter()
                .copied()
                .filter(|dep| actions.contains_key(dep))
                .collect();
            (*id, deps)
        })
        .collect();

    let batches = layers(&scheduled)?
        .into_iter()
        .enumerate()
        .map(|(index, layer)| Batch {
            index,
            entries: layer
                .into_iter()
                .map(|id| PlanEntry {
                    descriptor: by_id[id].clone(),
                    rank: ranks[id],
                    action: actions[id],
                })
                .collect(),
        })
        .collect();

    let orphaned = prior
        .iter()
        .filter(|r| !by_id.contains_key(r.id.as_str()))
        .map(|r| r.id.clone())
        .collect();

    Ok(Plan {
        batches,
        unchanged,
        orphaned,
    })
}

/// Action for one descriptor, or `None` when it is already converged
fn decide(descriptor: &ResourceDescriptor, record: Option<&LedgerRecord>) -> Option<PlanAction> {
    let Some(record) = record else {
        return Some(PlanAction::Create);
    };

    let existed = record.applied_spec.is_some();
    match record.state {
        ExecutionState::Ready if record.applied_spec.as_ref() == Some(&descriptor.spec) => None,
        ExecutionState::Ready => Some(PlanAction::Update),
        ExecutionState::InProgress
            if record.spec == descriptor.spec
                && record
                    .applied_spec
                    .as_ref()
                    .is_none_or(|applied| applied == &descriptor.spec) =>
        {
            Some(PlanAction::Resume)
        }
        // An earlier submission may have reached the provider with another spec
        ExecutionState::InProgress => Some(PlanAction::Update),
        _ if existed => Some(PlanAction::Update),
        _ => Some(PlanAction::Create),
    }
}

/// Kahn's algorithm producing rank layers
///
/// `graph` maps each node to the nodes it depends on; every dependency must
/// itself be a key.
fn layers<'a>(graph: &BTreeMap<&'a str, Vec<&'a str>>) -> Result<Vec<Vec<&'a str>>> {
    let mut in_degree: BTreeMap<&'a str, usize> = BTreeMap::new();
    let mut dependents: BTreeMap<&'a str, Vec<&'a str>> = BTreeMap::new();
    for (id, deps) in graph {
        in_degree.insert(*id, deps.len());
        for dep in deps {
            dependents.entry(*dep).or_default().push(*id);
        }
    }

    let mut current: BTreeSet<&'a str> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(id, _)| *id)
        .collect();

    let mut result = Vec::new();
    let mut visited = 0;
    while !current.is_empty() {
        let mut next = BTreeSet::new();
        for id in &current {
            for dependent in dependents.get(id).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(*dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        next.insert(*dependent);
                    }
                }
            }
        }
        visited += current.len();
        result.push(current.into_iter().collect());
        current = next;
    }

    if visited != graph.len() {
        let remaining: BTreeSet<&str> = in_degree
            .iter()
            .filter(|(_, degree)| **degree > 0)
            .map(|(id, _)| *id)
            .collect();
        return Err(CloudError::CycleDetected(cycle_members(graph, remaining)));
    }

    Ok(result)
}

/// Narrow the nodes Kahn could not visit down to those on a cycle
///
/// Nodes merely downstream of a cycle are peeled off by repeatedly removing
/// nodes that nothing left in the set depends on.
fn cycle_members(graph: &BTreeMap<&str, Vec<&str>>, mut remaining: BTreeSet<&str>) -> Vec<String> {
    loop {
        let needed: BTreeSet<&str> = remaining
            .iter()
            .flat_map(|id| graph[id].iter().copied())
            .filter(|dep| remaining.contains(dep))
            .collect();
        let before = remaining.len();
        remaining.retain(|id| needed.contains(id));
        if remaining.len() == before {
            break;
        }
    }
    remaining.into_iter().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::{NetworkSpec, ResourceSpec};

    fn node(id: &str, deps: &[&str]) -> ResourceDescriptor {
        ResourceDescriptor::new(
            id,
            ResourceSpec::Network(NetworkSpec {
                name: id.to_string(),
                auto_subnets: false,
                routing_mode: None,
            }),
        )
        .depends_on(deps.iter().copied())
    }

    fn ready(descriptor: &ResourceDescriptor, rank: usize) -> LedgerRecord {
        LedgerRecord::new(descriptor, rank, descriptor.id.clone()).with_state(ExecutionState::Ready)
    }

    #[test]
    fn test_network_subnet_cluster_are_singleton_batches() {
        let descriptors = vec![
            node("cluster", &["subnet"]),
            node("network", &[]),
            node("subnet", &["network"]),
        ];

        let plan = plan(&descriptors, &[]).unwrap();
        assert_eq!(
            plan.batch_ids(),
            vec![vec!["network"], vec!["subnet"], vec!["cluster"]]
        );
        assert!(plan.entries().all(|e| e.action == PlanAction::Create));
    }

    #[test]
    fn test_independent_nodes_share_a_batch_sorted_by_id() {
        let descriptors = vec![
            node("zeta", &[]),
            node("alpha", &[]),
            node("mid", &["zeta", "alpha"]),
            node("beta", &["alpha"]),
        ];

        let plan = plan(&descriptors, &[]).unwrap();
        assert_eq!(
            plan.batch_ids(),
            vec![vec!["alpha", "zeta"], vec!["beta", "mid"]]
        );
    }

    #[test]
    fn test_every_dependency_lands_in_an_earlier_batch() {
        let descriptors = vec![
            node("a", &[]),
            node("b", &["a"]),
            node("c", &["a"]),
            node("d", &["b", "c"]),
            node("e", &["d", "a"]),
            node("f", &[]),
            node("g", &["f", "c"]),
        ];

        let plan = plan(&descriptors, &[]).unwrap();
        let batch_of: BTreeMap<String, usize> = plan
            .batches
            .iter()
            .flat_map(|b| b.entries.iter().map(move |e| (e.descriptor.id.clone(), b.index)))
            .collect();
        assert_eq!(batch_of.len(), descriptors.len());
        for d in &descriptors {
            for dep in &d.depends_on {
                assert!(batch_of[dep] < batch_of[&d.id], "{} before {}", dep, d.id);
            }
        }
    }

    #[test]
    fn test_cycle_is_detected() {
        let descriptors = vec![
            node("a", &["c"]),
            node("b", &["a"]),
            node("c", &["b"]),
            node("downstream", &["c"]),
            node("root", &[]),
        ];

        match plan(&descriptors, &[]) {
            Err(CloudError::CycleDetected(ids)) => assert_eq!(ids, vec!["a", "b", "c"]),
            other => panic!("Expected CycleDetected, got {:?}", other),
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let descriptors = vec![node("a", &["a"])];
        assert!(matches!(
            plan(&descriptors, &[]),
            Err(CloudError::CycleDetected(ids)) if ids == vec!["a".to_string()]
        ));
    }

    #[test]
    fn test_unknown_dependency() {
        let descriptors = vec![node("subnet", &["network"])];
        assert!(matches!(
            plan(&descriptors, &[]),
            Err(CloudError::UnknownDependency { .. })
        ));
    }

    #[test]
    fn test_duplicate_id() {
        let descriptors = vec![node("a", &[]), node("a", &[])];
        assert!(matches!(
            plan(&descriptors, &[]),
            Err(CloudError::DuplicateId(id)) if id == "a"
        ));
    }

    #[test]
    fn test_ready_and_unchanged_is_excluded() {
        let network = node("network", &[]);
        let subnet = node("subnet", &["network"]);
        let prior = vec![ready(&network, 0)];

        let plan = plan(&[network, subnet], &prior).unwrap();
        assert_eq!(plan.unchanged, vec!["network"]);
        assert_eq!(plan.batch_ids(), vec![vec!["subnet"]]);
        // ランクは全体グラフでの位置のまま
        assert_eq!(plan.batches[0].entries[0].rank, 1);
    }

    #[test]
    fn test_everything_ready_gives_empty_plan() {
        let network = node("network", &[]);
        let subnet = node("subnet", &["network"]);
        let prior = vec![ready(&network, 0), ready(&subnet, 1)];

        let plan = plan(&[network, subnet], &prior).unwrap();
        assert!(!plan.has_changes());
        assert_eq!(plan.unchanged.len(), 2);
    }

    #[test]
    fn test_changed_spec_is_update() {
        let network = node("network", &[]);
        let prior = vec![ready(&network, 0)];

        let mut changed = network.clone();
        if let ResourceSpec::Network(spec) = &mut changed.spec {
            spec.routing_mode = Some("GLOBAL".to_string());
        }

        let plan = plan(&[changed], &prior).unwrap();
        assert_eq!(plan.entries().next().unwrap().action, PlanAction::Update);
    }

    #[test]
    fn test_in_progress_is_resumed() {
        let network = node("network", &[]);
        let prior = vec![
            LedgerRecord::new(&network, 0, "network").with_state(ExecutionState::InProgress),
        ];

        let plan = plan(&[network], &prior).unwrap();
        assert_eq!(plan.entries().next().unwrap().action, PlanAction::Resume);
    }

    #[test]
    fn test_in_progress_with_changed_spec_is_update() {
        let network = node("network", &[]);
        let prior = vec![
            LedgerRecord::new(&network, 0, "network").with_state(ExecutionState::InProgress),
        ];

        let mut changed = network.clone();
        if let ResourceSpec::Network(spec) = &mut changed.spec {
            spec.routing_mode = Some("GLOBAL".to_string());
        }

        let plan = plan(&[changed], &prior).unwrap();
        assert_eq!(plan.entries().next().unwrap().action, PlanAction::Update);
    }

    #[test]
    fn test_in_progress_update_not_yet_confirmed_is_reissued() {
        let network = node("network", &[]);
        let mut changed = network.clone();
        if let ResourceSpec::Network(spec) = &mut changed.spec {
            spec.routing_mode = Some("GLOBAL".to_string());
        }

        // Ready at the old spec, then an update to the new spec was cut short
        let mut record = ready(&network, 0);
        record.spec = changed.spec.clone();
        record.state = ExecutionState::InProgress;

        let plan = plan(&[changed], &[record]).unwrap();
        assert_eq!(plan.entries().next().unwrap().action, PlanAction::Update);
    }

    #[test]
    fn test_failed_is_recreated() {
        let network = node("network", &[]);
        let prior =
            vec![LedgerRecord::new(&network, 0, "network").with_state(ExecutionState::Failed)];

        let plan = plan(&[network], &prior).unwrap();
        assert_eq!(plan.entries().next().unwrap().action, PlanAction::Create);
    }

    #[test]
    fn test_orphans_are_reported() {
        let network = node("network", &[]);
        let old = node("legacy-bucket", &[]);
        let prior = vec![ready(&old, 0)];

        let plan = plan(&[network], &prior).unwrap();
        assert_eq!(plan.orphaned, vec!["legacy-bucket"]);
        assert_eq!(
            plan.summary().to_string(),
            "1 to create, 0 to update, 0 to resume, 0 unchanged, 1 orphaned"
        );
    }
}
