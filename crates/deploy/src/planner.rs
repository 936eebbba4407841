//! Dependency planning: turns a [`TemplateSpec`] into an ordered [`DeploymentPlan`].
//!
//! Roles are created in a topological order of their constructor references,
//! ties broken by declaration order so identical templates always yield
//! identical plans. Each permission edge is wired right after the later of its
//! two endpoints has been created. Permission edges only place Wire steps and
//! never reorder creation: constructor references and declaration order alone
//! decide when a role is created.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    abi,
    template::{ConstructorParam, PermissionEdge, TemplateSpec},
};

/// Template configuration errors, detected before any network call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    #[error("template declares no role")]
    EmptyTemplate,
    #[error("role '{0}' is declared more than once")]
    DuplicateRole(String),
    #[error("constructor dependency cycle: {}", .0.join(" -> "))]
    Cycle(Vec<String>),
    #[error("primary '{0}' matches no declared role or contract")]
    UnknownPrimary(String),
    #[error("invalid constructor parameter of role '{role}': {reason}")]
    InvalidParam { role: String, reason: String },
}

/// One unit of execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Step {
    /// Deploy the contract of a role.
    Create {
        role: String,
        contract: String,
        params: Vec<ConstructorParam>,
    },
    /// Apply a permission edge.
    Wire(PermissionEdge),
}

impl Step {
    /// Roles whose address this step needs.
    pub fn role_refs(&self) -> Vec<&str> {
        match self {
            Step::Create { params, .. } => params.iter().filter_map(ConstructorParam::role_ref).collect(),
            Step::Wire(edge) => edge.endpoints().to_vec(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Step::Create { .. } => "create",
            Step::Wire(_) => "wire",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Create { role, contract, .. } => write!(f, "create {role} ({contract})"),
            Step::Wire(edge) => write!(f, "wire {edge}"),
        }
    }
}

/// Ordered steps of a template deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentPlan {
    pub template: String,
    /// Role whose address is the result of a successful deployment.
    pub primary: String,
    /// Grant function called on the grantor of each wired edge.
    pub permission_fn: String,
    pub steps: Vec<Step>,
    /// Roles referenced but not declared; they must resolve through the registry.
    pub external_roles: Vec<String>,
}

impl DeploymentPlan {
    /// Index of the first step needing `role`'s address.
    pub fn first_step_referencing(&self, role: &str) -> Option<usize> {
        self.steps
            .iter()
            .position(|step| step.role_refs().contains(&role))
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Plan a template, reporting the template's declared primary role (or the
/// last created role when none is declared).
pub fn plan(spec: &TemplateSpec) -> Result<DeploymentPlan, PlanError> {
    plan_for_target(spec, None)
}

/// Plan a template whose primary is `target`, a role or contract name.
pub fn plan_for_target(spec: &TemplateSpec, target: Option<&str>) -> Result<DeploymentPlan, PlanError> {
    if spec.roles.is_empty() {
        return Err(PlanError::EmptyTemplate);
    }

    let mut index: HashMap<&str, usize> = HashMap::with_capacity(spec.roles.len());
    for (i, role) in spec.roles.iter().enumerate() {
        if index.insert(role.name.as_str(), i).is_some() {
            return Err(PlanError::DuplicateRole(role.name.clone()));
        }
        validate_params(&role.name, &role.params)?;
    }

    let mut external_roles: Vec<String> = Vec::new();
    let mut note_external = |name: &str| {
        if !index.contains_key(name) && !external_roles.iter().any(|r| r == name) {
            external_roles.push(name.to_string());
        }
    };

    // deps[i]: declared roles that must exist before role i is created.
    let mut deps: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); spec.roles.len()];
    for (i, role) in spec.roles.iter().enumerate() {
        for reference in role.param_refs() {
            match index.get(reference) {
                Some(&j) => {
                    deps[i].insert(j);
                }
                None => note_external(reference),
            }
        }
    }

    let edges = collect_edges(spec);
    for edge in &edges {
        for endpoint in edge.endpoints() {
            note_external(endpoint);
        }
    }

    let order = creation_order(spec, &deps)?;

    let mut position = vec![0usize; spec.roles.len()];
    for (k, &role) in order.iter().enumerate() {
        position[role] = k;
    }

    // wires_after[k]: edges completed by the k-th creation. Every edge touches
    // the role declaring it, so at least one endpoint has a position.
    let mut wires_after: Vec<Vec<PermissionEdge>> = vec![Vec::new(); order.len()];
    for edge in edges {
        let after = edge
            .endpoints()
            .iter()
            .filter_map(|endpoint| index.get(endpoint).map(|&i| position[i]))
            .max()
            .unwrap_or(0);
        wires_after[after].push(edge);
    }

    let mut steps = Vec::with_capacity(order.len());
    for (&role, wires) in order.iter().zip(wires_after) {
        let node = &spec.roles[role];
        steps.push(Step::Create {
            role: node.name.clone(),
            contract: node.contract.clone(),
            params: node.params.clone(),
        });
        steps.extend(wires.into_iter().map(Step::Wire));
    }

    let primary = match target.or(spec.primary.as_deref()) {
        Some(target) => spec
            .find_target(target)
            .map(|role| role.name.clone())
            .ok_or_else(|| PlanError::UnknownPrimary(target.to_string()))?,
        None => order
            .last()
            .map(|&i| spec.roles[i].name.clone())
            .ok_or(PlanError::EmptyTemplate)?,
    };

    tracing::debug!(
        template = %spec.name,
        primary = %primary,
        steps = steps.len(),
        external = ?external_roles,
        "Deployment planned"
    );

    Ok(DeploymentPlan {
        template: spec.name.clone(),
        primary,
        permission_fn: spec.permission_fn.clone(),
        steps,
        external_roles,
    })
}

fn validate_params(role: &str, params: &[ConstructorParam]) -> Result<(), PlanError> {
    for param in params {
        if let ConstructorParam::Uint(value) = param {
            abi::uint_word(value).map_err(|reason| PlanError::InvalidParam {
                role: role.to_string(),
                reason,
            })?;
        }
    }
    Ok(())
}

/// Permission edges in declaration order, first declaration wins.
fn collect_edges(spec: &TemplateSpec) -> Vec<PermissionEdge> {
    let mut seen = HashSet::new();
    spec.roles
        .iter()
        .flat_map(|role| role.edges())
        .filter(|edge| seen.insert(edge.clone()))
        .collect()
}

/// Kahn's algorithm; the ready set is ordered by declaration index.
fn creation_order(spec: &TemplateSpec, deps: &[BTreeSet<usize>]) -> Result<Vec<usize>, PlanError> {
    let mut indegree: Vec<usize> = deps.iter().map(BTreeSet::len).collect();
    let mut dependents: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (i, role_deps) in deps.iter().enumerate() {
        for &dep in role_deps {
            dependents.entry(dep).or_default().push(i);
        }
    }

    let mut ready: BTreeSet<usize> = (0..deps.len()).filter(|&i| indegree[i] == 0).collect();
    let mut order = Vec::with_capacity(deps.len());

    while let Some(next) = ready.pop_first() {
        order.push(next);
        for &dependent in dependents.get(&next).into_iter().flatten() {
            indegree[dependent] -= 1;
            if indegree[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }

    if order.len() < deps.len() {
        let done: HashSet<usize> = order.into_iter().collect();
        return Err(PlanError::Cycle(find_cycle(spec, deps, &done)));
    }

    Ok(order)
}

/// Walk unresolved dependencies from the first unplaced role until a role
/// repeats. Every unplaced role has at least one unplaced dependency, so the
/// walk always closes a cycle.
fn find_cycle(spec: &TemplateSpec, deps: &[BTreeSet<usize>], done: &HashSet<usize>) -> Vec<String> {
    let Some(mut current) = (0..deps.len()).find(|i| !done.contains(i)) else {
        return Vec::new();
    };

    let mut path: Vec<usize> = Vec::new();
    let mut seen_at: HashMap<usize, usize> = HashMap::new();
    loop {
        if let Some(&start) = seen_at.get(&current) {
            let mut cycle: Vec<String> = path[start..]
                .iter()
                .map(|&i| spec.roles[i].name.clone())
                .collect();
            cycle.push(spec.roles[current].name.clone());
            return cycle;
        }
        seen_at.insert(current, path.len());
        path.push(current);

        match deps[current].iter().find(|dep| !done.contains(dep)) {
            Some(&dep) => current = dep,
            None => return path.iter().map(|&i| spec.roles[i].name.clone()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::RoleNode;

    fn role(name: &str) -> RoleNode {
        RoleNode::new(name, name.to_uppercase())
    }

    fn needs(node: RoleNode, other: &str) -> RoleNode {
        node.param(ConstructorParam::Role(other.to_string()))
    }

    fn create(name: &str) -> String {
        format!("create {name} ({})", name.to_uppercase())
    }

    fn describe(plan: &DeploymentPlan) -> Vec<String> {
        plan.steps.iter().map(Step::to_string).collect()
    }

    #[test]
    fn test_basic_scenario() {
        let spec = TemplateSpec::new("basic")
            .role(role("a").grant("b", "EXECUTE"))
            .role(needs(role("b"), "a"));

        let plan = plan(&spec).unwrap();

        assert_eq!(
            describe(&plan),
            vec![create("a"), create("b"), "wire a -> b (EXECUTE)".to_string()]
        );
        assert_eq!(plan.primary, "b");
        assert!(plan.external_roles.is_empty());
    }

    #[test]
    fn test_dependency_before_declaration_order() {
        let spec = TemplateSpec::new("reorder")
            .role(needs(role("voting"), "token"))
            .role(role("vault"))
            .role(role("token"));

        let plan = plan(&spec).unwrap();

        assert_eq!(describe(&plan), vec![create("vault"), create("token"), create("voting")]);
    }

    #[test]
    fn test_ties_follow_declaration_order() {
        let spec = TemplateSpec::new("ties")
            .role(role("kernel"))
            .role(needs(role("acl"), "kernel"))
            .role(needs(role("vault"), "kernel"))
            .role(role("finance"));

        let plan = plan(&spec).unwrap();

        assert_eq!(
            describe(&plan),
            vec![create("kernel"), create("acl"), create("vault"), create("finance")]
        );
    }

    #[test]
    fn test_wire_waits_for_later_endpoint() {
        let spec = TemplateSpec::new("wires")
            .role(role("acl").grant("voting", "CREATE_PERMISSIONS").grant("vault", "TRANSFER"))
            .role(role("vault"))
            .role(role("voting"));

        let plan = plan(&spec).unwrap();

        assert_eq!(
            describe(&plan),
            vec![
                create("acl"),
                create("vault"),
                "wire acl -> vault (TRANSFER)".to_string(),
                create("voting"),
                "wire acl -> voting (CREATE_PERMISSIONS)".to_string(),
            ]
        );
    }

    #[test]
    fn test_wire_endpoints_always_exist_earlier() {
        let spec = TemplateSpec::new("invariant")
            .role(needs(role("voting"), "token").grant("vault", "TRANSFER").receive("kernel", "EXECUTE"))
            .role(role("vault").receive("voting", "TRANSFER"))
            .role(needs(role("token"), "kernel"))
            .role(role("finance").grant("finance", "SELF"));

        let plan = plan(&spec).unwrap();

        for (i, step) in plan.steps.iter().enumerate() {
            if let Step::Wire(edge) = step {
                for endpoint in edge.endpoints() {
                    let created_before = plan.steps[..i].iter().any(
                        |s| matches!(s, Step::Create { role, .. } if role == endpoint),
                    );
                    assert!(
                        created_before || plan.external_roles.iter().any(|r| r == endpoint),
                        "endpoint {endpoint} of step {i} is not available"
                    );
                }
            }
        }
        assert_eq!(plan.external_roles, vec!["kernel".to_string()]);
    }

    #[test]
    fn test_duplicate_edges_are_wired_once() {
        let spec = TemplateSpec::new("dedupe")
            .role(role("a").grant("b", "EXECUTE"))
            .role(role("b").receive("a", "EXECUTE"));

        let plan = plan(&spec).unwrap();

        let wires = plan.steps.iter().filter(|s| matches!(s, Step::Wire(_))).count();
        assert_eq!(wires, 1);
    }

    #[test]
    fn test_mutual_grants_are_not_a_cycle() {
        let spec = TemplateSpec::new("mutual")
            .role(role("a").grant("b", "X"))
            .role(role("b").grant("a", "Y"));

        let plan = plan(&spec).unwrap();

        assert_eq!(
            describe(&plan),
            vec![
                create("a"),
                create("b"),
                "wire a -> b (X)".to_string(),
                "wire b -> a (Y)".to_string(),
            ]
        );
    }

    #[test]
    fn test_grant_does_not_order_creation() {
        let spec = TemplateSpec::new("grant-order")
            .role(role("b"))
            .role(role("a").grant("b", "EXECUTE"));

        let plan = plan(&spec).unwrap();

        assert_eq!(
            describe(&plan),
            vec![create("b"), create("a"), "wire a -> b (EXECUTE)".to_string()]
        );
    }

    #[test]
    fn test_cycle_detected() {
        let spec = TemplateSpec::new("cycle")
            .role(role("root"))
            .role(needs(role("a"), "b"))
            .role(needs(role("b"), "a"));

        let err = plan(&spec).unwrap_err();

        assert_eq!(
            err,
            PlanError::Cycle(vec!["a".to_string(), "b".to_string(), "a".to_string()])
        );
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let spec = TemplateSpec::new("self").role(needs(role("a"), "a"));

        assert_eq!(
            plan(&spec).unwrap_err(),
            PlanError::Cycle(vec!["a".to_string(), "a".to_string()])
        );
    }

    #[test]
    fn test_cycle_reported_from_downstream_role() {
        // c depends on the a <-> b cycle without being part of it.
        let spec = TemplateSpec::new("downstream")
            .role(needs(role("c"), "a"))
            .role(needs(role("a"), "b"))
            .role(needs(role("b"), "a"));

        assert_eq!(
            plan(&spec).unwrap_err(),
            PlanError::Cycle(vec!["a".to_string(), "b".to_string(), "a".to_string()])
        );
    }

    #[test]
    fn test_plan_is_deterministic() {
        let spec = TemplateSpec::new("determinism")
            .role(needs(role("voting"), "token").grant("vault", "TRANSFER"))
            .role(role("vault"))
            .role(needs(role("token"), "ens"))
            .role(role("finance").receive("vault", "TRANSFER"));

        let first = serde_json::to_vec(&plan(&spec).unwrap()).unwrap();
        let second = serde_json::to_vec(&plan(&spec).unwrap()).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_external_roles_in_reference_order() {
        let spec = TemplateSpec::new("externals")
            .role(needs(needs(role("template"), "dao_factory"), "ens").grant("apm", "CREATE_REPO"));

        let plan = plan(&spec).unwrap();

        assert_eq!(plan.external_roles, vec!["dao_factory", "ens", "apm"]);
        assert_eq!(plan.first_step_referencing("ens"), Some(0));
        assert_eq!(plan.first_step_referencing("apm"), Some(1));
    }

    #[test]
    fn test_primary_resolution() {
        let spec = TemplateSpec::new("primary")
            .role(role("kernel"))
            .role(RoleNode::new("template", "ReputationOracleTemplate"));

        assert_eq!(plan(&spec).unwrap().primary, "template");
        assert_eq!(
            plan_for_target(&spec, Some("ReputationOracleTemplate")).unwrap().primary,
            "template"
        );
        assert_eq!(plan_for_target(&spec, Some("kernel")).unwrap().primary, "kernel");
        assert_eq!(
            plan_for_target(&spec, Some("Missing")).unwrap_err(),
            PlanError::UnknownPrimary("Missing".to_string())
        );

        let declared = spec.clone().primary("kernel");
        assert_eq!(plan(&declared).unwrap().primary, "kernel");
    }

    #[test]
    fn test_configuration_errors() {
        assert_eq!(plan(&TemplateSpec::new("empty")).unwrap_err(), PlanError::EmptyTemplate);

        let duplicate = TemplateSpec::new("dup").role(role("a")).role(role("a"));
        assert_eq!(
            plan(&duplicate).unwrap_err(),
            PlanError::DuplicateRole("a".to_string())
        );

        let invalid = TemplateSpec::new("uint")
            .role(role("token").param(ConstructorParam::Uint("lots".to_string())));
        assert!(matches!(
            plan(&invalid).unwrap_err(),
            PlanError::InvalidParam { role, .. } if role == "token"
        ));
    }
}
