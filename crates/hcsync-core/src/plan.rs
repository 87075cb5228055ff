//! Planned writes for a reconciliation pass

use crate::model::ResourceKind;
use serde::{Deserialize, Serialize};

/// A single planned write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub action_type: ActionType,
    pub kind: ResourceKind,
    pub cloud_id: String,
    pub description: String,
}

impl Action {
    pub fn new(action_type: ActionType, kind: ResourceKind, cloud_id: impl Into<String>) -> Self {
        let cloud_id = cloud_id.into();
        let description = format!("{} {} {}", action_type, kind, cloud_id);
        Self {
            action_type,
            kind,
            cloud_id,
            description,
        }
    }
}

/// Type of write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Create,
    Update,
    Delete,
    NoOp,
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionType::Create => write!(f, "create"),
            ActionType::Update => write!(f, "update"),
            ActionType::Delete => write!(f, "delete"),
            ActionType::NoOp => write!(f, "no-op"),
        }
    }
}

/// Dry-run result of one kind's diff
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub kind: ResourceKind,
    pub actions: Vec<Action>,
    pub has_changes: bool,
}

impl Plan {
    pub fn new(kind: ResourceKind, actions: Vec<Action>) -> Self {
        let has_changes = actions.iter().any(|a| a.action_type != ActionType::NoOp);
        Self {
            kind,
            actions,
            has_changes,
        }
    }

    pub fn actions_by_type(&self, action_type: ActionType) -> Vec<&Action> {
        self.actions
            .iter()
            .filter(|a| a.action_type == action_type)
            .collect()
    }

    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            create: self.actions_by_type(ActionType::Create).len(),
            update: self.actions_by_type(ActionType::Update).len(),
            delete: self.actions_by_type(ActionType::Delete).len(),
            no_change: self.actions_by_type(ActionType::NoOp).len(),
        }
    }
}

/// Write counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub create: usize,
    pub update: usize,
    pub delete: usize,
    pub no_change: usize,
}

impl PlanSummary {
    pub fn is_noop(&self) -> bool {
        self.create == 0 && self.update == 0 && self.delete == 0
    }
}

impl std::ops::AddAssign for PlanSummary {
    fn add_assign(&mut self, other: Self) {
        self.create += other.create;
        self.update += other.update;
        self.delete += other.delete;
        self.no_change += other.no_change;
    }
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to create, {} to update, {} to delete, {} unchanged",
            self.create, self.update, self.delete, self.no_change
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_summary() {
        let plan = Plan::new(
            ResourceKind::Eip,
            vec![
                Action::new(ActionType::Create, ResourceKind::Eip, "eip-1"),
                Action::new(ActionType::Delete, ResourceKind::Eip, "eip-2"),
                Action::new(ActionType::NoOp, ResourceKind::Eip, "eip-3"),
            ],
        );
        assert!(plan.has_changes);
        assert_eq!(
            plan.summary().to_string(),
            "1 to create, 0 to update, 1 to delete, 1 unchanged"
        );
        assert_eq!(plan.actions[1].description, "delete eip eip-2");
    }

    #[test]
    fn test_noop_plan() {
        let plan = Plan::new(
            ResourceKind::Vpc,
            vec![Action::new(ActionType::NoOp, ResourceKind::Vpc, "vpc-1")],
        );
        assert!(!plan.has_changes);
        assert!(plan.summary().is_noop());
    }
}
