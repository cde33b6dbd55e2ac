use serde::{Deserialize, Serialize};

use tenderflow_core::types::StageId;

/// A state of the workflow graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowNode {
    QueryAnalysis,
    QueryEnhancement,
    CypherGeneration,
    QueryExecution,
    ErrorHandler,
    Done,
    Failed,
}

impl WorkflowNode {
    pub const ENTRY: WorkflowNode = WorkflowNode::QueryAnalysis;

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QueryAnalysis => "query_analysis",
            Self::QueryEnhancement => "query_enhancement",
            Self::CypherGeneration => "cypher_generation",
            Self::QueryExecution => "query_execution",
            Self::ErrorHandler => "error_handler",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// The working stage this node runs, if it is a working node.
    pub fn stage(&self) -> Option<StageId> {
        match self {
            Self::QueryAnalysis => Some(StageId::QueryAnalysis),
            Self::QueryEnhancement => Some(StageId::QueryEnhancement),
            Self::CypherGeneration => Some(StageId::CypherGeneration),
            Self::QueryExecution => Some(StageId::QueryExecution),
            Self::ErrorHandler | Self::Done | Self::Failed => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl From<StageId> for WorkflowNode {
    fn from(stage: StageId) -> Self {
        match stage {
            StageId::QueryAnalysis => Self::QueryAnalysis,
            StageId::QueryEnhancement => Self::QueryEnhancement,
            StageId::CypherGeneration => Self::CypherGeneration,
            StageId::QueryExecution => Self::QueryExecution,
        }
    }
}

impl std::fmt::Display for WorkflowNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Condition for traversing an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeCondition {
    /// The source stage produced a state without an error.
    OnSuccess,
    /// The source stage failed.
    OnFailure,
    /// The recovery router chose to re-enter the target stage.
    Recover,
    /// The recovery router chose to stop.
    GiveUp,
}

/// What happened at a node, used to pick the outgoing edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
    Recover(StageId),
    GiveUp,
}

/// An edge connecting two nodes in the workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub from: WorkflowNode,
    pub to: WorkflowNode,
    pub condition: EdgeCondition,
}

impl Edge {
    pub fn new(from: WorkflowNode, to: WorkflowNode, condition: EdgeCondition) -> Self {
        Self { from, to, condition }
    }

    fn matches(&self, from: WorkflowNode, outcome: Outcome) -> bool {
        if self.from != from {
            return false;
        }
        match (self.condition, outcome) {
            (EdgeCondition::OnSuccess, Outcome::Success)
            | (EdgeCondition::OnFailure, Outcome::Failure)
            | (EdgeCondition::GiveUp, Outcome::GiveUp) => true,
            (EdgeCondition::Recover, Outcome::Recover(stage)) => self.to == stage.into(),
            _ => false,
        }
    }
}

/// The workflow graph as an explicit edge list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionTable {
    edges: Vec<Edge>,
}

impl TransitionTable {
    pub fn new(edges: Vec<Edge>) -> Self {
        Self { edges }
    }

    /// The retrieval workflow: stages in sequence, every stage failing into
    /// the error handler, and the handler either re-entering the stage that
    /// failed or giving up.
    pub fn standard() -> Self {
        let mut edges = Vec::new();
        for stage in StageId::ALL {
            let node = WorkflowNode::from(stage);
            let next = stage.next().map(WorkflowNode::from).unwrap_or(WorkflowNode::Done);
            edges.push(Edge::new(node, next, EdgeCondition::OnSuccess));
            edges.push(Edge::new(node, WorkflowNode::ErrorHandler, EdgeCondition::OnFailure));
            edges.push(Edge::new(WorkflowNode::ErrorHandler, node, EdgeCondition::Recover));
        }
        edges.push(Edge::new(
            WorkflowNode::ErrorHandler,
            WorkflowNode::Failed,
            EdgeCondition::GiveUp,
        ));
        Self { edges }
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// The node reached from `from` given `outcome`; the first matching edge wins.
    pub fn next(&self, from: WorkflowNode, outcome: Outcome) -> Option<WorkflowNode> {
        self.edges
            .iter()
            .find(|e| e.matches(from, outcome))
            .map(|e| e.to)
    }

    /// Mermaid flowchart of the graph, for docs and logs.
    pub fn to_mermaid(&self) -> String {
        let mut out = String::from("flowchart TD\n");
        for edge in &self.edges {
            let label = match edge.condition {
                EdgeCondition::OnSuccess => "success",
                EdgeCondition::OnFailure => "failure",
                EdgeCondition::Recover => "retry",
                EdgeCondition::GiveUp => "give up",
            };
            out.push_str(&format!("    {} -->|{}| {}\n", edge.from, label, edge.to));
        }
        out
    }
}

impl Default for TransitionTable {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_path_visits_stages_in_order() {
        let table = TransitionTable::standard();
        let mut node = WorkflowNode::ENTRY;
        let mut visited = vec![node];
        while !node.is_terminal() {
            node = table.next(node, Outcome::Success).unwrap();
            visited.push(node);
        }
        assert_eq!(
            visited,
            vec![
                WorkflowNode::QueryAnalysis,
                WorkflowNode::QueryEnhancement,
                WorkflowNode::CypherGeneration,
                WorkflowNode::QueryExecution,
                WorkflowNode::Done,
            ]
        );
    }

    #[test]
    fn test_every_stage_fails_into_error_handler() {
        let table = TransitionTable::standard();
        for stage in StageId::ALL {
            assert_eq!(
                table.next(stage.into(), Outcome::Failure),
                Some(WorkflowNode::ErrorHandler)
            );
        }
    }

    #[test]
    fn test_recovery_reenters_the_failed_stage() {
        let table = TransitionTable::standard();
        for stage in StageId::ALL {
            assert_eq!(
                table.next(WorkflowNode::ErrorHandler, Outcome::Recover(stage)),
                Some(WorkflowNode::from(stage))
            );
        }
        assert_eq!(
            table.next(WorkflowNode::ErrorHandler, Outcome::GiveUp),
            Some(WorkflowNode::Failed)
        );
    }

    #[test]
    fn test_terminals_have_no_outgoing_edges() {
        let table = TransitionTable::standard();
        for outcome in [Outcome::Success, Outcome::Failure, Outcome::GiveUp] {
            assert_eq!(table.next(WorkflowNode::Done, outcome), None);
            assert_eq!(table.next(WorkflowNode::Failed, outcome), None);
        }
    }

    #[test]
    fn test_table_serializes() {
        let table = TransitionTable::standard();
        let json = serde_json::to_string(&table).unwrap();
        assert!(json.contains(r#""from":"error_handler""#));
        let parsed: TransitionTable = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.edges(), table.edges());
    }

    #[test]
    fn test_mermaid_lists_every_edge() {
        let table = TransitionTable::standard();
        let diagram = table.to_mermaid();
        assert_eq!(diagram.lines().count(), table.edges().len() + 1);
        assert!(diagram.contains("query_execution -->|success| done"));
        assert!(diagram.contains("error_handler -->|give up| failed"));
    }
}
