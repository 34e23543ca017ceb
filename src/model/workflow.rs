use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// The static, versioned description of a workflow. `canvas_data` belongs
/// to the designer and is never interpreted by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub enabled: bool,
    /// Incremented on every designer update.
    pub version: i32,
    #[serde(default)]
    pub canvas_data: Option<Value>,
}

/// One node of a workflow graph. `config` is the raw designer payload;
/// each executor parses it into its own typed configuration struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowNode {
    pub id: i64,
    pub workflow_id: i64,
    pub kind: NodeKind,
    pub name: String,
    #[serde(default)]
    pub config: Value,
    pub is_entry_point: bool,
}

/// A labeled directed edge. The engine follows, for a given
/// `(from_node_id, output_name)` pair, the connection with the lowest
/// `order`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConnection {
    pub id: i64,
    pub workflow_id: i64,
    pub from_node_id: i64,
    pub to_node_id: i64,
    pub output_name: String,
    pub order: i32,
    #[serde(default)]
    pub label: Option<String>,
}

/// Closed set of node kinds. Unknown kinds fail at deserialization/save
/// time, not while an execution is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    TriggerDocumentAdded,
    TriggerTagAdded,
    TriggerValidationChanged,
    TriggerScan,
    TriggerUpload,
    TriggerManual,
    ConditionDocumentType,
    ConditionAmount,
    ConditionTag,
    ConditionCorrespondent,
    ConditionField,
    ActionCreateApproval,
    ActionSendEmail,
    ActionWebhook,
    ActionAddTag,
    ActionAssignUser,
    ActionAssignGroup,
    ActionSetValidation,
    WaitApproval,
    TimerDelay,
}

impl NodeKind {
    pub const ALL: &'static [NodeKind] = &[
        NodeKind::TriggerDocumentAdded,
        NodeKind::TriggerTagAdded,
        NodeKind::TriggerValidationChanged,
        NodeKind::TriggerScan,
        NodeKind::TriggerUpload,
        NodeKind::TriggerManual,
        NodeKind::ConditionDocumentType,
        NodeKind::ConditionAmount,
        NodeKind::ConditionTag,
        NodeKind::ConditionCorrespondent,
        NodeKind::ConditionField,
        NodeKind::ActionCreateApproval,
        NodeKind::ActionSendEmail,
        NodeKind::ActionWebhook,
        NodeKind::ActionAddTag,
        NodeKind::ActionAssignUser,
        NodeKind::ActionAssignGroup,
        NodeKind::ActionSetValidation,
        NodeKind::WaitApproval,
        NodeKind::TimerDelay,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::TriggerDocumentAdded => "trigger_document_added",
            NodeKind::TriggerTagAdded => "trigger_tag_added",
            NodeKind::TriggerValidationChanged => "trigger_validation_changed",
            NodeKind::TriggerScan => "trigger_scan",
            NodeKind::TriggerUpload => "trigger_upload",
            NodeKind::TriggerManual => "trigger_manual",
            NodeKind::ConditionDocumentType => "condition_document_type",
            NodeKind::ConditionAmount => "condition_amount",
            NodeKind::ConditionTag => "condition_tag",
            NodeKind::ConditionCorrespondent => "condition_correspondent",
            NodeKind::ConditionField => "condition_field",
            NodeKind::ActionCreateApproval => "action_create_approval",
            NodeKind::ActionSendEmail => "action_send_email",
            NodeKind::ActionWebhook => "action_webhook",
            NodeKind::ActionAddTag => "action_add_tag",
            NodeKind::ActionAssignUser => "action_assign_user",
            NodeKind::ActionAssignGroup => "action_assign_group",
            NodeKind::ActionSetValidation => "action_set_validation",
            NodeKind::WaitApproval => "wait_approval",
            NodeKind::TimerDelay => "timer_delay",
        }
    }

    /// Trigger kinds are the only kinds allowed on entry-point nodes.
    pub fn is_trigger(&self) -> bool {
        matches!(
            self,
            NodeKind::TriggerDocumentAdded
                | NodeKind::TriggerTagAdded
                | NodeKind::TriggerValidationChanged
                | NodeKind::TriggerScan
                | NodeKind::TriggerUpload
                | NodeKind::TriggerManual
        )
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown node kind: {s}"))
    }
}
