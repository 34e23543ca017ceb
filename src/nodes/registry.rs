use std::collections::HashMap;

use super::actions::{
    AddTagAction, AssignGroupAction, AssignUserAction, CreateApprovalAction, SendEmailAction,
    SetValidationAction, WebhookAction,
};
use super::conditions::{
    AmountCondition, CorrespondentCondition, DocumentTypeCondition, FieldCondition, TagCondition,
};
use super::executor::NodeExecutor;
use super::timers::DelayTimer;
use super::triggers::{
    ActivationTrigger, DocumentAddedTrigger, TagAddedTrigger, ValidationChangedTrigger,
};
use super::waits::ApprovalWait;
use crate::model::NodeKind;

/// Registry of node executors, resolved once at engine construction. Every
/// [`NodeKind`] has a builtin executor; replacing one (e.g. in tests) is a
/// plain `register` call.
pub struct NodeExecutorRegistry {
    executors: HashMap<NodeKind, Box<dyn NodeExecutor>>,
}

impl NodeExecutorRegistry {
    pub fn new() -> Self {
        let mut registry = NodeExecutorRegistry {
            executors: HashMap::new(),
        };
        registry.register(NodeKind::TriggerDocumentAdded, Box::new(DocumentAddedTrigger));
        registry.register(NodeKind::TriggerTagAdded, Box::new(TagAddedTrigger));
        registry.register(
            NodeKind::TriggerValidationChanged,
            Box::new(ValidationChangedTrigger),
        );
        registry.register(NodeKind::TriggerScan, Box::new(ActivationTrigger::scan()));
        registry.register(NodeKind::TriggerUpload, Box::new(ActivationTrigger::upload()));
        registry.register(NodeKind::TriggerManual, Box::new(ActivationTrigger::manual()));
        registry.register(NodeKind::ConditionDocumentType, Box::new(DocumentTypeCondition));
        registry.register(NodeKind::ConditionAmount, Box::new(AmountCondition));
        registry.register(NodeKind::ConditionTag, Box::new(TagCondition));
        registry.register(NodeKind::ConditionCorrespondent, Box::new(CorrespondentCondition));
        registry.register(NodeKind::ConditionField, Box::new(FieldCondition));
        registry.register(NodeKind::ActionCreateApproval, Box::new(CreateApprovalAction));
        registry.register(NodeKind::ActionSendEmail, Box::new(SendEmailAction));
        registry.register(NodeKind::ActionWebhook, Box::new(WebhookAction));
        registry.register(NodeKind::ActionAddTag, Box::new(AddTagAction));
        registry.register(NodeKind::ActionAssignUser, Box::new(AssignUserAction));
        registry.register(NodeKind::ActionAssignGroup, Box::new(AssignGroupAction));
        registry.register(NodeKind::ActionSetValidation, Box::new(SetValidationAction));
        registry.register(NodeKind::WaitApproval, Box::new(ApprovalWait));
        registry.register(NodeKind::TimerDelay, Box::new(DelayTimer));
        registry
    }

    pub fn register(&mut self, kind: NodeKind, executor: Box<dyn NodeExecutor>) {
        self.executors.insert(kind, executor);
    }

    pub fn get(&self, kind: NodeKind) -> Option<&dyn NodeExecutor> {
        self.executors.get(&kind).map(|e| e.as_ref())
    }
}

impl Default for NodeExecutorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_kind_has_an_executor() {
        let registry = NodeExecutorRegistry::new();
        for kind in NodeKind::ALL {
            assert!(registry.get(*kind).is_some(), "missing executor for {kind}");
        }
    }

    #[test]
    fn test_branching_nodes_publish_outputs() {
        let registry = NodeExecutorRegistry::new();
        let wait = registry.get(NodeKind::WaitApproval).unwrap();
        assert_eq!(wait.outputs(), &["approved", "rejected", "timeout"]);
        let amount = registry.get(NodeKind::ConditionAmount).unwrap();
        assert_eq!(amount.outputs(), &["true", "false"]);
    }
}
