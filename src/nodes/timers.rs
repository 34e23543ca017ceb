//! Delay timer: suspends the execution, resumed by the expiry sweep once
//! the deadline passes.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;

use super::executor::{ConfigField, ConfigType, ExecutorEnv, NodeExecutor, NodeRunResult};
use super::util::parse_config;
use crate::context::{ContextBag, ContextValue};
use crate::error::NodeError;
use crate::model::WorkflowNode;

pub(crate) const TIMER_WAIT: &str = "timer";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DelayTimerConfig {
    delay_seconds: Option<i64>,
    delay_minutes: Option<i64>,
    delay_hours: Option<i64>,
    delay_days: Option<i64>,
}

impl DelayTimerConfig {
    fn total_seconds(&self) -> i64 {
        self.delay_seconds.unwrap_or(0)
            + self.delay_minutes.unwrap_or(0) * 60
            + self.delay_hours.unwrap_or(0) * 3600
            + self.delay_days.unwrap_or(0) * 86_400
    }
}

pub struct DelayTimer;

#[async_trait]
impl NodeExecutor for DelayTimer {
    async fn execute(
        &self,
        node: &WorkflowNode,
        ctx: &mut ContextBag,
        env: &ExecutorEnv,
    ) -> Result<NodeRunResult, NodeError> {
        let cfg: DelayTimerConfig = parse_config(&node.config)?;
        let total = cfg.total_seconds();
        if total <= 0 {
            return Ok(NodeRunResult::failed("delay not specified or not positive"));
        }

        let now = env.runtime.time.now();
        ctx.remove("wait_expired");

        // Re-entry: the fire time was recorded on first suspension.
        if let Some(fire_at) = ctx
            .node_output(node.id, "fire_at")
            .and_then(ContextValue::as_i64)
        {
            if now.timestamp() >= fire_at {
                let mut data = HashMap::new();
                data.insert("waited_seconds".into(), ContextValue::Integer(total));
                return Ok(NodeRunResult::success(data));
            }
            // Resumed early (spurious sweep); keep waiting out the rest.
            let remaining = fire_at - now.timestamp();
            return Ok(NodeRunResult::waiting(
                Some(TIMER_WAIT.into()),
                Some(remaining),
                HashMap::new(),
            ));
        }

        ctx.set_node_output(node.id, "fire_at", now.timestamp() + total);
        Ok(NodeRunResult::waiting(
            Some(TIMER_WAIT.into()),
            Some(total),
            HashMap::new(),
        ))
    }

    fn config_schema(&self) -> Vec<ConfigField> {
        vec![
            ConfigField::new("delay_seconds", ConfigType::Integer, false, "Delay in seconds"),
            ConfigField::new("delay_minutes", ConfigType::Integer, false, "Delay in minutes"),
            ConfigField::new("delay_hours", ConfigType::Integer, false, "Delay in hours"),
            ConfigField::new("delay_days", ConfigType::Integer, false, "Delay in days"),
        ]
    }
}
