//! Workflow outputs: which tool outputs are kept visible after a run.
//!
//! Marking any output as a workflow output switches the workflow into explicit
//! mode: every unmarked tool output gets a `HideDatasetAction`.

use crate::graph::{NodeId, Workflow};
use crate::EditorError;
use mw_core::step::PostJobAction;
use std::collections::BTreeMap;

impl Workflow {
    /// Whether any node marks an output, or any node hides one.
    pub(crate) fn uses_workflow_outputs(&self) -> (bool, bool) {
        let marks = self.nodes.values().any(|n| !n.workflow_outputs.is_empty());
        let hides = self
            .nodes
            .values()
            .any(|n| n.post_job_actions.values().any(PostJobAction::is_hide));
        (marks, hides)
    }

    /// Bring hide actions in line with the marked workflow outputs.
    pub fn rectify_workflow_outputs(&mut self) {
        let (marks, hides) = self.uses_workflow_outputs();
        if !marks && !hides {
            return;
        }

        let tool_nodes: Vec<NodeId> = self
            .nodes
            .values()
            .filter(|n| n.is_tool())
            .map(|n| n.id)
            .collect();
        for id in tool_nodes {
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            let mut actions: BTreeMap<String, PostJobAction> = node
                .post_job_actions
                .iter()
                .filter(|(_, action)| !action.is_hide())
                .map(|(key, action)| (key.clone(), action.clone()))
                .collect();
            if marks {
                for terminal in node.outputs.iter().filter_map(|t| self.terminals.get(t)) {
                    if !node.workflow_outputs.contains(&terminal.name) {
                        let hide = PostJobAction::hide(terminal.name.clone());
                        actions.insert(hide.key(), hide);
                    }
                }
            }
            if actions != node.post_job_actions {
                if let Some(node) = self.nodes.get_mut(&id) {
                    node.post_job_actions = actions;
                }
                self.node_changed(id);
            }
        }
    }

    /// Mark or unmark an output as a workflow output. Returns the new state.
    pub fn toggle_workflow_output(
        &mut self,
        node: NodeId,
        output: &str,
    ) -> Result<bool, EditorError> {
        if self.output_terminal(node, output).is_none() {
            return Err(EditorError::UnknownReference {
                step: node.0,
                what: "output",
                name: output.to_string(),
            });
        }
        let n = self.nodes.get_mut(&node).ok_or(EditorError::NodeNotFound(node))?;
        let marked = if let Some(pos) = n.workflow_outputs.iter().position(|o| o == output) {
            n.workflow_outputs.remove(pos);
            false
        } else {
            n.workflow_outputs.push(output.to_string());
            true
        };
        self.node_changed(node);
        Ok(marked)
    }

    /// On load: once a workflow uses outputs or hides anything, every tool
    /// output without a hide action counts as a workflow output. Returns
    /// whether any output was promoted.
    pub(crate) fn promote_unhidden_outputs(&mut self, node: NodeId) -> bool {
        let Some(n) = self.nodes.get(&node) else {
            return false;
        };
        if !n.is_tool() {
            return false;
        }
        let promoted: Vec<String> = n
            .outputs
            .iter()
            .filter_map(|t| self.terminals.get(t))
            .map(|t| t.name.clone())
            .filter(|name| {
                !n.post_job_actions
                    .contains_key(&PostJobAction::hide(name.clone()).key())
                    && !n.workflow_outputs.contains(name)
            })
            .collect();
        if promoted.is_empty() {
            return false;
        }
        if let Some(n) = self.nodes.get_mut(&node) {
            n.workflow_outputs.extend(promoted);
        }
        true
    }
}
