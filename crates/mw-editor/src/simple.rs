//! to_simple / from_simple: convert between the live graph and the plain
//! steps/connections document the save endpoint consumes.

use crate::config::EditorConfig;
use crate::graph::{ConnectorId, EditorEvent, NodeId, Workflow};
use crate::EditorError;
use mw_core::datatype::DatatypeRegistry;
use mw_core::simple::{ConnectionRef, Connections, SimpleStep, SimpleWorkflow};
use serde::Serialize;
use std::collections::BTreeMap;

impl Workflow {
    /// Snapshot the graph as a simple workflow document.
    pub fn to_simple(&self) -> SimpleWorkflow {
        let steps = self
            .nodes
            .values()
            .map(|node| {
                let mut input_connections = BTreeMap::new();
                for terminal in node.inputs.iter().filter_map(|t| self.terminals.get(t)) {
                    let refs: Vec<ConnectionRef> = terminal
                        .connectors
                        .iter()
                        .filter_map(|c| self.connectors.get(c))
                        .filter_map(|c| self.terminals.get(&c.output))
                        .map(|output| ConnectionRef {
                            id: output.node.0,
                            output_name: output.name.clone(),
                        })
                        .collect();
                    let value = (!refs.is_empty()).then_some(Connections::Many(refs));
                    input_connections.insert(terminal.name.clone(), value);
                }

                let post_job_actions = node
                    .post_job_actions
                    .values()
                    .map(|action| (action.key(), action.clone()))
                    .collect();

                let step = SimpleStep {
                    id: node.id.0,
                    step_type: node.step_type,
                    name: node.name.clone(),
                    tool_id: node.tool_id.clone(),
                    tool_state: node.tool_state.clone(),
                    tool_errors: node.tool_errors.clone(),
                    annotation: node.annotation.clone(),
                    label: node.label.clone(),
                    uuid: Some(node.uuid),
                    position: Some(node.position),
                    post_job_actions,
                    workflow_outputs: node.workflow_outputs.clone(),
                    data_inputs: node.data_inputs.clone(),
                    data_outputs: node.data_outputs.clone(),
                    input_connections,
                };
                (node.id.0.to_string(), step)
            })
            .collect();

        SimpleWorkflow {
            name: self.name.clone(),
            steps,
        }
    }

    /// Rebuild a workflow from a saved document, dropping saved connections
    /// that violate the connection rule. See [`Workflow::load_simple`].
    pub fn from_simple(
        simple: &SimpleWorkflow,
        datatypes: DatatypeRegistry,
        config: EditorConfig,
    ) -> Result<Self, EditorError> {
        Self::load_simple(simple, datatypes, config).map(|(wf, _)| wf)
    }

    /// Rebuild a workflow from a saved document.
    ///
    /// Nodes keep their saved ids. Every saved connection is replayed through
    /// the connection rule, so the loaded graph only holds valid connectors.
    /// A connection failing the rule is dropped with a warning and returned,
    /// or fails the load when `config.strict_load` is set.
    pub fn load_simple(
        simple: &SimpleWorkflow,
        datatypes: DatatypeRegistry,
        config: EditorConfig,
    ) -> Result<(Self, Vec<DroppedConnection>), EditorError> {
        let mut wf = Workflow::new(config, datatypes);
        wf.name = simple.name.clone();

        for step in simple.steps.values() {
            let id = NodeId(step.id);
            wf.insert_node(id, step.definition())?;
            if let Some(position) = step.position {
                if let Some(node) = wf.nodes.get_mut(&id) {
                    node.position = position;
                }
            }
        }
        let (marks, hides) = wf.uses_workflow_outputs();

        let mut dropped = Vec::new();
        let mut promoted = false;
        for step in load_order(simple) {
            let id = NodeId(step.id);
            for (input_name, connections) in &step.input_connections {
                let Some(connections) = connections.clone() else {
                    continue;
                };
                let input = wf
                    .input_terminal(id, input_name)
                    .ok_or_else(|| EditorError::UnknownReference {
                        step: step.id,
                        what: "input",
                        name: input_name.clone(),
                    })?;
                for conn in connections.into_vec() {
                    let output = wf
                        .output_terminal(NodeId(conn.id), &conn.output_name)
                        .ok_or_else(|| EditorError::UnknownReference {
                            step: conn.id,
                            what: "output",
                            name: conn.output_name.clone(),
                        })?;
                    if wf.can_accept(input, output) {
                        wf.link(output, input)?;
                        continue;
                    }
                    let lost = DroppedConnection {
                        step: step.id,
                        input: input_name.clone(),
                        from: conn,
                    };
                    wf.reject_saved_connection(lost, &mut dropped)?;
                }
            }
            if marks || hides {
                promoted |= wf.promote_unhidden_outputs(id);
            }
        }

        // Steps caught in a cycle are replayed out of order; sweep up whatever
        // a later map-over invalidated.
        let established: Vec<ConnectorId> = wf.connectors.keys().copied().collect();
        for connector in established {
            let Some(c) = wf.connectors.get(&connector).copied() else {
                continue;
            };
            if wf.attachable(c.input, c.output) {
                continue;
            }
            let (Some(input), Some(output)) = (wf.terminal(c.input), wf.terminal(c.output))
            else {
                continue;
            };
            let lost = DroppedConnection {
                step: input.node.0,
                input: input.name.clone(),
                from: ConnectionRef {
                    id: output.node.0,
                    output_name: output.name.clone(),
                },
            };
            wf.destroy_connector(connector);
            wf.reject_saved_connection(lost, &mut dropped)?;
        }

        tracing::info!(
            "loaded workflow {:?}: {} steps, {} connections ({} dropped)",
            wf.name,
            wf.nodes.len(),
            wf.connectors.len(),
            dropped.len()
        );
        wf.events.clear();
        let ids: Vec<NodeId> = wf.nodes.keys().copied().collect();
        for id in ids {
            wf.emit(EditorEvent::Redraw(id));
        }
        wf.has_changes = promoted || !dropped.is_empty();
        Ok((wf, dropped))
    }

    fn reject_saved_connection(
        &self,
        lost: DroppedConnection,
        dropped: &mut Vec<DroppedConnection>,
    ) -> Result<(), EditorError> {
        if self.config.strict_load {
            return Err(EditorError::InvalidConnection {
                step: lost.step,
                input: lost.input,
                from_step: lost.from.id,
                output: lost.from.output_name,
            });
        }
        tracing::warn!(
            "dropping saved connection {}.{} -> {}.{}",
            lost.from.id,
            lost.from.output_name,
            lost.step,
            lost.input
        );
        dropped.push(lost);
        Ok(())
    }
}

/// A saved connection left out of the loaded graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DroppedConnection {
    /// Downstream step id.
    pub step: u32,
    pub input: String,
    pub from: ConnectionRef,
}

/// Steps ordered upstream first, so a restored connector sees the map-over of
/// the output feeding it. Steps caught in a cycle follow in id order.
fn load_order(simple: &SimpleWorkflow) -> Vec<&SimpleStep> {
    let mut pending: BTreeMap<u32, &SimpleStep> =
        simple.steps.values().map(|step| (step.id, step)).collect();
    let mut ordered = Vec::with_capacity(pending.len());

    loop {
        let ready: Vec<u32> = pending
            .values()
            .filter(|step| {
                step.input_connections
                    .values()
                    .flatten()
                    .flat_map(|c| c.clone().into_vec())
                    .all(|c| c.id == step.id || !pending.contains_key(&c.id))
            })
            .map(|step| step.id)
            .collect();
        if ready.is_empty() {
            break;
        }
        for id in ready {
            if let Some(step) = pending.remove(&id) {
                ordered.push(step);
            }
        }
    }
    ordered.extend(pending.into_values());
    ordered
}
