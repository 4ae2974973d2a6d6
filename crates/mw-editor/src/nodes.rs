//! Node lifecycle: add, update from fresh tool metadata, remove.

use crate::graph::{
    EditorEvent, Node, NodeId, Terminal, TerminalId, TerminalKind, TerminalMapping, Workflow,
};
use crate::EditorError;
use mw_core::simple::Position;
use mw_core::step::{InputDefinition, OutputDefinition, StepDefinition};
use uuid::Uuid;

impl Workflow {
    /// Add a step to the canvas and build its terminals.
    pub fn add_node(&mut self, step: StepDefinition) -> Result<NodeId, EditorError> {
        let id = NodeId(self.next_node);
        self.insert_node(id, step)?;
        Ok(id)
    }

    pub(crate) fn insert_node(
        &mut self,
        id: NodeId,
        step: StepDefinition,
    ) -> Result<(), EditorError> {
        if self.nodes.contains_key(&id) {
            return Err(EditorError::DuplicateNode(id));
        }
        let next_node = id.0.checked_add(1).ok_or(EditorError::IdOverflow("node"))?;
        step.validate()?;

        let mut node = Node {
            id,
            step_type: step.step_type,
            name: step.name,
            tool_id: step.tool_id,
            tool_state: step.tool_state,
            tool_errors: step.tool_errors,
            annotation: step.annotation,
            label: step.label,
            uuid: step.uuid.unwrap_or_else(Uuid::new_v4),
            post_job_actions: step.post_job_actions,
            workflow_outputs: step.workflow_outputs,
            inputs: Vec::new(),
            outputs: Vec::new(),
            data_inputs: Vec::new(),
            data_outputs: Vec::new(),
            position: Position::default(),
            size: self.config.node_size,
            error: None,
        };
        for def in &step.data_inputs {
            node.inputs.push(self.new_input_terminal(id, def)?);
        }
        for def in &step.data_outputs {
            node.outputs.push(self.new_output_terminal(id, def)?);
        }
        node.data_inputs = step.data_inputs;
        node.data_outputs = step.data_outputs;

        tracing::debug!(
            "added {id} '{}' ({} inputs, {} outputs)",
            node.name,
            node.inputs.len(),
            node.outputs.len()
        );
        self.nodes.insert(id, node);
        self.next_node = self.next_node.max(next_node);
        self.node_changed(id);
        Ok(())
    }

    fn new_input_terminal(
        &mut self,
        node: NodeId,
        def: &InputDefinition,
    ) -> Result<TerminalId, EditorError> {
        let kind = input_kind(def)?;
        self.insert_terminal(node, def.name.clone(), kind, def.extensions.clone())
    }

    fn new_output_terminal(
        &mut self,
        node: NodeId,
        def: &OutputDefinition,
    ) -> Result<TerminalId, EditorError> {
        let kind = output_kind(def)?;
        self.insert_terminal(node, def.name.clone(), kind, def.extensions.clone())
    }

    fn insert_terminal(
        &mut self,
        node: NodeId,
        name: String,
        kind: TerminalKind,
        datatypes: Vec<String>,
    ) -> Result<TerminalId, EditorError> {
        let id = TerminalId(self.next_terminal);
        self.next_terminal = self
            .next_terminal
            .checked_add(1)
            .ok_or(EditorError::IdOverflow("terminal"))?;
        let mapping = (!kind.is_multiple()).then(TerminalMapping::default);
        self.terminals.insert(
            id,
            Terminal {
                id,
                node,
                name,
                kind,
                datatypes,
                connectors: Vec::new(),
                mapping,
            },
        );
        Ok(id)
    }

    /// Destroy a terminal's connectors, then the terminal itself.
    fn destroy_terminal(&mut self, terminal: TerminalId) {
        let connectors = self
            .terminals
            .get(&terminal)
            .map(|t| t.connectors.clone())
            .unwrap_or_default();
        for connector in connectors {
            self.destroy_connector(connector);
        }
        self.terminals.remove(&terminal);
    }

    /// Apply fresh tool metadata to an existing node.
    ///
    /// Terminals keep their identity (and connectors) when name and kind are
    /// unchanged; connectors that the new declaration invalidates are dropped.
    /// A malformed declaration leaves the terminals untouched and puts the node
    /// into an error state.
    pub fn update_node(&mut self, id: NodeId, step: StepDefinition) -> Result<(), EditorError> {
        if !self.nodes.contains_key(&id) {
            return Err(EditorError::NodeNotFound(id));
        }
        if let Err(e) = step.validate() {
            self.set_node_error(id, e.to_string())?;
            return Err(e.into());
        }

        let (old_inputs, old_outputs) = match self.nodes.get_mut(&id) {
            Some(node) => {
                node.tool_state = step.tool_state;
                node.tool_errors = step.tool_errors;
                node.annotation = step.annotation;
                node.post_job_actions = step.post_job_actions;
                node.error = None;
                (node.inputs.clone(), node.outputs.clone())
            }
            None => return Err(EditorError::NodeNotFound(id)),
        };

        let mut inputs = Vec::with_capacity(step.data_inputs.len());
        for def in &step.data_inputs {
            let kind = input_kind(def)?;
            let existing = self.find_terminal(&old_inputs, &def.name);
            let terminal = match existing {
                Some(tid) if self.same_class(tid, &kind) => {
                    self.retype_terminal(tid, kind, def.extensions.clone());
                    self.destroy_invalid_connections(tid)?;
                    tid
                }
                Some(tid) => {
                    self.destroy_terminal(tid);
                    self.insert_terminal(id, def.name.clone(), kind, def.extensions.clone())?
                }
                None => {
                    self.insert_terminal(id, def.name.clone(), kind, def.extensions.clone())?
                }
            };
            inputs.push(terminal);
        }
        for stale in old_inputs.iter().filter(|t| !inputs.contains(t)) {
            self.destroy_terminal(*stale);
        }

        let mut outputs = Vec::with_capacity(step.data_outputs.len());
        for def in &step.data_outputs {
            let kind = output_kind(def)?;
            let existing = self.find_terminal(&old_outputs, &def.name);
            let terminal = match existing {
                Some(tid) if self.same_class(tid, &kind) => {
                    let retyped = self
                        .terminal(tid)
                        .is_some_and(|t| t.kind.collection_type() != kind.collection_type());
                    if retyped {
                        // A new collection type invalidates everything downstream.
                        let connectors = self
                            .terminal(tid)
                            .map(|t| t.connectors.clone())
                            .unwrap_or_default();
                        for connector in connectors {
                            self.destroy_connector(connector);
                        }
                    }
                    self.retype_terminal(tid, kind, def.extensions.clone());
                    let connectors = self
                        .terminal(tid)
                        .map(|t| t.connectors.clone())
                        .unwrap_or_default();
                    for connector in connectors {
                        self.destroy_if_invalid(connector);
                    }
                    tid
                }
                Some(tid) => {
                    self.destroy_terminal(tid);
                    self.insert_terminal(id, def.name.clone(), kind, def.extensions.clone())?
                }
                None => {
                    self.insert_terminal(id, def.name.clone(), kind, def.extensions.clone())?
                }
            };
            outputs.push(terminal);
        }
        for stale in old_outputs.iter().filter(|t| !outputs.contains(t)) {
            self.destroy_terminal(*stale);
        }

        if let Some(node) = self.nodes.get_mut(&id) {
            node.inputs = inputs;
            node.outputs = outputs;
            node.data_inputs = step.data_inputs;
            node.data_outputs = step.data_outputs;
        }
        self.node_changed(id);
        self.redraw(id)?;
        Ok(())
    }

    fn find_terminal(&self, ids: &[TerminalId], name: &str) -> Option<TerminalId> {
        ids.iter()
            .find(|id| self.terminals.get(*id).is_some_and(|t| t.name == name))
            .copied()
    }

    /// Same terminal class: dataset vs collection, input vs output.
    fn same_class(&self, terminal: TerminalId, kind: &TerminalKind) -> bool {
        self.terminals.get(&terminal).is_some_and(|t| {
            std::mem::discriminant(&t.kind) == std::mem::discriminant(kind)
        })
    }

    fn retype_terminal(
        &mut self,
        terminal: TerminalId,
        kind: TerminalKind,
        datatypes: Vec<String>,
    ) {
        if let Some(t) = self.terminals.get_mut(&terminal) {
            if kind.is_multiple() {
                t.mapping = None;
            } else if t.mapping.is_none() {
                t.mapping = Some(TerminalMapping::default());
            }
            t.kind = kind;
            t.datatypes = datatypes;
        }
    }

    /// Put a node into a configuration error state.
    pub fn set_node_error(
        &mut self,
        id: NodeId,
        message: impl Into<String>,
    ) -> Result<(), EditorError> {
        let node = self.nodes.get_mut(&id).ok_or(EditorError::NodeNotFound(id))?;
        let message = message.into();
        tracing::warn!("{id} '{}' is misconfigured: {message}", node.name);
        node.error = Some(message);
        self.node_changed(id);
        Ok(())
    }

    /// Remove a node, destroying every connector on its terminals.
    pub fn remove_node(&mut self, id: NodeId) -> Result<(), EditorError> {
        let node = self.nodes.get(&id).ok_or(EditorError::NodeNotFound(id))?;
        let terminals: Vec<TerminalId> =
            node.inputs.iter().chain(&node.outputs).copied().collect();
        for terminal in terminals {
            self.destroy_terminal(terminal);
        }
        self.nodes.remove(&id);
        self.has_changes = true;
        self.emit(EditorEvent::NodeRemoved(id));
        tracing::debug!("removed {id}");
        Ok(())
    }

    pub fn remove_all(&mut self) {
        let ids: Vec<NodeId> = self.nodes.keys().copied().collect();
        for id in ids {
            let _ = self.remove_node(id);
        }
    }

    pub fn move_node(&mut self, id: NodeId, position: Position) -> Result<(), EditorError> {
        let node = self.nodes.get_mut(&id).ok_or(EditorError::NodeNotFound(id))?;
        node.position = position;
        self.node_changed(id);
        self.redraw(id)
    }

    /// Ask the UI to repaint a node and its connectors.
    pub fn redraw(&mut self, id: NodeId) -> Result<(), EditorError> {
        if !self.nodes.contains_key(&id) {
            return Err(EditorError::NodeNotFound(id));
        }
        self.emit(EditorEvent::Redraw(id));
        Ok(())
    }
}

fn input_kind(def: &InputDefinition) -> Result<TerminalKind, EditorError> {
    let collection_type = def.declared_collection_type()?;
    Ok(if def.is_collection() {
        TerminalKind::InputCollection { collection_type }
    } else {
        TerminalKind::InputDataset {
            multiple: def.multiple,
        }
    })
}

fn output_kind(def: &OutputDefinition) -> Result<TerminalKind, EditorError> {
    let collection_type = def.declared_collection_type()?;
    Ok(if def.collection {
        TerminalKind::OutputCollection { collection_type }
    } else {
        TerminalKind::OutputDataset
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::*;
    use mw_core::collection_type::CollectionType;

    #[test]
    fn add_node_builds_terminals_in_order() {
        let mut wf = workflow();
        let (id, inputs, outputs) = add(
            &mut wf,
            tool(
                "Align",
                vec![dataset_in("reads", "fastq"), multiple_in("refs", "txt")],
                vec![dataset_out("bam", "txt"), collection_out("split", "txt", "list")],
            ),
        );
        assert_eq!(wf.input_terminal(id, "reads"), Some(inputs[0]));
        assert_eq!(wf.input_terminal(id, "refs"), Some(inputs[1]));
        assert_eq!(wf.output_terminal(id, "split"), Some(outputs[1]));
        assert!(wf.terminal(inputs[1]).unwrap().mapping.is_none());
        assert_eq!(
            wf.terminal(outputs[1]).unwrap().kind.collection_type(),
            &CollectionType::parse("list").unwrap()
        );
        assert!(wf.has_changes());
    }

    #[test]
    fn add_node_rejects_malformed_declarations() {
        let mut wf = workflow();
        let bad = tool("Bad", vec![collection_in("in", "txt", Some("list::"))], vec![]);
        assert!(matches!(wf.add_node(bad), Err(EditorError::Step(_))));

        let dup = tool("Dup", vec![dataset_in("in", "txt"), dataset_in("in", "txt")], vec![]);
        assert!(wf.add_node(dup).is_err());

        let mut untyped = collection_out("out", "txt", "list");
        untyped.collection_type = None;
        assert!(wf.add_node(tool("Untyped", vec![], vec![untyped])).is_err());
        assert_eq!(wf.node_count(), 0);
    }

    #[test]
    fn exhausted_ids_fail_instead_of_wrapping() {
        let mut wf = workflow();
        wf.next_node = u32::MAX;
        let err = wf.add_node(tool("Last", vec![], vec![])).unwrap_err();
        assert!(matches!(err, EditorError::IdOverflow("node")));

        wf.next_node = 0;
        wf.next_terminal = u32::MAX;
        let err = wf
            .add_node(tool("Cat", vec![dataset_in("in", "txt")], vec![]))
            .unwrap_err();
        assert!(matches!(err, EditorError::IdOverflow("terminal")));
        assert_eq!(wf.node_count(), 0);
    }

    #[test]
    fn update_keeps_compatible_connections() {
        let mut wf = workflow();
        let src = dataset_source(&mut wf, "bed");
        let (id, inputs, _) = add(&mut wf, tool("Sort", vec![dataset_in("in", "tabular")], vec![]));
        let connector = wf.connect(src, inputs[0]).unwrap();

        wf.update_node(id, tool("Sort", vec![dataset_in("in", "txt")], vec![]))
            .unwrap();
        assert!(wf.connector(connector).is_some());
        assert_eq!(wf.node(id).unwrap().inputs, inputs);
    }

    #[test]
    fn update_drops_connections_the_new_datatypes_refuse() {
        let mut wf = workflow();
        let src = dataset_source(&mut wf, "txt");
        let (id, inputs, _) = add(&mut wf, tool("Sort", vec![dataset_in("in", "txt")], vec![]));
        let connector = wf.connect(src, inputs[0]).unwrap();

        wf.update_node(id, tool("Sort", vec![dataset_in("in", "bed")], vec![]))
            .unwrap();
        assert!(wf.connector(connector).is_none());
        assert!(!wf.terminal(src).unwrap().connected());
    }

    #[test]
    fn upstream_collection_type_change_invalidates_downstream() {
        let mut wf = workflow();
        let (split, _, outputs) = add(
            &mut wf,
            tool("Split", vec![], vec![collection_out("out", "txt", "list:paired")]),
        );
        let (_, inputs, downstream_out) = add(
            &mut wf,
            tool(
                "Align",
                vec![collection_in("reads", "txt", Some("paired"))],
                vec![dataset_out("bam", "txt")],
            ),
        );
        let connector = wf.connect(outputs[0], inputs[0]).unwrap();
        assert!(wf.map_over(downstream_out[0]).is_collection());

        wf.update_node(
            split,
            tool("Split", vec![], vec![collection_out("out", "txt", "list")]),
        )
        .unwrap();
        assert!(wf.connector(connector).is_none());
        assert_eq!(wf.map_over(inputs[0]), CollectionType::Null);
        assert_eq!(wf.map_over(downstream_out[0]), CollectionType::Null);
    }

    #[test]
    fn update_replaces_terminals_that_change_class() {
        let mut wf = workflow();
        let src = dataset_source(&mut wf, "txt");
        let (id, inputs, _) = add(&mut wf, tool("Zip", vec![dataset_in("in", "txt")], vec![]));
        let connector = wf.connect(src, inputs[0]).unwrap();

        wf.update_node(id, tool("Zip", vec![collection_in("in", "txt", Some("list"))], vec![]))
            .unwrap();
        assert!(wf.connector(connector).is_none());
        let fresh = wf.input_terminal(id, "in").unwrap();
        assert_ne!(fresh, inputs[0]);
        assert!(wf.terminal(inputs[0]).is_none());
        assert!(wf.terminal(fresh).unwrap().kind.is_collection());
    }

    #[test]
    fn update_removes_dropped_inputs() {
        let mut wf = workflow();
        let src = dataset_source(&mut wf, "txt");
        let (id, inputs, _) = add(
            &mut wf,
            tool("Cat", vec![dataset_in("a", "txt"), dataset_in("b", "txt")], vec![]),
        );
        wf.connect(src, inputs[1]).unwrap();

        wf.update_node(id, tool("Cat", vec![dataset_in("a", "txt")], vec![]))
            .unwrap();
        assert_eq!(wf.node(id).unwrap().inputs, vec![inputs[0]]);
        assert!(wf.input_terminal(id, "b").is_none());
        assert_eq!(wf.connector_count(), 0);
    }

    #[test]
    fn malformed_update_sets_node_error_and_keeps_terminals() {
        let mut wf = workflow();
        let (id, inputs, _) = add(&mut wf, tool("Zip", vec![dataset_in("in", "txt")], vec![]));

        let bad = tool("Zip", vec![collection_in("in", "txt", Some("list:"))], vec![]);
        assert!(wf.update_node(id, bad).is_err());
        assert!(wf.node(id).unwrap().error.is_some());
        assert_eq!(wf.node(id).unwrap().inputs, inputs);

        wf.update_node(id, tool("Zip", vec![dataset_in("in", "txt")], vec![]))
            .unwrap();
        assert!(wf.node(id).unwrap().error.is_none());
    }

    #[test]
    fn remove_node_destroys_connectors_and_resets_downstream() {
        let mut wf = workflow();
        let (split, _, outputs) = add(
            &mut wf,
            tool("Split", vec![], vec![collection_out("out", "txt", "list")]),
        );
        let (_, inputs, downstream_out) = add(
            &mut wf,
            tool("Gzip", vec![dataset_in("in", "txt")], vec![dataset_out("out", "txt")]),
        );
        wf.connect(outputs[0], inputs[0]).unwrap();
        assert!(wf.map_over(downstream_out[0]).is_collection());
        wf.drain_events();

        wf.remove_node(split).unwrap();
        assert!(wf.node(split).is_none());
        assert!(wf.terminal(outputs[0]).is_none());
        assert_eq!(wf.connector_count(), 0);
        assert_eq!(wf.map_over(inputs[0]), CollectionType::Null);
        assert_eq!(wf.map_over(downstream_out[0]), CollectionType::Null);
        assert!(wf.drain_events().contains(&EditorEvent::NodeRemoved(split)));
        assert!(matches!(
            wf.remove_node(split),
            Err(EditorError::NodeNotFound(_))
        ));
    }

    #[test]
    fn remove_all_empties_the_canvas() {
        let mut wf = workflow();
        let src = dataset_source(&mut wf, "txt");
        let (_, inputs, _) = add(&mut wf, tool("Cat", vec![dataset_in("in", "txt")], vec![]));
        wf.connect(src, inputs[0]).unwrap();

        wf.remove_all();
        assert_eq!(wf.node_count(), 0);
        assert_eq!(wf.connector_count(), 0);
    }

    #[test]
    fn move_node_requests_redraw() {
        let mut wf = workflow();
        let (id, _, _) = add(&mut wf, tool("Cat", vec![], vec![]));
        wf.mark_saved();
        wf.drain_events();

        wf.move_node(id, Position { left: 10.0, top: 20.0 }).unwrap();
        assert_eq!(wf.node(id).unwrap().position, Position { left: 10.0, top: 20.0 });
        assert!(wf.has_changes());
        assert_eq!(wf.drain_events().last(), Some(&EditorEvent::Redraw(id)));
    }
}
