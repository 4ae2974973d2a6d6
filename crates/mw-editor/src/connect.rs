//! Connect / disconnect: connector lifecycle and the map-over cascade.
//!
//! Connecting may push a map-over onto the input and from there onto every
//! output of its node. Disconnecting walks the same path backwards: mappings
//! that nothing justifies any more are reset, and downstream connectors that
//! stop satisfying the connection rule are destroyed on the spot.

use crate::compat;
use crate::graph::{Connector, ConnectorId, EditorEvent, TerminalId, TerminalKind, Workflow};
use crate::EditorError;
use mw_core::collection_type::CollectionType;

impl Workflow {
    /// Drop-target check used while dragging a connector over `input`.
    pub fn can_accept(&self, input: TerminalId, output: TerminalId) -> bool {
        match (self.terminal(input), self.terminal(output)) {
            (Some(i), Some(o)) => compat::can_accept(self, i, o),
            _ => false,
        }
    }

    /// The connection rule alone, regardless of free capacity on `input`.
    pub fn attachable(&self, input: TerminalId, output: TerminalId) -> bool {
        match (self.terminal(input), self.terminal(output)) {
            (Some(i), Some(o)) => compat::attachable(self, i, o),
            _ => false,
        }
    }

    /// Connect `output` to `input`, propagating map-over state.
    pub fn connect(
        &mut self,
        output: TerminalId,
        input: TerminalId,
    ) -> Result<ConnectorId, EditorError> {
        let out = self
            .terminal(output)
            .ok_or(EditorError::TerminalNotFound(output))?;
        if !out.kind.is_output() {
            return Err(EditorError::NotAnOutput(output));
        }
        let inp = self
            .terminal(input)
            .ok_or(EditorError::TerminalNotFound(input))?;
        if !inp.kind.is_input() {
            return Err(EditorError::NotAnInput(input));
        }
        if !compat::can_accept(self, inp, out) {
            tracing::debug!("rejected connection {output} -> {input}");
            return Err(EditorError::NotAttachable { output, input });
        }
        self.link(output, input)
    }

    /// Create a connector without checking the connection rule.
    pub(crate) fn link(
        &mut self,
        output: TerminalId,
        input: TerminalId,
    ) -> Result<ConnectorId, EditorError> {
        let id = ConnectorId(self.next_connector);
        self.next_connector = self
            .next_connector
            .checked_add(1)
            .ok_or(EditorError::IdOverflow("connector"))?;
        self.connectors.insert(id, Connector { id, output, input });
        self.emit(EditorEvent::ConnectorAdded(id));

        self.attach(output, id);
        self.attach(input, id);

        tracing::debug!("connected {output} -> {input} as {id}");
        Ok(id)
    }

    fn attach(&mut self, terminal: TerminalId, connector: ConnectorId) {
        let Some(t) = self.terminals.get_mut(&terminal) else {
            return;
        };
        t.connectors.push(connector);
        let node = t.node;
        self.node_changed(node);

        let (Some(t), Some(c)) = (self.terminals.get(&terminal), self.connectors.get(&connector))
        else {
            return;
        };
        if !t.kind.is_input() {
            return;
        }
        if compat::exceeds_pairwise_fan_in(self, t) {
            tracing::warn!(
                "{terminal} on {} combines {} datasets; only pairwise fan-in is well defined",
                t.node,
                t.connectors.len()
            );
        }
        let Some(output) = self.terminals.get(&c.output) else {
            return;
        };
        let map_over = match t.kind {
            TerminalKind::InputDataset { .. } => {
                let produced = compat::produced_collection_type(output);
                if !produced.is_collection() {
                    return;
                }
                produced
            }
            TerminalKind::InputCollection { .. } => compat::effective_map_over(t, output),
            TerminalKind::OutputDataset | TerminalKind::OutputCollection { .. } => return,
        };
        self.set_map_over(terminal, map_over);
    }

    /// Remove a connector and re-evaluate the mappings it justified.
    pub fn disconnect(&mut self, connector: ConnectorId) -> Result<(), EditorError> {
        if !self.connectors.contains_key(&connector) {
            return Err(EditorError::ConnectorNotFound(connector));
        }
        self.destroy_connector(connector);
        Ok(())
    }

    pub(crate) fn destroy_connector(&mut self, connector: ConnectorId) {
        let Some(c) = self.connectors.remove(&connector) else {
            return;
        };
        self.emit(EditorEvent::ConnectorRemoved(connector));
        tracing::debug!("disconnected {} -> {} ({connector})", c.output, c.input);
        self.detach(c.output, connector);
        self.detach(c.input, connector);
    }

    fn detach(&mut self, terminal: TerminalId, connector: ConnectorId) {
        let Some(t) = self.terminals.get_mut(&terminal) else {
            return;
        };
        t.connectors.retain(|c| *c != connector);
        let node = t.node;
        self.node_changed(node);
        self.reset_mapping_if_needed(terminal);
    }

    /// Destroy every connector on `terminal` that no longer satisfies the rule.
    pub fn destroy_invalid_connections(
        &mut self,
        terminal: TerminalId,
    ) -> Result<(), EditorError> {
        let connectors = self
            .terminal(terminal)
            .ok_or(EditorError::TerminalNotFound(terminal))?
            .connectors
            .clone();
        for connector in connectors {
            self.destroy_if_invalid(connector);
        }
        Ok(())
    }

    pub(crate) fn destroy_if_invalid(&mut self, connector: ConnectorId) {
        let Some(c) = self.connectors.get(&connector).copied() else {
            return;
        };
        if !self.attachable(c.input, c.output) {
            tracing::debug!("dropping invalidated {connector}");
            self.destroy_connector(connector);
        }
    }

    // -----------------------------------------------------------------------
    // Map-over
    // -----------------------------------------------------------------------

    /// Set a terminal's map-over and mirror it onto every output of its node.
    pub(crate) fn set_map_over(&mut self, terminal: TerminalId, map_over: CollectionType) {
        let Some(t) = self.terminals.get_mut(&terminal) else {
            return;
        };
        let node = t.node;
        let Some(mapping) = t.mapping.as_mut() else {
            return;
        };
        if mapping.map_over == map_over {
            return;
        }
        mapping.map_over = map_over.clone();
        self.emit(EditorEvent::MappingChanged {
            terminal,
            map_over: map_over.clone(),
        });

        let outputs = self
            .nodes
            .get(&node)
            .map(|n| n.outputs.clone())
            .unwrap_or_default();
        for output in outputs {
            self.set_map_over(output, map_over.clone());
        }
    }

    fn disable_map_over(&mut self, terminal: TerminalId) {
        let Some(mapping) = self
            .terminals
            .get_mut(&terminal)
            .and_then(|t| t.mapping.as_mut())
        else {
            return;
        };
        if mapping.map_over.is_collection() {
            mapping.map_over = CollectionType::Null;
            self.emit(EditorEvent::MappingChanged {
                terminal,
                map_over: CollectionType::Null,
            });
        }
    }

    /// Clear a terminal's map-over and cascade the reset downstream.
    pub fn reset_mapping(&mut self, terminal: TerminalId) -> Result<(), EditorError> {
        if !self.terminals.contains_key(&terminal) {
            return Err(EditorError::TerminalNotFound(terminal));
        }
        self.reset_terminal_mapping(terminal);
        Ok(())
    }

    /// Reset a mapped terminal that has no connectors left, the action behind
    /// clicking a stale map-over badge. Returns whether anything was reset.
    pub fn clear_unconnected_mapping(
        &mut self,
        terminal: TerminalId,
    ) -> Result<bool, EditorError> {
        let t = self
            .terminal(terminal)
            .ok_or(EditorError::TerminalNotFound(terminal))?;
        if t.connected() || !t.is_mapped_over() {
            return Ok(false);
        }
        self.reset_terminal_mapping(terminal);
        Ok(true)
    }

    fn reset_terminal_mapping(&mut self, terminal: TerminalId) {
        let Some(t) = self.terminals.get(&terminal) else {
            return;
        };
        let node = t.node;

        if t.kind.is_input() {
            self.disable_map_over(terminal);
            if !self.has_mapped_over_input_terminals(node) {
                let outputs = self
                    .nodes
                    .get(&node)
                    .map(|n| n.outputs.clone())
                    .unwrap_or_default();
                for output in outputs {
                    self.reset_terminal_mapping(output);
                }
            }
        } else {
            let connectors = t.connectors.clone();
            self.disable_map_over(terminal);
            for connector in connectors {
                let Some(c) = self.connectors.get(&connector).copied() else {
                    continue;
                };
                self.reset_mapping_if_needed(c.input);
                self.destroy_if_invalid(connector);
            }
        }
    }

    /// Reset the terminal's mapping when nothing on its node still needs it.
    pub(crate) fn reset_mapping_if_needed(&mut self, terminal: TerminalId) {
        let Some(t) = self.terminals.get(&terminal) else {
            return;
        };
        let node = t.node;

        if t.kind.is_input() {
            if !t.is_mapped_over() {
                return;
            }
            if self.has_connected_mapped_input_terminals(node)
                || !self.has_connected_output_terminals(node)
            {
                self.reset_terminal_mapping(terminal);
            }
        } else {
            if !self.has_connected_output_terminals(node)
                && !self.has_connected_mapped_input_terminals(node)
            {
                for input in self.mapped_input_terminals(node) {
                    self.reset_mapping_if_needed(input);
                }
            }
            if !self.has_mapped_over_input_terminals(node) {
                self.reset_terminal_mapping(terminal);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::*;

    fn ct(raw: &str) -> CollectionType {
        CollectionType::parse(raw).unwrap()
    }

    #[test]
    fn matching_collection_connects_without_map_over() {
        let mut wf = workflow();
        let list = collection_source(&mut wf, "list");
        let (_, inputs, outputs) = add(
            &mut wf,
            tool("Zip", vec![collection_in("in", "txt", Some("list"))], vec![dataset_out("out", "txt")]),
        );

        wf.connect(list, inputs[0]).unwrap();
        assert_eq!(wf.map_over(inputs[0]), CollectionType::Null);
        assert_eq!(wf.map_over(outputs[0]), CollectionType::Null);
    }

    #[test]
    fn nested_collection_maps_over_and_propagates_to_outputs() {
        let mut wf = workflow();
        let pairs = collection_source(&mut wf, "list:paired");
        let (_, inputs, outputs) = add(
            &mut wf,
            tool(
                "Align",
                vec![collection_in("reads", "txt", Some("paired"))],
                vec![dataset_out("bam", "txt"), dataset_out("log", "txt")],
            ),
        );

        wf.connect(pairs, inputs[0]).unwrap();
        assert_eq!(wf.map_over(inputs[0]), ct("list"));
        assert_eq!(wf.map_over(outputs[0]), ct("list"));
        assert_eq!(wf.map_over(outputs[1]), ct("list"));

        let events = wf.drain_events();
        assert!(events.contains(&EditorEvent::MappingChanged {
            terminal: inputs[0],
            map_over: ct("list"),
        }));
    }

    #[test]
    fn incompatible_collection_is_rejected() {
        let mut wf = workflow();
        let list = collection_source(&mut wf, "list");
        let (_, inputs, _) = add(
            &mut wf,
            tool("Align", vec![collection_in("reads", "txt", Some("paired"))], vec![]),
        );

        assert!(!wf.can_accept(inputs[0], list));
        let err = wf.connect(list, inputs[0]).unwrap_err();
        assert!(matches!(err, EditorError::NotAttachable { .. }));
        assert_eq!(wf.connector_count(), 0);
        assert!(!wf.terminal(inputs[0]).unwrap().connected());
    }

    #[test]
    fn untyped_collection_input_accepts_any_collection_but_no_dataset() {
        let mut wf = workflow();
        let nested = collection_source(&mut wf, "list:list:paired");
        let plain = dataset_source(&mut wf, "txt");
        let (_, inputs, _) = add(&mut wf, tool("Any", vec![collection_in("in", "txt", None)], vec![]));

        assert!(!wf.can_accept(inputs[0], plain));
        wf.connect(nested, inputs[0]).unwrap();
        assert_eq!(wf.map_over(inputs[0]), CollectionType::Null);
    }

    #[test]
    fn dataset_input_maps_over_any_collection() {
        let mut wf = workflow();
        let nested = collection_source(&mut wf, "list:paired");
        let (_, inputs, outputs) = add(
            &mut wf,
            tool("Gzip", vec![dataset_in("in", "txt")], vec![dataset_out("out", "txt")]),
        );

        wf.connect(nested, inputs[0]).unwrap();
        assert_eq!(wf.map_over(inputs[0]), ct("list:paired"));
        assert_eq!(wf.map_over(outputs[0]), ct("list:paired"));
    }

    #[test]
    fn disconnect_resets_map_over_and_reconnect_restores_it() {
        let mut wf = workflow();
        let pairs = collection_source(&mut wf, "list:paired");
        let (_, inputs, outputs) = add(
            &mut wf,
            tool(
                "Align",
                vec![collection_in("reads", "txt", Some("paired"))],
                vec![dataset_out("bam", "txt")],
            ),
        );

        let connector = wf.connect(pairs, inputs[0]).unwrap();
        wf.disconnect(connector).unwrap();
        assert_eq!(wf.map_over(inputs[0]), CollectionType::Null);
        assert_eq!(wf.map_over(outputs[0]), CollectionType::Null);
        assert!(wf.disconnect(connector).is_err());

        wf.connect(pairs, inputs[0]).unwrap();
        assert_eq!(wf.map_over(inputs[0]), ct("list"));
        assert_eq!(wf.map_over(outputs[0]), ct("list"));
    }

    /// A node with a `paired` collection input `a`, a plain dataset input `b`
    /// and a `paired` collection input `c`, whose `a` is fed `list:paired`.
    fn mapped_node(wf: &mut Workflow) -> (TerminalId, TerminalId, TerminalId, TerminalId) {
        let pairs = collection_source(wf, "list:paired");
        let (_, inputs, outputs) = add(
            wf,
            tool(
                "Merge",
                vec![
                    collection_in("a", "txt", Some("paired")),
                    dataset_in("b", "txt"),
                    collection_in("c", "txt", Some("paired")),
                ],
                vec![dataset_out("out", "txt")],
            ),
        );
        wf.connect(pairs, inputs[0]).unwrap();
        (inputs[0], inputs[1], inputs[2], outputs[0])
    }

    #[test]
    fn other_inputs_must_map_over_in_lockstep() {
        let mut wf = workflow();
        let (a, b, _, out) = mapped_node(&mut wf);
        assert_eq!(wf.map_over(a), ct("list"));
        assert_eq!(wf.map_over(out), ct("list"));

        let pair = collection_source(&mut wf, "paired");
        let list = collection_source(&mut wf, "list");
        assert!(!wf.can_accept(b, pair));
        assert!(wf.can_accept(b, list));

        wf.connect(list, b).unwrap();
        assert_eq!(wf.map_over(b), ct("list"));
    }

    #[test]
    fn collection_input_must_share_the_node_map_over() {
        let mut wf = workflow();
        let (_, _, c, _) = mapped_node(&mut wf);

        let same = collection_source(&mut wf, "list:paired");
        let deeper = collection_source(&mut wf, "list:list:paired");
        let plain = collection_source(&mut wf, "paired");
        assert!(!wf.can_accept(c, plain));
        assert!(!wf.can_accept(c, deeper));
        assert!(wf.can_accept(c, same));

        wf.connect(same, c).unwrap();
        assert_eq!(wf.map_over(c), ct("list"));
    }

    #[test]
    fn whole_collection_input_blocks_mapping_siblings() {
        let mut wf = workflow();
        let (_, inputs, out) = add(
            &mut wf,
            tool(
                "Merge",
                vec![
                    collection_in("a", "txt", Some("paired")),
                    dataset_in("b", "txt"),
                    collection_in("c", "txt", Some("paired")),
                ],
                vec![dataset_out("out", "txt")],
            ),
        );
        let pair = collection_source(&mut wf, "paired");
        wf.connect(pair, inputs[0]).unwrap();
        assert_eq!(wf.map_over(out[0]), CollectionType::Null);

        let pairs = collection_source(&mut wf, "list:paired");
        let list = collection_source(&mut wf, "list");
        let plain = dataset_source(&mut wf, "txt");
        let other_pair = collection_source(&mut wf, "paired");
        assert!(!wf.can_accept(inputs[2], pairs));
        assert!(!wf.can_accept(inputs[1], list));
        assert!(wf.can_accept(inputs[1], plain));
        assert!(wf.can_accept(inputs[2], other_pair));
    }

    #[test]
    fn connected_outputs_pin_the_node_map_over() {
        let mut wf = workflow();
        let (node, inputs, outputs) = add(
            &mut wf,
            tool("Gzip", vec![dataset_in("in", "txt")], vec![dataset_out("out", "txt")]),
        );
        let (_, downstream, _) = add(&mut wf, tool("Cat", vec![dataset_in("in", "txt")], vec![]));
        wf.connect(outputs[0], downstream[0]).unwrap();
        assert!(wf.has_connected_output_terminals(node));

        // The unmapped output already feeds a plain dataset, so only
        // datasets may arrive here.
        let list = collection_source(&mut wf, "list");
        let plain = dataset_source(&mut wf, "txt");
        assert!(!wf.can_accept(inputs[0], list));
        assert!(wf.can_accept(inputs[0], plain));
    }

    #[test]
    fn mapped_outputs_feed_downstream_map_over() {
        let mut wf = workflow();
        let pairs = collection_source(&mut wf, "list:paired");
        let (_, b_in, b_out) = add(
            &mut wf,
            tool(
                "Align",
                vec![collection_in("reads", "txt", Some("paired"))],
                vec![dataset_out("bam", "txt")],
            ),
        );
        let (_, c_in, c_out) = add(
            &mut wf,
            tool("Sort", vec![dataset_in("in", "txt")], vec![dataset_out("out", "txt")]),
        );

        wf.connect(pairs, b_in[0]).unwrap();
        wf.connect(b_out[0], c_in[0]).unwrap();
        assert_eq!(wf.map_over(c_in[0]), ct("list"));
        assert_eq!(wf.map_over(c_out[0]), ct("list"));
    }

    #[test]
    fn stale_mapping_is_kept_while_downstream_depends_on_it() {
        let mut wf = workflow();
        let pairs = collection_source(&mut wf, "list:paired");
        let (_, b_in, b_out) = add(
            &mut wf,
            tool(
                "Align",
                vec![collection_in("reads", "txt", Some("paired"))],
                vec![dataset_out("bam", "txt")],
            ),
        );
        let (_, c_in, c_out) = add(
            &mut wf,
            tool("Sort", vec![dataset_in("in", "txt")], vec![dataset_out("out", "txt")]),
        );
        let upstream = wf.connect(pairs, b_in[0]).unwrap();
        let downstream = wf.connect(b_out[0], c_in[0]).unwrap();

        wf.disconnect(upstream).unwrap();
        assert_eq!(wf.map_over(b_in[0]), ct("list"));

        assert!(wf.clear_unconnected_mapping(b_in[0]).unwrap());
        assert_eq!(wf.map_over(b_in[0]), CollectionType::Null);
        assert_eq!(wf.map_over(b_out[0]), CollectionType::Null);
        assert_eq!(wf.map_over(c_in[0]), CollectionType::Null);
        assert_eq!(wf.map_over(c_out[0]), CollectionType::Null);
        // A plain dataset still satisfies the downstream input.
        assert!(wf.connector(downstream).is_some());

        assert!(!wf.clear_unconnected_mapping(b_in[0]).unwrap());
    }

    #[test]
    fn reset_destroys_connectors_that_needed_the_map_over() {
        let mut wf = workflow();
        let pairs = collection_source(&mut wf, "list:paired");
        let (_, b_in, b_out) = add(
            &mut wf,
            tool(
                "Align",
                vec![collection_in("reads", "txt", Some("paired"))],
                vec![dataset_out("bam", "txt")],
            ),
        );
        let (_, c_in, _) = add(
            &mut wf,
            tool("Merge", vec![collection_in("in", "txt", Some("list"))], vec![]),
        );
        let upstream = wf.connect(pairs, b_in[0]).unwrap();
        // The mapped dataset output now yields a list.
        let downstream = wf.connect(b_out[0], c_in[0]).unwrap();

        wf.disconnect(upstream).unwrap();
        wf.clear_unconnected_mapping(b_in[0]).unwrap();
        assert!(wf.connector(downstream).is_none());
        assert!(!wf.terminal(c_in[0]).unwrap().connected());
        assert!(wf
            .drain_events()
            .contains(&EditorEvent::ConnectorRemoved(downstream)));
    }

    #[test]
    fn explicit_reset_clears_the_whole_node() {
        let mut wf = workflow();
        let (a, _, _, out) = mapped_node(&mut wf);
        wf.reset_mapping(a).unwrap();
        assert_eq!(wf.map_over(a), CollectionType::Null);
        assert_eq!(wf.map_over(out), CollectionType::Null);
        assert!(wf.reset_mapping(TerminalId(999)).is_err());
    }

    #[test]
    fn connect_fails_cleanly_when_connector_ids_run_out() {
        let mut wf = workflow();
        let out = dataset_source(&mut wf, "txt");
        let (_, inputs, _) = add(&mut wf, tool("Cat", vec![dataset_in("in", "txt")], vec![]));
        wf.next_connector = u32::MAX;

        assert!(matches!(
            wf.connect(out, inputs[0]),
            Err(EditorError::IdOverflow("connector"))
        ));
        assert_eq!(wf.connector_count(), 0);
        assert!(!wf.terminal(inputs[0]).unwrap().connected());
    }

    #[test]
    fn connect_reports_missing_terminals() {
        let mut wf = workflow();
        let out = dataset_source(&mut wf, "txt");
        assert!(matches!(
            wf.connect(out, TerminalId(42)),
            Err(EditorError::TerminalNotFound(TerminalId(42)))
        ));
        assert!(matches!(
            wf.connect(TerminalId(42), out),
            Err(EditorError::TerminalNotFound(TerminalId(42)))
        ));
    }
}
