//! Graph storage: nodes, terminals and connectors addressed by arena ids.
//!
//! A node owns its terminals by id, a terminal lists its connectors by id and
//! a connector names its two terminals. Nothing holds a reference into the
//! arenas, so a cascade can freely remove entries while it walks them.

use crate::config::EditorConfig;
use crate::layout::Size;
use mw_core::collection_type::CollectionType;
use mw_core::datatype::DatatypeRegistry;
use mw_core::simple::Position;
use mw_core::step::{InputDefinition, OutputDefinition, PostJobAction, StepType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

static NULL_MAP_OVER: CollectionType = CollectionType::Null;

// ---------------------------------------------------------------------------
// Ids
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TerminalId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectorId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

impl fmt::Display for TerminalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "terminal#{}", self.0)
    }
}

impl fmt::Display for ConnectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "connector#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Terminal
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalKind {
    InputDataset { multiple: bool },
    InputCollection { collection_type: CollectionType },
    OutputDataset,
    OutputCollection { collection_type: CollectionType },
}

impl TerminalKind {
    pub fn is_input(&self) -> bool {
        matches!(
            self,
            TerminalKind::InputDataset { .. } | TerminalKind::InputCollection { .. }
        )
    }

    pub fn is_output(&self) -> bool {
        !self.is_input()
    }

    /// Whether the terminal itself is declared as a collection.
    pub fn is_collection(&self) -> bool {
        matches!(
            self,
            TerminalKind::InputCollection { .. } | TerminalKind::OutputCollection { .. }
        )
    }

    pub fn is_multiple(&self) -> bool {
        matches!(self, TerminalKind::InputDataset { multiple: true })
    }

    /// The declared collection type, `Null` for dataset terminals.
    pub fn collection_type(&self) -> &CollectionType {
        match self {
            TerminalKind::InputCollection { collection_type }
            | TerminalKind::OutputCollection { collection_type } => collection_type,
            _ => &NULL_MAP_OVER,
        }
    }
}

/// Map-over state of one terminal: the outer collection levels iterated
/// implicitly around the terminal's declared type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TerminalMapping {
    pub map_over: CollectionType,
}

#[derive(Debug, Clone)]
pub struct Terminal {
    pub id: TerminalId,
    pub node: NodeId,
    pub name: String,
    pub kind: TerminalKind,
    /// Accepted (inputs) or produced (outputs) extensions.
    pub datatypes: Vec<String>,
    pub connectors: Vec<ConnectorId>,
    /// Absent for `multiple` inputs, which never map over.
    pub mapping: Option<TerminalMapping>,
}

impl Terminal {
    pub fn map_over(&self) -> &CollectionType {
        self.mapping
            .as_ref()
            .map(|m| &m.map_over)
            .unwrap_or(&NULL_MAP_OVER)
    }

    pub fn is_mapped_over(&self) -> bool {
        self.map_over().is_collection()
    }

    pub fn connected(&self) -> bool {
        !self.connectors.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Connector
// ---------------------------------------------------------------------------

/// A directed edge from an output terminal to an input terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connector {
    pub id: ConnectorId,
    pub output: TerminalId,
    pub input: TerminalId,
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub step_type: StepType,
    pub name: String,
    pub tool_id: Option<String>,
    pub tool_state: Option<serde_json::Value>,
    pub tool_errors: Option<serde_json::Value>,
    pub annotation: Option<String>,
    pub label: Option<String>,
    pub uuid: Uuid,
    pub post_job_actions: BTreeMap<String, PostJobAction>,
    pub workflow_outputs: Vec<String>,

    /// Declaration order is significant: the first output defines the node's
    /// map-over constraint.
    pub inputs: Vec<TerminalId>,
    pub outputs: Vec<TerminalId>,

    /// Definitions the terminals were built from, kept for persistence.
    pub data_inputs: Vec<InputDefinition>,
    pub data_outputs: Vec<OutputDefinition>,

    pub position: Position,
    pub size: Size,

    /// Node-level configuration error shown instead of the tool form.
    pub error: Option<String>,
}

impl Node {
    pub fn is_tool(&self) -> bool {
        self.step_type == StepType::Tool
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Visual side effects for the UI to apply after an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorEvent {
    NodeChanged(NodeId),
    NodeRemoved(NodeId),
    ConnectorAdded(ConnectorId),
    ConnectorRemoved(ConnectorId),
    MappingChanged {
        terminal: TerminalId,
        map_over: CollectionType,
    },
    Redraw(NodeId),
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct Workflow {
    pub name: Option<String>,
    pub(crate) config: EditorConfig,
    pub(crate) datatypes: DatatypeRegistry,
    pub(crate) nodes: BTreeMap<NodeId, Node>,
    pub(crate) terminals: BTreeMap<TerminalId, Terminal>,
    pub(crate) connectors: BTreeMap<ConnectorId, Connector>,
    pub(crate) next_node: u32,
    pub(crate) next_terminal: u32,
    pub(crate) next_connector: u32,
    pub(crate) has_changes: bool,
    pub(crate) events: Vec<EditorEvent>,
}

impl Workflow {
    pub fn new(config: EditorConfig, datatypes: DatatypeRegistry) -> Self {
        Self {
            config,
            datatypes,
            ..Default::default()
        }
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn datatypes(&self) -> &DatatypeRegistry {
        &self.datatypes
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn terminal(&self, id: TerminalId) -> Option<&Terminal> {
        self.terminals.get(&id)
    }

    pub fn connector(&self, id: ConnectorId) -> Option<&Connector> {
        self.connectors.get(&id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn connectors(&self) -> impl Iterator<Item = &Connector> {
        self.connectors.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn connector_count(&self) -> usize {
        self.connectors.len()
    }

    /// Look up a node's input terminal by name.
    pub fn input_terminal(&self, node: NodeId, name: &str) -> Option<TerminalId> {
        self.named_terminal(self.nodes.get(&node)?.inputs.iter(), name)
    }

    /// Look up a node's output terminal by name.
    pub fn output_terminal(&self, node: NodeId, name: &str) -> Option<TerminalId> {
        self.named_terminal(self.nodes.get(&node)?.outputs.iter(), name)
    }

    fn named_terminal<'a>(
        &self,
        mut ids: impl Iterator<Item = &'a TerminalId>,
        name: &str,
    ) -> Option<TerminalId> {
        ids.find(|id| self.terminals.get(*id).is_some_and(|t| t.name == name))
            .copied()
    }

    /// Current map-over of a terminal (`Null` for unknown terminals).
    pub fn map_over(&self, terminal: TerminalId) -> CollectionType {
        self.terminals
            .get(&terminal)
            .map(|t| t.map_over().clone())
            .unwrap_or_default()
    }

    /// Whether anything changed since the last [`Workflow::mark_saved`].
    pub fn has_changes(&self) -> bool {
        self.has_changes
    }

    pub fn mark_saved(&mut self) {
        self.has_changes = false;
    }

    /// Take every event queued since the previous drain.
    pub fn drain_events(&mut self) -> Vec<EditorEvent> {
        std::mem::take(&mut self.events)
    }

    pub(crate) fn emit(&mut self, event: EditorEvent) {
        if self.events.last() != Some(&event) {
            self.events.push(event);
        }
    }

    pub(crate) fn node_changed(&mut self, node: NodeId) {
        self.has_changes = true;
        self.emit(EditorEvent::NodeChanged(node));
    }

    // -----------------------------------------------------------------------
    // Node-level terminal queries
    // -----------------------------------------------------------------------

    fn node_terminals<'a>(
        &'a self,
        ids: &'a [TerminalId],
    ) -> impl Iterator<Item = &'a Terminal> + 'a {
        ids.iter().filter_map(|id| self.terminals.get(id))
    }

    fn inputs_of(&self, node: NodeId) -> impl Iterator<Item = &Terminal> {
        let ids: &[TerminalId] = self
            .nodes
            .get(&node)
            .map_or(&[][..], |n| n.inputs.as_slice());
        self.node_terminals(ids)
    }

    fn outputs_of(&self, node: NodeId) -> impl Iterator<Item = &Terminal> {
        let ids: &[TerminalId] = self
            .nodes
            .get(&node)
            .map_or(&[][..], |n| n.outputs.as_slice());
        self.node_terminals(ids)
    }

    pub fn has_connected_output_terminals(&self, node: NodeId) -> bool {
        self.outputs_of(node).any(Terminal::connected)
    }

    pub fn connected_output_terminals(&self, node: NodeId) -> Vec<TerminalId> {
        self.outputs_of(node)
            .filter(|t| t.connected())
            .map(|t| t.id)
            .collect()
    }

    pub fn connected_mapped_input_terminals(&self, node: NodeId) -> Vec<TerminalId> {
        self.inputs_of(node)
            .filter(|t| t.connected() && t.is_mapped_over())
            .map(|t| t.id)
            .collect()
    }

    pub fn has_connected_mapped_input_terminals(&self, node: NodeId) -> bool {
        self.inputs_of(node)
            .any(|t| t.connected() && t.is_mapped_over())
    }

    pub fn mapped_input_terminals(&self, node: NodeId) -> Vec<TerminalId> {
        self.inputs_of(node)
            .filter(|t| t.is_mapped_over())
            .map(|t| t.id)
            .collect()
    }

    pub fn has_mapped_over_input_terminals(&self, node: NodeId) -> bool {
        self.inputs_of(node).any(Terminal::is_mapped_over)
    }

    /// Map-over of the node's first output, if it has any outputs.
    pub(crate) fn first_output_map_over(&self, node: NodeId) -> Option<CollectionType> {
        self.outputs_of(node).next().map(|t| t.map_over().clone())
    }
}
