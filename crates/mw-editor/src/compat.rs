//! Attachability: may this output feed that input?
//!
//! Pure predicates over the graph. They are evaluated on every drag-hover, on
//! every connect and whenever an existing connector is re-validated after a
//! type change upstream.

use crate::graph::{Terminal, TerminalKind, Workflow};
use mw_core::collection_type::CollectionType;
use mw_core::datatype::{is_wildcard, INPUT_COLLECTION_EXTENSION};

/// Collection type an output effectively produces: its declared type nested
/// inside whatever its node is currently mapped over.
pub fn produced_collection_type(output: &Terminal) -> CollectionType {
    let base = output.kind.collection_type().clone();
    let map_over = output.map_over();
    if !map_over.is_collection() {
        return base;
    }
    // Map-overs are only ever concrete paths, so the append cannot hit `Any`.
    map_over.append(&base).unwrap_or(base)
}

/// Outer levels an input collection must iterate to consume `output`.
pub fn effective_map_over(input: &Terminal, output: &Terminal) -> CollectionType {
    let declared = input.kind.collection_type();
    let produced = produced_collection_type(output);
    if declared.can_match(&produced) {
        CollectionType::Null
    } else {
        produced.effective_map_over(declared)
    }
}

/// Type an input collection currently expects, its map-over included.
pub fn effective_collection_type(input: &Terminal) -> CollectionType {
    let declared = input.kind.collection_type();
    input
        .map_over()
        .append(declared)
        .unwrap_or_else(|_| declared.clone())
}

/// Whether the output feeding `input`'s first connector delivers a collection.
pub fn collection_attached(wf: &Workflow, input: &Terminal) -> bool {
    let Some(first) = input.connectors.first() else {
        return false;
    };
    let Some(output) = wf.connector(*first).and_then(|c| wf.terminal(c.output)) else {
        return false;
    };
    output.kind.is_collection()
        || output.is_mapped_over()
        || output
            .datatypes
            .iter()
            .any(|ext| ext == INPUT_COLLECTION_EXTENSION)
}

/// A single input is filled once connected; a `multiple` input only once a
/// collection occupies it.
pub fn input_filled(wf: &Workflow, input: &Terminal) -> bool {
    if !input.connected() {
        return false;
    }
    !input.kind.is_multiple() || collection_attached(wf, input)
}

/// Individually attached datasets a `multiple` input is known to combine
/// correctly. Wider fan-in is accepted but flagged.
pub const PAIRWISE_FAN_IN: usize = 2;

/// Whether a `multiple` input holds more individually attached datasets than
/// [`PAIRWISE_FAN_IN`].
pub fn exceeds_pairwise_fan_in(wf: &Workflow, input: &Terminal) -> bool {
    input.kind.is_multiple()
        && !collection_attached(wf, input)
        && input.connectors.len() > PAIRWISE_FAN_IN
}

/// Map-over levels the rest of the node already committed to.
///
/// A mapped input constrains itself. Otherwise connected outputs pin the node
/// to their current map-over, and failing that every connected mapped input
/// contributes its own. A sibling collection input consuming its collection
/// whole contributes `Null`: the node is not iterating.
pub fn mapping_constraints(wf: &Workflow, input: &Terminal) -> Vec<CollectionType> {
    let map_over = input.map_over();
    if map_over.is_collection() {
        return vec![map_over.clone()];
    }
    if wf.has_connected_output_terminals(input.node) {
        return wf.first_output_map_over(input.node).into_iter().collect();
    }
    let mut constraints: Vec<CollectionType> = wf
        .connected_mapped_input_terminals(input.node)
        .into_iter()
        .filter_map(|id| wf.terminal(id))
        .map(|t| t.map_over().clone())
        .collect();
    let consumed_whole = wf
        .node(input.node)
        .into_iter()
        .flat_map(|n| &n.inputs)
        .filter_map(|id| wf.terminal(*id))
        .any(|t| {
            t.id != input.id && t.kind.is_collection() && t.connected() && !t.is_mapped_over()
        });
    if consumed_whole {
        constraints.push(CollectionType::Null);
    }
    constraints
}

/// Whether `output` produces an extension `input` accepts, after the
/// producing step's datatype-change actions have retagged it.
pub fn produces_acceptable_datatype(wf: &Workflow, input: &Terminal, output: &Terminal) -> bool {
    let mut produced: Vec<&str> = output.datatypes.iter().map(String::as_str).collect();
    if let Some(node) = wf.node(output.node) {
        produced.extend(
            node.post_job_actions
                .values()
                .filter_map(|action| action.retagged_extension(&output.name)),
        );
    }

    input.datatypes.iter().any(|accepted| {
        is_wildcard(accepted)
            || produced
                .iter()
                .any(|ext| is_wildcard(ext) || wf.datatypes().is_subtype(ext, accepted))
    })
}

/// The connection rule, ignoring whether `input` still has room.
pub fn attachable(wf: &Workflow, input: &Terminal, output: &Terminal) -> bool {
    if !output.kind.is_output() {
        return false;
    }
    match &input.kind {
        TerminalKind::InputDataset { multiple } => {
            dataset_attachable(wf, input, *multiple, output)
        }
        TerminalKind::InputCollection { .. } => collection_attachable(wf, input, output),
        TerminalKind::OutputDataset | TerminalKind::OutputCollection { .. } => false,
    }
}

fn dataset_attachable(wf: &Workflow, input: &Terminal, multiple: bool, output: &Terminal) -> bool {
    let produced = produced_collection_type(output);
    let map_over = input.map_over();

    if !produced.is_collection() {
        return !map_over.is_collection() && produces_acceptable_datatype(wf, input, output);
    }

    if multiple {
        // A flat collection may stand in for several datasets, but never next
        // to datasets already attached individually.
        if input.connected() && !collection_attached(wf, input) {
            return false;
        }
        return produced.rank() == 1 && produces_acceptable_datatype(wf, input, output);
    }

    if map_over.is_collection() && map_over.can_match(&produced) {
        return produces_acceptable_datatype(wf, input, output);
    }

    mapping_constraints(wf, input)
        .iter()
        .all(|constraint| produced.can_match(constraint))
        && produces_acceptable_datatype(wf, input, output)
}

fn collection_attachable(wf: &Workflow, input: &Terminal, output: &Terminal) -> bool {
    let produced = produced_collection_type(output);
    if !produced.is_collection() {
        return false;
    }

    if effective_collection_type(input).can_match(&produced) {
        // Consumed whole, so no sibling may be iterating.
        if !input.is_mapped_over()
            && mapping_constraints(wf, input)
                .iter()
                .any(CollectionType::is_collection)
        {
            return false;
        }
        return produces_acceptable_datatype(wf, input, output);
    }
    if input.is_mapped_over() {
        return false;
    }
    if !produced.can_map_over(input.kind.collection_type()) {
        return false;
    }

    let map_over = effective_map_over(input, output);
    if !map_over.is_collection() {
        return false;
    }
    mapping_constraints(wf, input)
        .iter()
        .all(|constraint| map_over.can_match(constraint))
        && produces_acceptable_datatype(wf, input, output)
}

/// Full drop-target check: room left on `input` and the connection rule holds.
pub fn can_accept(wf: &Workflow, input: &Terminal, output: &Terminal) -> bool {
    if !input.kind.is_input() || input_filled(wf, input) {
        return false;
    }
    let duplicate = input.connectors.iter().any(|id| {
        wf.connector(*id)
            .is_some_and(|c| c.output == output.id)
    });
    !duplicate && attachable(wf, input, output)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
