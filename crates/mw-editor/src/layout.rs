//! Automatic layout: one column per dependency level.

use crate::graph::{EditorEvent, NodeId, Workflow};
use crate::EditorError;
use mw_core::simple::Position;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Default for Size {
    fn default() -> Self {
        Self {
            width: 150.0,
            height: 80.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Bounds {
    pub xmin: f64,
    pub xmax: f64,
    pub ymin: f64,
    pub ymax: f64,
}

impl Workflow {
    /// Group nodes into dependency levels (Kahn's algorithm).
    ///
    /// Level 0 holds the nodes with no incoming connectors; each following level
    /// holds the nodes whose upstream nodes all sit in earlier levels.
    pub fn levels(&self) -> Result<Vec<Vec<NodeId>>, EditorError> {
        let mut in_degree: BTreeMap<NodeId, usize> =
            self.nodes.keys().map(|id| (*id, 0)).collect();
        let mut children: BTreeMap<NodeId, Vec<NodeId>> = BTreeMap::new();

        for connector in self.connectors.values() {
            let (Some(output), Some(input)) = (
                self.terminals.get(&connector.output),
                self.terminals.get(&connector.input),
            ) else {
                continue;
            };
            *in_degree.entry(input.node).or_default() += 1;
            children.entry(output.node).or_default().push(input.node);
        }

        let mut levels = Vec::new();
        while !in_degree.is_empty() {
            let level: Vec<NodeId> = in_degree
                .iter()
                .filter(|(_, degree)| **degree == 0)
                .map(|(id, _)| *id)
                .collect();
            if level.is_empty() {
                return Err(EditorError::Cycle);
            }
            for id in &level {
                in_degree.remove(id);
                for child in children.get(id).into_iter().flatten() {
                    if let Some(degree) = in_degree.get_mut(child) {
                        *degree -= 1;
                    }
                }
            }
            levels.push(level);
        }
        Ok(levels)
    }

    /// Arrange nodes in columns by dependency level, keeping each column's
    /// existing vertical order.
    pub fn layout(&mut self) -> Result<(), EditorError> {
        let levels = self.levels()?;
        let h_pad = self.config.layout.horizontal_pad;
        let v_pad = self.config.layout.vertical_pad;

        let mut left = h_pad;
        for mut level in levels {
            level.sort_by(|a, b| {
                let top = |id: &NodeId| self.nodes.get(id).map_or(0.0, |n| n.position.top);
                top(a).total_cmp(&top(b))
            });

            let mut top = v_pad;
            let mut column_width: f64 = 0.0;
            for id in level {
                let Some(node) = self.nodes.get_mut(&id) else {
                    continue;
                };
                node.position = Position { left, top };
                column_width = column_width.max(node.size.width);
                top += node.size.height + v_pad;
            }
            left += column_width + h_pad;
        }

        self.has_changes = true;
        let ids: Vec<NodeId> = self.nodes.keys().copied().collect();
        for id in ids {
            self.emit(EditorEvent::Redraw(id));
        }
        tracing::debug!("laid out {} nodes", self.nodes.len());
        Ok(())
    }

    /// Bounding box of every node, `None` for an empty workflow.
    pub fn bounds(&self) -> Option<Bounds> {
        self.nodes.values().fold(None, |acc, node| {
            let (x, y) = (node.position.left, node.position.top);
            let (x2, y2) = (x + node.size.width, y + node.size.height);
            Some(match acc {
                None => Bounds {
                    xmin: x,
                    xmax: x2,
                    ymin: y,
                    ymax: y2,
                },
                Some(b) => Bounds {
                    xmin: b.xmin.min(x),
                    xmax: b.xmax.max(x2),
                    ymin: b.ymin.min(y),
                    ymax: b.ymax.max(y2),
                },
            })
        })
    }
}
