//! Recording and replay of graph calls.
//!
//! While a [`Graph`] is recording, every successful construction,
//! parameter or run call is appended as a [`TapeCall`]. A [`Tape`] is plain
//! JSON, and [`TapePlayer`] reissues its calls against another graph,
//! mapping recorded node ids to the ids the new graph hands out.

use crate::config::TapeConfig;
use crate::error::{Result, ResultExt, SensorGraphError};
use crate::graph::{Graph, NodeId, NodeSpec};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Current tape format version
pub const TAPE_VERSION: u32 = 1;

/// One recorded graph call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "call")]
pub enum TapeCall {
    CreateNode { node: NodeId, spec: NodeSpec },
    SetParameters { node: NodeId, spec: NodeSpec },
    AddChild { parent: NodeId, child: NodeId },
    RemoveChild { parent: NodeId, child: NodeId },
    SetActive { node: NodeId, active: bool },
    DestroyNode { node: NodeId },
    Run { node: NodeId },
    /// Custom node added directly; its construction cannot be reissued.
    Unreplayable { node: NodeId, name: String },
}

/// A recorded sequence of graph calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tape {
    pub version: u32,
    pub recorded_at: DateTime<Utc>,
    pub calls: Vec<TapeCall>,
}

impl Tape {
    pub fn new(calls: Vec<TapeCall>) -> Self {
        Self {
            version: TAPE_VERSION,
            recorded_at: Utc::now(),
            calls,
        }
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Whether every call can be reissued.
    pub fn is_replayable(&self) -> bool {
        !self
            .calls
            .iter()
            .any(|call| matches!(call, TapeCall::Unreplayable { .. }))
    }

    /// Load a tape from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read tape {:?}", path))?;
        let tape: Tape = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse tape {:?}", path))?;

        if tape.version != TAPE_VERSION {
            return Err(SensorGraphError::Tape(format!(
                "Unsupported tape version {} (expected {})",
                tape.version, TAPE_VERSION
            )));
        }
        Ok(tape)
    }

    /// Save the tape to disk as JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content).with_context(|| format!("Failed to write tape {:?}", path))
    }

    /// Save to the configured tape path; returns where it was written.
    pub fn save_configured(&self, config: &TapeConfig) -> Result<Option<PathBuf>> {
        match &config.path {
            Some(path) => {
                self.save(path)?;
                Ok(Some(path.clone()))
            }
            None => Ok(None),
        }
    }
}

/// Reissues recorded calls against a graph.
pub struct TapePlayer;

impl TapePlayer {
    /// Replay `tape` onto `graph`.
    ///
    /// Returns the mapping from recorded node ids to the new graph's ids.
    pub fn replay(tape: &Tape, graph: &mut Graph) -> Result<HashMap<u32, NodeId>> {
        let mut ids: HashMap<u32, NodeId> = HashMap::new();

        for (index, call) in tape.calls.iter().enumerate() {
            tracing::trace!("Replaying call {}: {:?}", index, call);
            Self::apply(call, graph, &mut ids)
                .with_context(|| format!("Replaying call {} of {}", index, tape.calls.len()))?;
        }

        tracing::info!("Replayed {} calls, {} nodes", tape.calls.len(), ids.len());
        Ok(ids)
    }

    fn apply(call: &TapeCall, graph: &mut Graph, ids: &mut HashMap<u32, NodeId>) -> Result<()> {
        let lookup = |ids: &HashMap<u32, NodeId>, node: NodeId| {
            ids.get(&node.0)
                .copied()
                .ok_or_else(|| SensorGraphError::Tape(format!("Node {} was never created", node)))
        };

        match call {
            TapeCall::CreateNode { node, spec } => {
                let created = graph.create_node(spec.clone())?;
                ids.insert(node.0, created);
            }
            TapeCall::SetParameters { node, spec } => {
                graph.set_parameters(lookup(ids, *node)?, spec.clone())?;
            }
            TapeCall::AddChild { parent, child } => {
                graph.add_child(lookup(ids, *parent)?, lookup(ids, *child)?)?;
            }
            TapeCall::RemoveChild { parent, child } => {
                graph.remove_child(lookup(ids, *parent)?, lookup(ids, *child)?)?;
            }
            TapeCall::SetActive { node, active } => {
                graph.set_active(lookup(ids, *node)?, *active)?;
            }
            TapeCall::DestroyNode { node } => {
                graph.destroy_node(lookup(ids, *node)?)?;
                ids.remove(&node.0);
            }
            TapeCall::Run { node } => {
                graph.run(lookup(ids, *node)?)?;
            }
            TapeCall::Unreplayable { node, name } => {
                return Err(SensorGraphError::Tape(format!(
                    "Node {} ('{}') is a custom node and cannot be replayed",
                    node, name
                )));
            }
        }
        Ok(())
    }
}
