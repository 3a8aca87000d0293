//! Audio graph - owns nodes and the connection lists

use std::ops::{Deref, DerefMut};

use hashbrown::HashMap;
use itertools::Itertools;
use petgraph::graph::{Graph, NodeIndex};
use petgraph::visit::Bfs;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::comm::Comm;
use crate::error::{Error, Result};
use crate::node::{NodeArena, NodeBuilder, NodeId, NodeKind};

/// A connection from output `output` of `source` to input `input` of
/// `destination`.
///
/// Serialized as a `[source, destination, output, input]` tuple.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Edge {
    pub source: NodeId,
    pub destination: NodeId,
    pub output: usize,
    pub input: usize,
}

impl Edge {
    pub fn new(source: NodeId, destination: NodeId, output: usize, input: usize) -> Self {
        Self {
            source,
            destination,
            output,
            input,
        }
    }

    fn touches(&self, node: NodeId) -> bool {
        self.source == node || self.destination == node
    }
}

impl Serialize for Edge {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        (self.source, self.destination, self.output, self.input).serialize(serializer)
    }
}

/// Batched-mutation scope over an [`AudioGraph`] (or anything owning one).
///
/// While at least one guard is alive, `connect`/`disconnect` only touch the
/// staging list. Dropping the outermost guard runs [`AudioGraph::clean`] and
/// commits, whatever path the scope was left by.
pub struct HoldState<'a, T: AsMut<AudioGraph>> {
    target: &'a mut T,
}

impl<'a, T: AsMut<AudioGraph>> HoldState<'a, T> {
    pub(crate) fn new(target: &'a mut T) -> Self {
        target.as_mut().hold_depth += 1;
        Self { target }
    }
}

impl<T: AsMut<AudioGraph>> Deref for HoldState<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.target
    }
}

impl<T: AsMut<AudioGraph>> DerefMut for HoldState<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.target
    }
}

impl<T: AsMut<AudioGraph>> Drop for HoldState<'_, T> {
    fn drop(&mut self) {
        self.target.as_mut().release();
    }
}

/// The graph store of one audio context.
///
/// `committed` is what the engine renders; `staged` accumulates mutations and
/// is copied over on every sync.
pub struct AudioGraph {
    id: NodeId,
    nodes: NodeArena,
    committed: Vec<Edge>,
    staged: Vec<Edge>,
    hold_depth: usize,
    comm: Comm,
}

impl AsMut<AudioGraph> for AudioGraph {
    fn as_mut(&mut self) -> &mut AudioGraph {
        self
    }
}

impl AudioGraph {
    /// Create an empty graph and open its model on the channel.
    pub fn new(comm: Comm) -> Self {
        let mut state = Map::new();
        state.insert("_connections".into(), Value::Array(Vec::new()));
        let id = comm.open("AudioGraphModel", state);

        Self {
            id,
            nodes: NodeArena::default(),
            committed: Vec::with_capacity(64),
            staged: Vec::with_capacity(64),
            hold_depth: 0,
            comm,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn comm(&self) -> &Comm {
        &self.comm
    }

    pub fn nodes(&self) -> &NodeArena {
        &self.nodes
    }

    pub(crate) fn nodes_mut(&mut self) -> &mut NodeArena {
        &mut self.nodes
    }

    /// Add a node to the arena, opening its model on the channel.
    pub fn add(&mut self, builder: NodeBuilder) -> Result<NodeId> {
        self.nodes.add(&self.comm, builder)
    }

    /// Enter a batched-mutation scope. Nested holds piggyback on the outermost.
    pub fn hold_state(&mut self) -> HoldState<'_, Self> {
        HoldState::new(self)
    }

    pub fn is_held(&self) -> bool {
        self.hold_depth > 0
    }

    fn release(&mut self) {
        self.hold_depth = self.hold_depth.saturating_sub(1);
        if self.hold_depth == 0 {
            self.clean();
        }
    }

    /// Check that `source → destination` is a legal edge without staging it.
    pub fn validate(&self, source: NodeId, destination: NodeId) -> Result<()> {
        let src = self.nodes.get(source)?;
        if matches!(
            src.kind(),
            NodeKind::Param(_) | NodeKind::NativeParam | NodeKind::Object
        ) {
            return Err(Error::InvalidEndpoint {
                node: source,
                role: "a connection source",
            });
        }
        let dest = self.nodes.get(destination)?;
        if matches!(dest.kind(), NodeKind::Object) {
            return Err(Error::InvalidEndpoint {
                node: destination,
                role: "a connection destination",
            });
        }

        if self.nodes.number_of_inputs(destination)? == 0 {
            return Err(Error::CannotConnectSource(destination));
        }
        if self.nodes.number_of_outputs(source)? == 0 {
            return Err(Error::CannotConnectSink(source));
        }
        Ok(())
    }

    /// Connect output `output` of `source` to input `input` of `destination`.
    ///
    /// Connecting an existing edge again is a no-op.
    pub fn connect(
        &mut self,
        source: NodeId,
        destination: NodeId,
        output: usize,
        input: usize,
    ) -> Result<()> {
        self.validate(source, destination)?;
        self.stage(Edge::new(source, destination, output, input));
        Ok(())
    }

    fn stage(&mut self, edge: Edge) {
        if !self.staged.contains(&edge) {
            trace!(?edge, "edge staged");
            self.staged.push(edge);
        }
        if !self.is_held() {
            self.sync();
        }
    }

    pub fn disconnect(
        &mut self,
        source: NodeId,
        destination: NodeId,
        output: usize,
        input: usize,
    ) -> Result<()> {
        let edge = Edge::new(source, destination, output, input);
        let pos = self
            .staged
            .iter()
            .position(|e| *e == edge)
            .ok_or(Error::EdgeNotFound {
                src: source,
                dest: destination,
                output,
                input,
            })?;

        trace!(?edge, "edge removed");
        self.staged.remove(pos);
        if !self.is_held() {
            self.sync();
        }
        Ok(())
    }

    /// Connect `source` to every node of `destinations` in one batch.
    ///
    /// Every edge is validated before anything is staged.
    pub fn fan(&mut self, source: NodeId, destinations: &[NodeId]) -> Result<()> {
        for &dest in destinations {
            if dest == source {
                return Err(Error::SelfConnection(source));
            }
            self.validate(source, dest)?;
        }

        let mut held = self.hold_state();
        for &dest in destinations {
            held.stage(Edge::new(source, dest, 0, 0));
        }
        Ok(())
    }

    /// Connect `nodes` in series in one batch.
    pub fn chain(&mut self, nodes: &[NodeId]) -> Result<()> {
        for (&a, &b) in nodes.iter().tuple_windows() {
            if a == b {
                return Err(Error::SelfConnection(a));
            }
            self.validate(a, b)?;
        }

        let mut held = self.hold_state();
        for (&a, &b) in nodes.iter().tuple_windows() {
            held.stage(Edge::new(a, b, 0, 0));
        }
        Ok(())
    }

    /// Drop every staged edge touching a disposed node, then sync unless held.
    pub fn clean(&mut self) {
        let nodes = &self.nodes;
        let before = self.staged.len();
        self.staged
            .retain(|e| !nodes.is_disposed(e.source) && !nodes.is_disposed(e.destination));
        if self.staged.len() != before {
            trace!(removed = before - self.staged.len(), "dangling edges cleaned");
        }
        if !self.is_held() {
            self.sync();
        }
    }

    /// Commit the staged edges and push them to the engine if they changed.
    pub fn sync(&mut self) {
        if self.committed == self.staged {
            return;
        }
        self.committed.clone_from(&self.staged);
        debug!(edges = self.committed.len(), "connections committed");

        let connections = serde_json::to_value(&self.committed).unwrap_or(Value::Null);
        self.comm.update_one(self.id, "_connections", connections);
    }

    /// Dispose `node` and its non-native sub-nodes in one batch.
    ///
    /// Disposing twice, or disposing a native node, does nothing.
    pub fn dispose(&mut self, node: NodeId) -> Result<()> {
        let mut held = self.hold_state();
        held.mark_disposed(node)
    }

    fn mark_disposed(&mut self, node: NodeId) -> Result<()> {
        let entry = self.nodes.get_mut(node)?;
        if entry.is_native() || entry.disposed {
            return Ok(());
        }
        entry.disposed = true;

        let mut cascade = match entry.kind {
            NodeKind::Composite { input, output } => {
                input.into_iter().chain(output).unique().collect_vec()
            }
            _ => Vec::new(),
        };
        cascade.extend(entry.owned.iter().copied());

        debug!(%node, model = %entry.model_name, "node disposed");
        self.comm.update_one(node, "_disposed", Value::Bool(true));

        for sub in cascade {
            self.mark_disposed(sub)?;
        }
        Ok(())
    }

    /// Snapshot of the committed edges, in commit order.
    pub fn connections(&self) -> Vec<Edge> {
        self.committed.clone()
    }

    /// Distinct endpoints of the committed edges.
    pub fn connected_nodes(&self) -> Vec<NodeId> {
        self.committed
            .iter()
            .flat_map(|e| [e.source, e.destination])
            .unique()
            .collect()
    }

    /// Whether a committed edge drives `node`, directly or through the
    /// composite whose input it is.
    pub fn is_overridden(&self, node: NodeId) -> bool {
        self.committed.iter().any(|e| {
            e.destination == node
                || matches!(
                    self.nodes.get(e.destination).map(|d| d.kind()),
                    Ok(NodeKind::Composite { input: Some(i), .. }) if *i == node
                )
        })
    }

    /// Committed edges as a petgraph graph, for diagnostics.
    pub fn topology(&self) -> (Graph<NodeId, (usize, usize)>, HashMap<NodeId, NodeIndex>) {
        let mut graph = Graph::with_capacity(self.committed.len(), self.committed.len());
        let mut indices: HashMap<NodeId, NodeIndex> = HashMap::new();

        for edge in &self.committed {
            let a = *indices
                .entry(edge.source)
                .or_insert_with(|| graph.add_node(edge.source));
            let b = *indices
                .entry(edge.destination)
                .or_insert_with(|| graph.add_node(edge.destination));
            graph.add_edge(a, b, (edge.output, edge.input));
        }
        (graph, indices)
    }

    /// Every node reachable from `node` through committed edges.
    pub fn downstream(&self, node: NodeId) -> Vec<NodeId> {
        let (graph, indices) = self.topology();
        let start = match indices.get(&node) {
            Some(i) => *i,
            None => return Vec::new(),
        };

        let mut bfs = Bfs::new(&graph, start);
        let mut reached = Vec::new();
        while let Some(idx) = bfs.next(&graph) {
            if idx != start {
                reached.push(graph[idx]);
            }
        }
        reached
    }
}
