//! Patch router: the DAG of modules and edges.
//!
//! The router owns topology only — modules and the connections between
//! them. Mutation (add/remove/connect/disconnect) happens on the patch
//! plane; the audio path only walks the cached topological order, which is
//! recomputed on edit and never per block.
//!
//! Cycle detection runs at `connect` time: an edge `src → dst` is rejected
//! if `dst` can already reach `src`. The cached order uses Kahn-style
//! elimination with a stable tie-break — among ready nodes, the earliest
//! *inserted* wins — so semantically equal patches always process in the
//! same order.
//!
//! Fan-out is free (several edges from one source). Fan-in is accepted only
//! up to the destination schema's `max_inputs`; ordinary modules take one
//! input, and anything wider must be an explicit combiner such as the mixer.

#[cfg(not(feature = "std"))]
use alloc::{boxed::Box, vec::Vec};

use core::fmt;

use crate::ident::Ident;
use crate::module::Module;

/// Maximum modules per patch.
pub const MAX_MODULES: usize = 16;

/// Maximum edges per patch.
pub const MAX_EDGES: usize = 32;

/// Why a patch edit was rejected. The router state is unchanged on error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterError {
    /// The patch already holds [`MAX_MODULES`] modules.
    TooManyModules,
    /// The patch already holds [`MAX_EDGES`] edges.
    TooManyEdges,
    /// A module with this id already exists.
    DuplicateModule(Ident),
    /// No module with this id exists.
    UnknownModule(Ident),
    /// This edge already exists.
    DuplicateEdge(Ident, Ident),
    /// No such edge to disconnect.
    UnknownEdge(Ident, Ident),
    /// The edge would create a cycle.
    CycleDetected,
    /// The destination already has as many inputs as its schema allows.
    FanInExceeded(Ident),
    /// The module still has edges attached; disconnect before deleting.
    ModuleConnected(Ident),
}

impl fmt::Display for RouterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooManyModules => write!(f, "module capacity ({MAX_MODULES}) exceeded"),
            Self::TooManyEdges => write!(f, "edge capacity ({MAX_EDGES}) exceeded"),
            Self::DuplicateModule(id) => write!(f, "module {id} already exists"),
            Self::UnknownModule(id) => write!(f, "unknown module {id}"),
            Self::DuplicateEdge(s, d) => write!(f, "edge {s} -> {d} already exists"),
            Self::UnknownEdge(s, d) => write!(f, "no edge {s} -> {d}"),
            Self::CycleDetected => write!(f, "connection would create a cycle"),
            Self::FanInExceeded(id) => write!(f, "module {id} accepts no further inputs"),
            Self::ModuleConnected(id) => write!(f, "module {id} still has edges attached"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for RouterError {}

struct Node {
    id: Ident,
    module: Box<dyn Module + Send>,
}

/// The patch graph: modules, edges, and a cached processing order.
pub struct PatchRouter {
    /// Nodes in insertion order (the topological tie-break).
    nodes: Vec<Node>,
    /// Directed edges, by id.
    edges: Vec<(Ident, Ident)>,
    /// Cached topological order.
    order: Vec<Ident>,
    order_valid: bool,
}

impl Default for PatchRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl PatchRouter {
    /// Creates an empty router with capacity for a full patch.
    pub fn new() -> Self {
        Self {
            nodes: Vec::with_capacity(MAX_MODULES),
            edges: Vec::with_capacity(MAX_EDGES),
            order: Vec::with_capacity(MAX_MODULES),
            order_valid: true,
        }
    }

    /// Number of modules in the patch.
    pub fn module_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of edges in the patch.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Whether the patch holds no modules.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether a module with this id exists.
    pub fn contains(&self, id: Ident) -> bool {
        self.nodes.iter().any(|n| n.id == id)
    }

    /// Module ids in insertion order.
    pub fn module_ids(&self) -> impl Iterator<Item = Ident> + '_ {
        self.nodes.iter().map(|n| n.id)
    }

    /// Edges as `(src, dst)` pairs.
    pub fn edges(&self) -> &[(Ident, Ident)] {
        &self.edges
    }

    /// Shared access to a module.
    pub fn module(&self, id: Ident) -> Option<&(dyn Module + Send)> {
        self.nodes
            .iter()
            .find(|n| n.id == id)
            .map(|n| n.module.as_ref())
    }

    /// Mutable access to a module.
    pub fn module_mut<'a>(&'a mut self, id: Ident) -> Option<&'a mut (dyn Module + Send + 'a)> {
        self.nodes
            .iter_mut()
            .find(|n| n.id == id)
            .map(move |n| n.module.as_mut() as &mut (dyn Module + Send + 'a))
    }

    /// Mutable access to every module, in insertion order.
    pub fn modules_mut<'a>(&'a mut self) -> impl Iterator<Item = (Ident, &'a mut (dyn Module + Send + 'a))> + 'a {
        self.nodes
            .iter_mut()
            .map(move |n| (n.id, n.module.as_mut() as &mut (dyn Module + Send + 'a)))
    }

    /// Sources feeding `dst`, in edge-insertion order.
    pub fn incoming(&self, dst: Ident) -> impl Iterator<Item = Ident> + '_ {
        self.edges
            .iter()
            .filter(move |(_, d)| *d == dst)
            .map(|(s, _)| *s)
    }

    /// Adds a module under a fresh id.
    pub fn add_module(
        &mut self,
        id: Ident,
        module: Box<dyn Module + Send>,
    ) -> Result<(), RouterError> {
        if self.contains(id) {
            return Err(RouterError::DuplicateModule(id));
        }
        if self.nodes.len() >= MAX_MODULES {
            return Err(RouterError::TooManyModules);
        }
        self.nodes.push(Node { id, module });
        self.order_valid = false;
        Ok(())
    }

    /// Removes a fully disconnected module and returns it.
    ///
    /// Deleting a module that is still an edge endpoint is rejected;
    /// disconnect first. Nothing cascades.
    pub fn remove_module(&mut self, id: Ident) -> Result<Box<dyn Module + Send>, RouterError> {
        let pos = self
            .nodes
            .iter()
            .position(|n| n.id == id)
            .ok_or(RouterError::UnknownModule(id))?;
        if self.edges.iter().any(|(s, d)| *s == id || *d == id) {
            return Err(RouterError::ModuleConnected(id));
        }
        let node = self.nodes.remove(pos);
        self.order_valid = false;
        Ok(node.module)
    }

    /// Adds the edge `src → dst`.
    ///
    /// Rejects unknown endpoints, duplicates, capacity overflow, fan-in
    /// beyond the destination schema, and cycles. On rejection the graph is
    /// untouched.
    pub fn connect(&mut self, src: Ident, dst: Ident) -> Result<(), RouterError> {
        if !self.contains(src) {
            return Err(RouterError::UnknownModule(src));
        }
        let dst_max_inputs = self
            .nodes
            .iter()
            .find(|n| n.id == dst)
            .map(|n| n.module.schema().max_inputs)
            .ok_or(RouterError::UnknownModule(dst))?;
        if self.edges.contains(&(src, dst)) {
            return Err(RouterError::DuplicateEdge(src, dst));
        }
        if self.edges.len() >= MAX_EDGES {
            return Err(RouterError::TooManyEdges);
        }
        let fan_in = self.incoming(dst).count();
        if fan_in >= usize::from(dst_max_inputs) {
            return Err(RouterError::FanInExceeded(dst));
        }
        // A cycle exists iff dst can already reach src through existing edges.
        if self.reaches(dst, src) {
            return Err(RouterError::CycleDetected);
        }
        self.edges.push((src, dst));
        self.order_valid = false;
        Ok(())
    }

    /// Removes the edge `src → dst`.
    pub fn disconnect(&mut self, src: Ident, dst: Ident) -> Result<(), RouterError> {
        let pos = self
            .edges
            .iter()
            .position(|e| *e == (src, dst))
            .ok_or(RouterError::UnknownEdge(src, dst))?;
        self.edges.remove(pos);
        self.order_valid = false;
        Ok(())
    }

    /// Recomputes the cached order if any edit invalidated it.
    ///
    /// Defensive — `connect` already rejects cycles, so this only fails if
    /// an invariant was broken elsewhere.
    pub fn validate(&mut self) -> Result<(), RouterError> {
        if self.order_valid {
            return Ok(());
        }
        self.recompute_order()?;
        self.order_valid = true;
        Ok(())
    }

    /// The cached topological order, recomputing if needed.
    pub fn processing_order(&mut self) -> Result<&[Ident], RouterError> {
        self.validate()?;
        Ok(&self.order)
    }

    /// Drops every module and edge.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.edges.clear();
        self.order.clear();
        self.order_valid = true;
    }

    /// Depth-first reachability over current edges. Edit-plane only.
    fn reaches(&self, from: Ident, to: Ident) -> bool {
        if from == to {
            return true;
        }
        let mut visited = [false; MAX_MODULES];
        let mut stack: Vec<Ident> = Vec::with_capacity(MAX_MODULES);
        stack.push(from);

        while let Some(node) = stack.pop() {
            let Some(idx) = self.nodes.iter().position(|n| n.id == node) else {
                continue;
            };
            if visited[idx] {
                continue;
            }
            visited[idx] = true;
            for (s, d) in &self.edges {
                if *s == node {
                    if *d == to {
                        return true;
                    }
                    stack.push(*d);
                }
            }
        }
        false
    }

    /// Kahn-style elimination with insertion-order tie-break.
    fn recompute_order(&mut self) -> Result<(), RouterError> {
        let n = self.nodes.len();
        let mut in_degree = [0usize; MAX_MODULES];
        for (_, dst) in &self.edges {
            if let Some(idx) = self.nodes.iter().position(|node| node.id == *dst) {
                in_degree[idx] += 1;
            }
        }

        self.order.clear();
        let mut placed = [false; MAX_MODULES];
        for _ in 0..n {
            // Earliest-inserted ready node wins: deterministic, stable order.
            let Some(next) = (0..n).find(|&i| !placed[i] && in_degree[i] == 0) else {
                return Err(RouterError::CycleDetected);
            };
            placed[next] = true;
            let id = self.nodes[next].id;
            self.order.push(id);
            for (src, dst) in &self.edges {
                if *src == id
                    && let Some(idx) = self.nodes.iter().position(|node| node.id == *dst)
                {
                    in_degree[idx] -= 1;
                }
            }
        }
        Ok(())
    }
}
