//! Reference edges between indirect objects.

use super::structure::ObjectTable;
use super::value::ObjectId;
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

type EdgeList = SmallVec<[usize; 4]>;

/// A reference from one object to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub from: ObjectId,
    pub to: ObjectId,
    /// Dictionary key the reference was first found under (empty at top level)
    pub key: String,
    /// The target is not in the object table
    pub dangling: bool,
}

/// Directed graph of references. Each `(from, to)` pair appears once.
#[derive(Debug, Clone, Default)]
pub struct RelationshipGraph {
    edges: Vec<Edge>,
    outgoing: FxHashMap<ObjectId, EdgeList>,
    incoming: FxHashMap<ObjectId, EdgeList>,
    nodes: Vec<ObjectId>,
}

impl RelationshipGraph {
    /// Collects the references held by every object, stream dictionaries
    /// included.
    pub fn build(objects: &ObjectTable) -> Self {
        let mut graph = RelationshipGraph {
            nodes: objects.iter().map(|o| o.id).collect(),
            ..RelationshipGraph::default()
        };
        let mut seen: FxHashSet<(ObjectId, ObjectId)> = FxHashSet::default();

        for object in objects {
            let from = object.id;
            object.value.for_each_reference(&mut |key, to| {
                if !seen.insert((from, to)) {
                    return;
                }
                let index = graph.edges.len();
                graph.edges.push(Edge {
                    from,
                    to,
                    key: key.to_string(),
                    dangling: !objects.contains(to),
                });
                graph.outgoing.entry(from).or_default().push(index);
                graph.incoming.entry(to).or_default().push(index);
            });
        }

        tracing::debug!(
            nodes = graph.nodes.len(),
            edges = graph.edges.len(),
            "Relationship graph built"
        );
        graph
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Edges whose target does not exist.
    pub fn dangling_edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(|e| e.dangling)
    }

    pub fn outgoing(&self, id: ObjectId) -> impl Iterator<Item = &Edge> {
        self.edge_list(&self.outgoing, id)
    }

    pub fn incoming(&self, id: ObjectId) -> impl Iterator<Item = &Edge> {
        self.edge_list(&self.incoming, id)
    }

    fn edge_list<'a>(
        &'a self,
        lists: &'a FxHashMap<ObjectId, EdgeList>,
        id: ObjectId,
    ) -> impl Iterator<Item = &'a Edge> {
        lists
            .get(&id)
            .into_iter()
            .flatten()
            .map(|&i| &self.edges[i])
    }

    /// Number of distinct objects `id` refers to.
    pub fn fan_out(&self, id: ObjectId) -> usize {
        self.outgoing.get(&id).map_or(0, |list| list.len())
    }

    /// Every existing object reachable from `root`, `root` included when it
    /// exists.
    pub fn reachable_from(&self, root: ObjectId) -> FxHashSet<ObjectId> {
        self.reachable_from_all(&[root])
    }

    fn reachable_from_all(&self, roots: &[ObjectId]) -> FxHashSet<ObjectId> {
        let known: FxHashSet<ObjectId> = self.nodes.iter().copied().collect();
        let mut visited = FxHashSet::default();
        let mut stack: Vec<ObjectId> = roots
            .iter()
            .copied()
            .filter(|id| known.contains(id))
            .collect();

        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            stack.extend(
                self.outgoing(id)
                    .filter(|e| !e.dangling && !visited.contains(&e.to))
                    .map(|e| e.to),
            );
        }
        visited
    }

    /// Objects not reachable from any of `roots`, in table order.
    pub fn unreachable(&self, roots: &[ObjectId]) -> Vec<ObjectId> {
        let reachable = self.reachable_from_all(roots);
        self.nodes
            .iter()
            .copied()
            .filter(|id| !reachable.contains(id))
            .collect()
    }
}
