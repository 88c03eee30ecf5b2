use std::hash::Hash;

use rustc_hash::FxHashMap;

/// Labels a contact graph can be keyed by.
pub trait NodeLabel: Hash + Eq + Clone {}

impl<T: Hash + Eq + Clone> NodeLabel for T {}

/// Bijection between node labels and the dense row indices `0..n` used in the
/// time series. The order is the order in which nodes entered the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexMap<N: NodeLabel> {
    nodes: Vec<N>,
    index: FxHashMap<N, usize>,
}

impl<N: NodeLabel> IndexMap<N> {
    fn new() -> Self {
        IndexMap {
            nodes: Vec::new(),
            index: FxHashMap::default(),
        }
    }

    // Returns the existing index when the label is already known
    fn insert(&mut self, label: N) -> (usize, bool) {
        if let Some(&idx) = self.index.get(&label) {
            return (idx, false);
        }

        let idx: usize = self.nodes.len();
        self.index.insert(label.clone(), idx);
        self.nodes.push(label);

        (idx, true)
    }

    pub fn index_of(&self, label: &N) -> Option<usize> {
        self.index.get(label).copied()
    }

    pub fn node_at(&self, idx: usize) -> Option<&N> {
        self.nodes.get(idx)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterate `(index, label)` pairs in index order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &N)> + '_ {
        self.nodes.iter().enumerate()
    }
}

/// Static undirected contact network.
///
/// Neighbour lists are stored per dense index. Self-loops and repeated edges
/// are kept as given, so a node may show up more than once in a neighbour list.
#[derive(Debug, Clone, PartialEq)]
pub struct Graph<N: NodeLabel> {
    // Neighbour lists, one per vertex index
    adjacency: Vec<Vec<usize>>,

    index_map: IndexMap<N>,

    n_edges: usize,
}

impl<N: NodeLabel> Default for Graph<N> {
    fn default() -> Self {
        Graph::new()
    }
}

impl<N: NodeLabel> Graph<N> {
    pub fn new() -> Self {
        Graph {
            adjacency: Vec::new(),
            index_map: IndexMap::new(),
            n_edges: 0,
        }
    }

    /// Build a graph from an edge list, adding endpoints as they appear.
    pub fn from_edges<I>(edges: I) -> Self
    where
        I: IntoIterator<Item = (N, N)>,
    {
        let mut graph: Graph<N> = Graph::new();
        for (a, b) in edges {
            graph.add_edge(a, b);
        }
        graph
    }

    /// Add a node, returning its index. Adding a known label is a no-op.
    pub fn add_node(&mut self, label: N) -> usize {
        let (idx, inserted) = self.index_map.insert(label);
        if inserted {
            self.adjacency.push(Vec::new());
        }
        idx
    }

    pub fn add_edge(&mut self, a: N, b: N) {
        let u: usize = self.add_node(a);
        let v: usize = self.add_node(b);

        self.adjacency[u].push(v);
        self.adjacency[v].push(u);
        self.n_edges += 1;
    }

    pub fn n_vertices(&self) -> usize {
        self.adjacency.len()
    }

    pub fn n_edges(&self) -> usize {
        self.n_edges
    }

    pub fn neighbours(&self, vertex: usize) -> &[usize] {
        self.adjacency
            .get(vertex)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Degree of a vertex. A self-loop counts twice.
    pub fn degree(&self, vertex: usize) -> usize {
        self.neighbours(vertex).len()
    }

    /// Mean of the degree sequence, `None` for a graph without nodes.
    pub fn average_degree(&self) -> Option<f64> {
        if self.adjacency.is_empty() {
            return None;
        }

        let total: usize = self.adjacency.iter().map(Vec::len).sum();
        Some(total as f64 / self.adjacency.len() as f64)
    }

    pub fn index_map(&self) -> &IndexMap<N> {
        &self.index_map
    }

    /// Edge list in label form, each undirected edge reported once.
    pub fn edges(&self) -> Vec<(N, N)> {
        let mut edges: Vec<(N, N)> = Vec::with_capacity(self.n_edges);
        for (u, neighbours) in self.adjacency.iter().enumerate() {
            let mut self_loops: usize = 0;
            for &v in neighbours {
                if u < v {
                    edges.push((self.label(u).clone(), self.label(v).clone()));
                } else if u == v {
                    self_loops += 1;
                }
            }
            // Each self-loop sits twice in its own neighbour list
            for _ in 0..self_loops / 2 {
                edges.push((self.label(u).clone(), self.label(u).clone()));
            }
        }
        edges
    }

    fn label(&self, vertex: usize) -> &N {
        &self.index_map.nodes[vertex]
    }
}

impl Graph<usize> {
    /// Build a graph from a 0/1 adjacency matrix. Labels are the row indices.
    ///
    /// Only the upper triangle (diagonal included) is read, so the matrix is
    /// assumed symmetric.
    pub fn from_adjacency_matrix(adjacency_matrix: &[Vec<usize>]) -> Self {
        let mut graph: Graph<usize> = Graph::new();
        for vertex in 0..adjacency_matrix.len() {
            graph.add_node(vertex);
        }

        for (i, row) in adjacency_matrix.iter().enumerate() {
            for (j, &edge) in row.iter().enumerate().skip(i) {
                if edge == 1 {
                    graph.add_edge(i, j);
                }
            }
        }

        graph
    }
}
