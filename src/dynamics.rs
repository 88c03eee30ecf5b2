use ndarray::Array2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::{
    error::DynamicsError,
    graph::{Graph, IndexMap, NodeLabel},
};

/// Node-by-time matrix of 0/1 states. Row `i` belongs to the node with index
/// `i` in the run's `IndexMap`.
pub type TimeSeries = Array2<u8>;

/// Everything a single run hands back to the caller.
#[derive(Debug, Clone)]
pub struct SimulationResult<N: NodeLabel> {
    pub time_series: TimeSeries,

    // Private working copy of the input graph
    pub ground_truth: Graph<N>,

    // Last-known state of each node, by index
    pub final_infected: Vec<bool>,

    pub index_map: IndexMap<N>,

    // First all-zero column, `None` while the epidemic is still alive at the end
    pub extinct_at: Option<usize>,
}

impl<N: NodeLabel> SimulationResult<N> {
    pub fn n_nodes(&self) -> usize {
        self.time_series.nrows()
    }

    pub fn length(&self) -> usize {
        self.time_series.ncols()
    }

    /// Number of active nodes per timestep.
    pub fn infected_counts(&self) -> Vec<usize> {
        self.time_series
            .columns()
            .into_iter()
            .map(|column| column.iter().map(|&x| x as usize).sum())
            .collect()
    }

    /// Final state of a node looked up by its label.
    pub fn is_infected(&self, label: &N) -> Option<bool> {
        self.index_map
            .index_of(label)
            .and_then(|idx| self.final_infected.get(idx).copied())
    }

    pub fn into_time_series(self) -> TimeSeries {
        self.time_series
    }
}

/// A dynamical process that turns a static graph into an `N x L` time series.
pub trait Dynamics {
    fn simulate<N, R>(
        &self,
        graph: &Graph<N>,
        length: usize,
        rng: &mut R,
    ) -> Result<SimulationResult<N>, DynamicsError>
    where
        N: NodeLabel,
        R: Rng + ?Sized;

    /// Run with a fresh generator built from `seed`. Same seed, same output.
    fn simulate_seeded<N: NodeLabel>(
        &self,
        graph: &Graph<N>,
        length: usize,
        seed: u64,
    ) -> Result<SimulationResult<N>, DynamicsError> {
        let mut rng: ChaCha8Rng = ChaCha8Rng::seed_from_u64(seed);
        self.simulate(graph, length, &mut rng)
    }
}

pub(crate) fn check_shape<N: NodeLabel>(
    graph: &Graph<N>,
    length: usize,
) -> Result<(), DynamicsError> {
    if graph.n_vertices() == 0 {
        return Err(DynamicsError::invalid("graph", "graph has no nodes"));
    }
    if length < 1 {
        return Err(DynamicsError::invalid(
            "length",
            format!("time series length must be at least 1, got {}", length),
        ));
    }
    // ndarray refuses shapes whose element count overflows isize
    let cells: Option<usize> = graph
        .n_vertices()
        .checked_mul(length)
        .filter(|&cells| cells <= isize::MAX as usize);
    if cells.is_none() {
        return Err(DynamicsError::invalid(
            "length",
            format!(
                "a {} x {} time series does not fit in memory",
                graph.n_vertices(),
                length
            ),
        ));
    }
    Ok(())
}

/// Baseline dynamics: nothing ever happens, every entry stays 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZeroDynamics;

impl Dynamics for ZeroDynamics {
    fn simulate<N, R>(
        &self,
        graph: &Graph<N>,
        length: usize,
        _rng: &mut R,
    ) -> Result<SimulationResult<N>, DynamicsError>
    where
        N: NodeLabel,
        R: Rng + ?Sized,
    {
        check_shape(graph, length)?;

        let n: usize = graph.n_vertices();
        Ok(SimulationResult {
            time_series: Array2::zeros((n, length)),
            ground_truth: graph.clone(),
            final_infected: vec![false; n],
            index_map: graph.index_map().clone(),
            extinct_at: None,
        })
    }
}
