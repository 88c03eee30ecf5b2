use ndarray::{s, Array2};
use rand::{seq::SliceRandom, Rng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::{
    dynamics::{check_shape, Dynamics, SimulationResult, TimeSeries},
    error::DynamicsError,
    graph::{Graph, NodeLabel},
};

/// Parameters of a Susceptible-Infected-Susceptible run.
///
/// `beta` defaults to one over the average degree of the graph and `mu` to one
/// over the number of nodes. An explicit `0.0` is honoured as a real rate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SisParams {
    // Number of nodes infected at t = 0
    pub num_seeds: usize,

    // Per-edge, per-timestep infection probability
    pub beta: Option<f64>,

    // Per-node, per-timestep recovery probability
    pub mu: Option<f64>,
}

impl Default for SisParams {
    fn default() -> Self {
        SisParams {
            num_seeds: 1,
            beta: None,
            mu: None,
        }
    }
}

impl SisParams {
    pub fn with_num_seeds(mut self, num_seeds: usize) -> Self {
        self.num_seeds = num_seeds;
        self
    }

    pub fn with_beta(mut self, beta: f64) -> Self {
        self.beta = Some(beta);
        self
    }

    pub fn with_mu(mut self, mu: f64) -> Self {
        self.mu = Some(mu);
        self
    }

    /// Validate against `graph` and fill in the default rates.
    pub fn resolve<N: NodeLabel>(&self, graph: &Graph<N>) -> Result<Rates, DynamicsError> {
        let n: usize = graph.n_vertices();
        if n == 0 {
            return Err(DynamicsError::invalid("graph", "graph has no nodes"));
        }
        if self.num_seeds > n {
            return Err(DynamicsError::invalid(
                "num_seeds",
                format!("{} seeds requested on a graph of {} nodes", self.num_seeds, n),
            ));
        }

        let beta: f64 = match self.beta {
            Some(beta) => check_probability("beta", beta)?,
            None => {
                let avg_k: f64 = graph.average_degree().unwrap_or(0.0);
                if avg_k <= 0.0 {
                    return Err(DynamicsError::invalid(
                        "beta",
                        "graph has no edges, an explicit infection rate is required",
                    ));
                }
                1.0 / avg_k
            }
        };

        let mu: f64 = match self.mu {
            Some(mu) => check_probability("mu", mu)?,
            None => 1.0 / n as f64,
        };

        debug!(
            beta,
            mu,
            default_beta = self.beta.is_none(),
            default_mu = self.mu.is_none(),
            "resolved SIS rates"
        );

        Ok(Rates { beta, mu })
    }
}

fn check_probability(name: &'static str, p: f64) -> Result<f64, DynamicsError> {
    if (0.0..=1.0).contains(&p) {
        Ok(p)
    } else {
        Err(DynamicsError::invalid(
            name,
            format!("probability must lie in [0, 1], got {}", p),
        ))
    }
}

/// Rates after defaults have been applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rates {
    pub beta: f64,
    pub mu: f64,
}

/// Per-node state of a run: the current flags and the staging buffer for the
/// timestep being computed.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeStates {
    infected: Vec<bool>,
    next_infected: Vec<bool>,
}

impl NodeStates {
    /// Infect exactly `num_seeds` of `n` nodes, chosen uniformly at random.
    pub fn seeded<R: Rng + ?Sized>(
        n: usize,
        num_seeds: usize,
        rng: &mut R,
    ) -> Result<Self, DynamicsError> {
        if num_seeds > n {
            return Err(DynamicsError::invalid(
                "num_seeds",
                format!("{} seeds requested on a graph of {} nodes", num_seeds, n),
            ));
        }

        let mut infected: Vec<bool> = vec![true; num_seeds];
        infected.resize(n, false);
        infected.shuffle(rng);

        Ok(NodeStates {
            infected,
            next_infected: vec![false; n],
        })
    }

    pub fn from_infected(infected: Vec<bool>) -> Self {
        let n: usize = infected.len();
        NodeStates {
            infected,
            next_infected: vec![false; n],
        }
    }

    pub fn len(&self) -> usize {
        self.infected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infected.is_empty()
    }

    pub fn is_infected(&self, node: usize) -> bool {
        self.infected[node]
    }

    pub fn is_marked(&self, node: usize) -> bool {
        self.next_infected[node]
    }

    /// Stage `node` as infected for the next timestep. Never unmarks.
    pub fn mark_next(&mut self, node: usize) {
        self.next_infected[node] = true;
    }

    /// Recover `node` immediately, within the current pass.
    pub fn cure(&mut self, node: usize) {
        self.infected[node] = false;
    }

    /// Promote the staged states to current and clear the staging buffer.
    pub fn commit(&mut self) {
        self.infected.copy_from_slice(&self.next_infected);
        self.next_infected.fill(false);
    }

    pub fn infected_count(&self) -> usize {
        self.infected.iter().filter(|&&x| x).count()
    }

    pub fn write_column(&self, time_series: &mut TimeSeries, t: usize) {
        for (cell, &infected) in time_series.column_mut(t).iter_mut().zip(&self.infected) {
            *cell = infected as u8;
        }
    }

    pub fn into_infected(self) -> Vec<bool> {
        self.infected
    }
}

/// Discrete-time SIS process on a static contact network.
///
/// Each timestep visits the nodes in a fresh random order. An infected node
/// infects each neighbour with probability `beta` for the next timestep, then
/// recovers with probability `mu`. A recovery takes effect at once; everything
/// else lands in the staging buffer and is committed after the pass. Once no
/// node is infected the run stops and the rest of the series stays 0.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SisModel {
    pub params: SisParams,
}

impl SisModel {
    pub fn new(params: SisParams) -> Self {
        SisModel { params }
    }

    /// Independent replicates, one per seed, run in parallel. Results come back
    /// in the order of `seeds`.
    pub fn simulate_ensemble<N>(
        &self,
        graph: &Graph<N>,
        length: usize,
        seeds: &[u64],
    ) -> Result<Vec<SimulationResult<N>>, DynamicsError>
    where
        N: NodeLabel + Send + Sync,
    {
        // Fail once up front instead of once per replicate
        check_shape(graph, length)?;
        self.params.resolve(graph)?;

        seeds
            .par_iter()
            .map(|&seed| self.simulate_seeded(graph, length, seed))
            .collect()
    }
}

impl Dynamics for SisModel {
    fn simulate<N, R>(
        &self,
        graph: &Graph<N>,
        length: usize,
        rng: &mut R,
    ) -> Result<SimulationResult<N>, DynamicsError>
    where
        N: NodeLabel,
        R: Rng + ?Sized,
    {
        check_shape(graph, length)?;
        let rates: Rates = self.params.resolve(graph)?;

        let ground_truth: Graph<N> = graph.clone();
        let n: usize = ground_truth.n_vertices();
        let mut time_series: TimeSeries = Array2::zeros((n, length));

        let mut states: NodeStates = NodeStates::seeded(n, self.params.num_seeds, rng)?;
        states.write_column(&mut time_series, 0);

        let mut order: Vec<usize> = (0..n).collect();
        let mut extinct_at: Option<usize> = None;

        for t in 1..length {
            // Extinction is absorbing, nothing can reactivate the process
            if states.infected_count() < 1 {
                debug!(t = t - 1, "epidemic died out");
                extinct_at = Some(t - 1);
                break;
            }

            order.shuffle(rng);
            for &i in order.iter() {
                if !states.is_infected(i) {
                    continue;
                }

                for &j in ground_truth.neighbours(i) {
                    if rng.gen::<f64>() < rates.beta {
                        states.mark_next(j);
                    }
                }

                if rng.gen::<f64>() < rates.mu {
                    states.cure(i);
                } else {
                    states.mark_next(i);
                }
            }

            states.commit();
            states.write_column(&mut time_series, t);
            trace!(t, infected = states.infected_count(), "timestep complete");
        }

        // Emptied in the last column, with no later timestep to notice it
        if extinct_at.is_none() && states.infected_count() == 0 {
            debug!(t = length - 1, "epidemic died out");
            extinct_at = Some(length - 1);
        }

        // Pad the unvisited tail: extinct stays extinct
        if let Some(t) = extinct_at {
            time_series.slice_mut(s![.., t..]).fill(0);
        }

        Ok(SimulationResult {
            time_series,
            final_infected: states.into_infected(),
            index_map: ground_truth.index_map().clone(),
            ground_truth,
            extinct_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn complete_graph(n: usize) -> Graph<usize> {
        let mut graph: Graph<usize> = Graph::new();
        for i in 0..n {
            graph.add_node(i);
        }
        for i in 0..n {
            for j in (i + 1)..n {
                graph.add_edge(i, j);
            }
        }
        graph
    }

    #[test]
    fn seeding_infects_exactly_num_seeds() {
        let mut rng: ChaCha8Rng = ChaCha8Rng::seed_from_u64(3);
        for num_seeds in [0, 1, 4, 10] {
            let states: NodeStates = NodeStates::seeded(10, num_seeds, &mut rng).unwrap();
            assert_eq!(states.len(), 10);
            assert_eq!(states.infected_count(), num_seeds);
            assert!((0..10).all(|i| !states.is_marked(i)));
        }
    }

    #[test]
    fn seeding_reaches_every_node() {
        let mut hits: Vec<usize> = vec![0; 10];
        for seed in 0..500 {
            let mut rng: ChaCha8Rng = ChaCha8Rng::seed_from_u64(seed);
            let states: NodeStates = NodeStates::seeded(10, 1, &mut rng).unwrap();
            for (node, hit) in hits.iter_mut().enumerate() {
                if states.is_infected(node) {
                    *hit += 1;
                }
            }
        }

        assert_eq!(hits.iter().sum::<usize>(), 500);
        assert!(hits.iter().all(|&hit| hit > 0), "{:?}", hits);
    }

    #[test]
    fn seeding_more_nodes_than_exist_fails() {
        let mut rng: ChaCha8Rng = ChaCha8Rng::seed_from_u64(0);
        let err = NodeStates::seeded(3, 4, &mut rng).unwrap_err();
        assert_eq!(err.parameter(), "num_seeds");

        let empty: NodeStates = NodeStates::seeded(0, 0, &mut rng).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn commit_promotes_staged_states_and_clears_buffer() {
        let mut states: NodeStates = NodeStates::from_infected(vec![true, false, true]);
        states.mark_next(1);
        states.cure(0);
        assert!(!states.is_infected(0));
        assert!(states.is_infected(2));

        states.commit();

        assert!(!states.is_infected(0));
        assert!(states.is_infected(1));
        assert!(!states.is_infected(2));
        assert!((0..3).all(|i| !states.is_marked(i)));
    }

    #[test]
    fn write_column_encodes_states_as_bits() {
        let states: NodeStates = NodeStates::from_infected(vec![false, true, true]);
        let mut time_series: TimeSeries = Array2::zeros((3, 2));
        states.write_column(&mut time_series, 1);

        assert_eq!(time_series.column(0).to_vec(), vec![0, 0, 0]);
        assert_eq!(time_series.column(1).to_vec(), vec![0, 1, 1]);
    }

    #[test]
    fn default_rates_follow_graph() {
        let graph: Graph<usize> = complete_graph(10);
        let rates: Rates = SisParams::default().resolve(&graph).unwrap();

        assert!((rates.beta - 1.0 / 9.0).abs() < 1e-12);
        assert!((rates.mu - 0.1).abs() < 1e-12);
    }

    #[test]
    fn explicit_zero_rates_are_kept() {
        let graph: Graph<usize> = complete_graph(4);
        let params: SisParams = SisParams::default().with_beta(0.0).with_mu(0.0);
        let rates: Rates = params.resolve(&graph).unwrap();

        assert_eq!(rates, Rates { beta: 0.0, mu: 0.0 });
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        let graph: Graph<usize> = complete_graph(4);

        let too_many = SisParams::default().with_num_seeds(5).resolve(&graph);
        assert_eq!(too_many.unwrap_err().parameter(), "num_seeds");

        let beta = SisParams::default().with_beta(1.5).resolve(&graph);
        assert_eq!(beta.unwrap_err().parameter(), "beta");

        let mu = SisParams::default().with_mu(-0.1).resolve(&graph);
        assert_eq!(mu.unwrap_err().parameter(), "mu");

        let nan = SisParams::default().with_beta(f64::NAN).resolve(&graph);
        assert_eq!(nan.unwrap_err().parameter(), "beta");
    }

    #[test]
    fn default_beta_needs_edges() {
        let mut graph: Graph<usize> = Graph::new();
        graph.add_node(0);
        graph.add_node(1);

        let err = SisParams::default().resolve(&graph).unwrap_err();
        assert_eq!(err.parameter(), "beta");

        assert!(SisParams::default().with_beta(0.5).resolve(&graph).is_ok());
    }

    #[test]
    fn params_deserialize_with_defaults() {
        let params: SisParams = serde_json::from_str(r#"{"beta": 0.25}"#).unwrap();
        assert_eq!(params, SisParams::default().with_beta(0.25));

        let params: SisParams =
            serde_json::from_str(r#"{"num_seeds": 3, "beta": null, "mu": 1.0}"#).unwrap();
        assert_eq!(params.num_seeds, 3);
        assert_eq!(params.beta, None);
        assert_eq!(params.mu, Some(1.0));
    }

    #[test]
    fn certain_recovery_without_spread_dies_in_one_step() {
        let graph: Graph<usize> = complete_graph(6);
        let model: SisModel =
            SisModel::new(SisParams::default().with_num_seeds(6).with_beta(0.0).with_mu(1.0));

        let result = model.simulate_seeded(&graph, 5, 11).unwrap();

        assert_eq!(result.infected_counts(), vec![6, 0, 0, 0, 0]);
        assert_eq!(result.extinct_at, Some(1));
        assert!(result.final_infected.iter().all(|&x| !x));
    }

    #[test]
    fn extinction_in_the_last_column_is_reported() {
        let graph: Graph<usize> = complete_graph(6);
        let model: SisModel =
            SisModel::new(SisParams::default().with_num_seeds(6).with_beta(0.0).with_mu(1.0));

        let result = model.simulate_seeded(&graph, 2, 11).unwrap();

        assert_eq!(result.infected_counts(), vec![6, 0]);
        assert_eq!(result.extinct_at, Some(1));
    }

    #[test]
    fn no_seeds_is_extinct_from_the_start() {
        let graph: Graph<usize> = complete_graph(4);
        let model: SisModel = SisModel::new(SisParams::default().with_num_seeds(0));

        assert_eq!(model.simulate_seeded(&graph, 1, 0).unwrap().extinct_at, Some(0));

        let result = model.simulate_seeded(&graph, 6, 0).unwrap();
        assert_eq!(result.extinct_at, Some(0));
        assert!(result.time_series.iter().all(|&x| x == 0));
    }

    #[test]
    fn single_column_run_holds_only_the_seeds() {
        let graph: Graph<usize> = complete_graph(5);
        let model: SisModel = SisModel::new(SisParams::default().with_num_seeds(2));

        let result = model.simulate_seeded(&graph, 1, 0).unwrap();

        assert_eq!(result.time_series.dim(), (5, 1));
        assert_eq!(result.infected_counts(), vec![2]);
        assert_eq!(result.extinct_at, None);
        assert_eq!(result.final_infected.iter().filter(|&&x| x).count(), 2);
    }

    #[test]
    fn zero_length_is_rejected() {
        let graph: Graph<usize> = complete_graph(3);
        let err = SisModel::default().simulate_seeded(&graph, 0, 0).unwrap_err();
        assert_eq!(err.parameter(), "length");
    }

    #[test]
    fn oversized_series_is_rejected_before_allocating() {
        let graph: Graph<usize> = complete_graph(3);

        let err = SisModel::default()
            .simulate_seeded(&graph, usize::MAX, 0)
            .unwrap_err();
        assert_eq!(err.parameter(), "length");

        let err = SisModel::default()
            .simulate_seeded(&graph, usize::MAX / 2, 0)
            .unwrap_err();
        assert_eq!(err.parameter(), "length");
    }
}
