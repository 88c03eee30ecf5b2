use std::collections::HashMap;

use numpy::ToPyArray;
use pyo3::{exceptions::PyValueError, prelude::*, types::PyDict};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::{
    dynamics::{Dynamics, SimulationResult},
    error::DynamicsError,
    graph::Graph,
    sis::{SisModel, SisParams},
};

impl From<DynamicsError> for PyErr {
    fn from(err: DynamicsError) -> PyErr {
        PyValueError::new_err(err.to_string())
    }
}

fn non_negative(name: &'static str, value: i64) -> Result<usize, DynamicsError> {
    usize::try_from(value)
        .map_err(|_| DynamicsError::invalid(name, format!("must not be negative, got {}", value)))
}

#[pyclass]
pub struct PySisModel {
    results: Option<SimulationResult<i64>>,
}

#[pymethods]
impl PySisModel {
    #[new]
    fn new() -> Self {
        PySisModel { results: None }
    }

    /// Simulate SIS dynamics on the graph given by `nodes` and `edges`.
    /// Returns an N x L float array; row i belongs to `nodes[i]`.
    #[args(num_seeds = "1", beta = "None", mu = "None", seed = "None")]
    fn simulate(
        &mut self,
        nodes: Vec<i64>,
        edges: Vec<(i64, i64)>,
        length: i64,
        num_seeds: i64,
        beta: Option<f64>,
        mu: Option<f64>,
        seed: Option<u64>,
    ) -> PyResult<PyObject> {
        let length: usize = non_negative("length", length)?;
        let num_seeds: usize = non_negative("num_seeds", num_seeds)?;

        // Listed nodes first so isolated ones keep their position
        let mut graph: Graph<i64> = Graph::new();
        for node in nodes {
            graph.add_node(node);
        }
        for (a, b) in edges {
            graph.add_edge(a, b);
        }

        let model: SisModel = SisModel::new(SisParams {
            num_seeds,
            beta,
            mu,
        });

        let mut rng: ChaCha8Rng = match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        let result: SimulationResult<i64> = model.simulate(&graph, length, &mut rng)?;

        let time_series: PyObject = Python::with_gil(|py| {
            result
                .time_series
                .mapv(f64::from)
                .to_pyarray(py)
                .to_owned()
                .into()
        });
        self.results = Some(result);

        Ok(time_series)
    }

    /// Outputs of the last run: `TS`, `ground_truth` (edge list),
    /// `final_infected` and `index_to_node`.
    #[getter]
    fn results(&self) -> PyResult<PyObject> {
        Python::with_gil(|py| {
            let dict: &PyDict = PyDict::new(py);
            if let Some(result) = &self.results {
                let index_to_node: HashMap<usize, i64> = result
                    .index_map
                    .iter()
                    .map(|(idx, &node)| (idx, node))
                    .collect();

                dict.set_item(
                    "TS",
                    result.time_series.mapv(f64::from).to_pyarray(py),
                )?;
                dict.set_item("ground_truth", result.ground_truth.edges())?;
                dict.set_item("final_infected", result.final_infected.clone())?;
                dict.set_item("index_to_node", index_to_node)?;
            }
            Ok(dict.into())
        })
    }
}
