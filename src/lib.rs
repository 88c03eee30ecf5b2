mod dynamics;
mod error;
mod graph;
#[cfg(feature = "python")]
mod py_sis_model;
mod sis;

pub use dynamics::{Dynamics, SimulationResult, TimeSeries, ZeroDynamics};
pub use error::DynamicsError;
pub use graph::{Graph, IndexMap, NodeLabel};
pub use sis::{NodeStates, Rates, SisModel, SisParams};

#[cfg(feature = "python")]
use pyo3::prelude::*;

#[cfg(feature = "python")]
#[pymodule]
fn sis_dynamics(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_class::<py_sis_model::PySisModel>()?;
    Ok(())
}
