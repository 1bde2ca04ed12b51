//! Deterministic evolution of articulated rigid-body creatures.
//!
//! Dependency order (leaves first): [`prng`] and [`vecmath`] are
//! pure math; [`genome`] is the data model validation sits on top of;
//! [`instantiate`] realizes a genome into a physics world; [`evaluator`]
//! ticks one creature's controller; [`scheduler`] owns the world and
//! drives both per generation; [`fitness`] scores a window's telemetry;
//! [`evolution`] is the generation loop; [`update_queue`] and
//! [`persistence`] are the ambient host-facing surfaces; [`error`]
//! collects the failure taxonomy shared across all of the above.

pub mod error;
pub mod evaluator;
pub mod evolution;
pub mod fitness;
pub mod genome;
pub mod instantiate;
pub mod persistence;
pub mod prng;
pub mod scheduler;
pub mod update_queue;
pub mod vecmath;

pub use error::MorphError;
pub use evolution::{EvolutionDriver, RunConfig};
pub use genome::{Genome, Individual};
