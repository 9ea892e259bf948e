//! Task routing
//!
//! Picks and ranks the candidate models for a task before any backend is
//! invoked.
//!
//! ## How It Works
//!
//! 1. Candidates start from the static [`RoutingTable`] entry for the task type,
//!    followed by any models the task explicitly prefers
//! 2. Models whose capabilities do not intersect the task's required
//!    capabilities are dropped, preferred or not
//! 3. Survivors are ranked by `quality + 0.1 × capability overlap`, with
//!    registration order as the tie-break
//! 4. At most three top candidates are handed to the execution engine
//!
//! An empty result means no eligible backend; the orchestrator fails fast
//! with [`Error::NoEligibleModel`](crate::Error::NoEligibleModel).

mod router;
mod types;

pub use router::{MAX_CANDIDATES, RankedCandidate, RouterConfig, SCORE_EPSILON, TaskRouter};
pub use types::{RoutingTable, TaskSpec, TaskType};
