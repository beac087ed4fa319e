//! Retrieval-augmented query planning.
//!
//! * [`prompt`] — the versioned prompt template owned by the planner.
//! * [`planner`] — [`QueryPlanner`], which embeds a question, retrieves
//!   grounding chunks, and asks the completion capability for SQL.

pub mod planner;
pub mod prompt;

pub use planner::{QueryPlanner, QueryPlannerBuilder};
pub use prompt::PromptTemplate;
