//! Project data model and the store that owns it.

pub mod types;
pub mod store;
pub mod validation;
pub mod export;

pub use types::*;
pub use store::{
    AreaChange, GridCommit, ProjectStore, StoreError, StoreEvent, SubscriptionId, TopographyCommit,
    TopographyTicket,
};
pub use validation::validate_project;
pub use export::{simulation_request, SimulationRequest};

#[cfg(test)]
mod tests_store;
