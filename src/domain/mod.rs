//! Domain layer: entities and business logic
//!
//! This layer is independent of external concerns (no I/O, no CLI, no config loading).

pub mod entities;
pub mod error;
pub mod render;
pub mod state;

pub use entities::*;
pub use error::DomainError;
pub use render::{render_all, render_role, render_unit};
pub use state::UnitState;
