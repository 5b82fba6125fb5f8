//! Type definitions for accred storage.

mod campaigns;
mod ids;
mod institutions;
mod invites;
mod roles;
mod users;

// Re-export all types from submodules
pub use campaigns::*;
pub use ids::*;
pub use institutions::*;
pub use invites::*;
pub use roles::*;
pub use users::*;
