//! CLI command implementations

pub mod cleanup;
pub mod current;
pub mod list;
pub mod run;
pub mod stats;

pub use cleanup::cleanup;
pub use current::current;
pub use list::list;
pub use run::run;
pub use stats::stats;
