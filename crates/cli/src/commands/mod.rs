pub mod checkpoint;
pub mod graph;
pub mod inventory;
pub mod probe;
pub mod project;
pub mod run;
pub mod util;

pub use checkpoint::*;
pub use graph::*;
pub use inventory::*;
pub use probe::*;
pub use project::*;
pub use run::*;
pub use util::*;
