pub mod poll;
pub mod process_results;
pub mod reconcile;
pub mod submit;

pub use poll::*;
pub use process_results::*;
pub use reconcile::*;
pub use submit::*;
