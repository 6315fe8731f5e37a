pub mod reconcile;
pub mod scheme_index;
pub mod stats;
