pub mod store;

pub use store::{NodeRecord, NodeRegistry};
