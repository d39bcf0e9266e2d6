pub mod tasks;
pub mod vector;

pub use tasks::TaskScope;
pub use vector::Vector3;
