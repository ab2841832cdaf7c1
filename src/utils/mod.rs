pub mod deadline;
pub mod linalg;
pub mod tokenize;

pub use deadline::Deadline;
