pub mod completions;
pub mod graph;
pub mod publish;
pub mod version;
