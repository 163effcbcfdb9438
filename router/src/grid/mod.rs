pub mod edges;

pub use edges::{Edge, Edge3D, EdgeDir, EdgeModel, OverflowStats};
