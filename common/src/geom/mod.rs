pub mod coord;
pub mod rect;
