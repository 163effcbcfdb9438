use thiserror::Error;

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("invalid grid: {0}")]
    InvalidGrid(String),

    #[error("net '{net}': {msg}")]
    InvalidNet { net: String, msg: String },

    #[error("capacity adjustment ({x1},{y1},{l1})-({x2},{y2},{l2}) does not name a grid edge")]
    AdjustmentOutOfRange {
        x1: u32,
        y1: u32,
        l1: u8,
        x2: u32,
        y2: u32,
        l2: u8,
    },

    #[error("unresolved overflow after rip-up and reroute: total {total}, max {max}")]
    UnresolvedOverflow { total: u64, max: u32 },

    #[error("parse error at line {line}: {msg}")]
    Parse { line: usize, msg: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RouteError>;
