#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("constraint {constraint} references variable {variable} of {count}")]
    VariableOutOfRange {
        constraint: usize,
        variable: usize,
        count: usize,
    },

    #[error("constraint {constraint} has a non-finite gap")]
    NonFiniteGap { constraint: usize },

    #[error("rectangle buffer holds {len} values, expected {expected} for {count} rectangles")]
    BufferLength {
        len: usize,
        expected: usize,
        count: usize,
    },

    #[error("failed to allocate solver buffers")]
    Allocation(#[from] std::collections::TryReserveError),
}

pub type Result<T> = std::result::Result<T, Error>;
