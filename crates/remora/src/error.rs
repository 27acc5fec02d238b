use std::collections::TryReserveError;

use crate::boundary as codes;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("node {node} is out of range for a layout with {count} nodes")]
    NodeOutOfRange { node: usize, count: usize },

    #[error("edge {node} -> {node} is a self-loop")]
    SelfLoop { node: usize },

    #[error("unknown alignment id {0}")]
    UnknownAlignment(usize),

    #[error("alignment {alignment} is not on the same axis as the distribution")]
    AlignmentAxisMismatch { alignment: usize },

    #[error("unknown boundary id {0}")]
    UnknownBoundary(usize),

    #[error("unknown cluster id {0}")]
    UnknownCluster(usize),

    #[error("cluster {0} has no member nodes and therefore no bounds")]
    EmptyCluster(usize),

    #[error("the root cluster cannot be used as {role}")]
    RootCluster { role: &'static str },

    #[error("cluster {child} already has parent cluster {parent}")]
    ClusterAlreadyParented { child: usize, parent: usize },

    #[error("attaching cluster {child} under cluster {parent} would create a cycle")]
    ClusterCycle { parent: usize, child: usize },

    #[error("node {node} already belongs to cluster {cluster}")]
    NodeAlreadyClustered { node: usize, cluster: usize },

    #[error("{what} needs at least {min} members, got {got}")]
    TooFewMembers {
        what: &'static str,
        min: usize,
        got: usize,
    },

    #[error("got {offsets} offsets for {nodes} nodes")]
    OffsetCountMismatch { nodes: usize, offsets: usize },

    #[error("invalid {name}: {value}")]
    InvalidValue { name: &'static str, value: f64 },

    #[error("invalid axis {0} (expected 0 for x or 1 for y)")]
    InvalidAxis(i32),

    #[error("buffer holds {len} values, {needed} required")]
    BufferTooSmall { len: usize, needed: usize },

    #[error("invalid layout options: {0}")]
    Options(#[from] serde_json::Error),

    #[error(transparent)]
    Solver(#[from] remora_vpsc::Error),

    #[error("failed to allocate layout buffers")]
    Allocation(#[from] TryReserveError),

    #[error("layout handle {0} has been destroyed")]
    DestroyedHandle(i32),

    #[error("unknown layout handle {0}")]
    UnknownHandle(i32),
}

impl Error {
    /// Negative sentinel reported through the flat API for this error.
    pub fn code(&self) -> i32 {
        match self {
            Error::NodeOutOfRange { .. } | Error::SelfLoop { .. } => codes::ERR_NODE,
            Error::UnknownAlignment(_) | Error::AlignmentAxisMismatch { .. } => {
                codes::ERR_ALIGNMENT
            }
            Error::UnknownBoundary(_) => codes::ERR_BOUNDARY,
            Error::UnknownCluster(_)
            | Error::EmptyCluster(_)
            | Error::RootCluster { .. }
            | Error::ClusterAlreadyParented { .. }
            | Error::ClusterCycle { .. }
            | Error::NodeAlreadyClustered { .. } => codes::ERR_CLUSTER,
            Error::TooFewMembers { .. }
            | Error::OffsetCountMismatch { .. }
            | Error::InvalidValue { .. }
            | Error::InvalidAxis(_)
            | Error::Options(_) => codes::ERR_INPUT,
            Error::BufferTooSmall { .. }
            | Error::Solver(remora_vpsc::Error::BufferLength { .. }) => codes::ERR_BUFFER,
            Error::Solver(remora_vpsc::Error::Allocation(_)) | Error::Allocation(_) => {
                codes::ERR_ALLOCATION
            }
            Error::Solver(_) => codes::ERR_SOLVER,
            Error::DestroyedHandle(_) => codes::ERR_DESTROYED,
            Error::UnknownHandle(_) => codes::ERR_UNKNOWN_HANDLE,
        }
    }

    /// Resource exhaustion and handle misuse abort a call; everything else is a rejected
    /// declaration that leaves the layout usable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Allocation(_)
                | Error::Solver(remora_vpsc::Error::Allocation(_))
                | Error::DestroyedHandle(_)
                | Error::UnknownHandle(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
