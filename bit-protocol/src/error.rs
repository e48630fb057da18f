use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Every fallible operation in this crate returns one of these kinds; there is no
/// downcasting — callers match on the variant they care about directly.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid packet-line header")]
    InvalidPacketHeader,

    #[error("packet exceeds the configured input byte limit")]
    InputOverLimit,

    #[error("invalid advertisement: {0}")]
    InvalidAdvertisement(String),

    #[error("remote error: {0}")]
    RemoteRepository(String),

    #[error("no remote repository found (stream closed before any advertisement)")]
    NoRemoteRepository,

    #[error("remote does not have refspec source `{0}`")]
    RemoteDoesNotHaveSpec(String),

    #[error("requested branch `{0}` does not exist on the remote")]
    RemoteBranchNotFound(String),

    #[error("fetched object graph is incomplete after transfer")]
    IncompleteObjectGraph,

    #[error("unable to check connectivity: {0}")]
    UnableToCheckConnectivity(String),

    #[error("operation timed out")]
    Timeout,

    #[error("transport failure: {0}")]
    TransportFailure(#[from] std::io::Error),
}

impl Error {
    /// true for errors that are inherent to the protocol exchange rather than a
    /// wrapped transport/IO failure; `FetchPlanner` preserves these verbatim instead
    /// of re-wrapping them in `TransportFailure`.
    pub fn is_protocol_error(&self) -> bool {
        !matches!(self, Error::TransportFailure(_) | Error::Timeout)
    }
}
