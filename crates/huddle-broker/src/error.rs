use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrokerError {
    /// Operation on a connection that was never registered or already
    /// disconnected. Races between disconnect and in-flight signals land
    /// here and are dropped without retry.
    #[error("connection is not registered")]
    NotConnected,

    /// The connection has no identity bound via `identify`.
    #[error("no identity bound to this connection")]
    Unauthenticated,

    #[error("message text must be 1 to {} characters", crate::broker::MAX_MESSAGE_CHARS)]
    InvalidMessage,

    /// A referenced user or group does not exist — a stale or forged id.
    #[error("referenced user or group does not exist")]
    NotFound,

    /// The durable store could not be reached. The cause stays out of the
    /// Display text — it is logged server-side, never shown to clients.
    #[error("message store is unavailable")]
    StoreUnavailable(anyhow::Error),

    /// User-visible wrapper for a persistence failure during a send. The
    /// message was not stored and nothing was broadcast.
    #[error("failed to send message")]
    SendFailed(anyhow::Error),
}
