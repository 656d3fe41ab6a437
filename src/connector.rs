//! Client construction seam.

use fluxpool_client::Client;

/// Error type of clients produced by a connector.
pub type ClientErrorOf<C> = <<C as Connector>::Client as Client>::Error;

/// Source of new pooled clients.
///
/// A pool holds exactly one connector for its entire lifetime, so all pooled clients share the
/// same transport and endpoint.
#[async_trait::async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Client type produced by this connector.
    type Client: Client + 'static;

    /// Construct a new client.
    ///
    /// # Errors
    ///
    /// Returns `Err` if client cannot be constructed from this connector's configuration.
    async fn connect(&self) -> Result<Self::Client, ClientErrorOf<Self>>;
}
