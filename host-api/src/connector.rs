//! Connector contract (§4.15): `{name, isConnected, connect, disconnect}`.
//! Anything beyond that is connector-specific and lives outside this
//! trait — Discord/Socket.IO/database connectors are out of scope
//! (§1), only this interface is specified.

use async_trait::async_trait;
use domain::error::SupervisorError;

#[async_trait]
pub trait Connector: Send + Sync {
    fn name(&self) -> &str;
    fn is_connected(&self) -> bool;
    async fn connect(&self) -> Result<(), SupervisorError>;
    async fn disconnect(&self) -> Result<(), SupervisorError>;
}
