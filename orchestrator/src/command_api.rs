//! [`host_api::CommandApi`] implemented over the RCON connection (C2).
//! §4.12: "command API rejects with `INVALID_STATE` while not running".

use async_trait::async_trait;
use domain::error::{ErrorContext, SupervisorError};
use domain::ids::PlayerId;
use host_api::CommandApi;

use crate::Orchestrator;

fn not_running() -> SupervisorError {
    SupervisorError::InvalidState {
        message: "orchestrator is not running".to_string(),
        context: ErrorContext::new(),
    }
}

#[async_trait]
impl CommandApi for Orchestrator {
    async fn broadcast(&self, message: &str) -> Result<(), SupervisorError> {
        if !self.is_running() {
            return Err(not_running());
        }
        self.rcon_handle().await?.execute(format!("AdminBroadcast {message}")).await?;
        Ok(())
    }

    async fn warn(&self, player_id: PlayerId, message: &str) -> Result<(), SupervisorError> {
        if !self.is_running() {
            return Err(not_running());
        }
        self.rcon_handle().await?.execute(format!("AdminWarn {} {}", player_id.get(), message)).await?;
        Ok(())
    }

    async fn kick(&self, player_id: PlayerId, reason: &str) -> Result<(), SupervisorError> {
        if !self.is_running() {
            return Err(not_running());
        }
        self.rcon_handle().await?.execute(format!("AdminKick {} {}", player_id.get(), reason)).await?;
        Ok(())
    }

    async fn ban(&self, player_id: PlayerId, duration: &str, reason: &str) -> Result<(), SupervisorError> {
        if !self.is_running() {
            return Err(not_running());
        }
        self.rcon_handle().await?.execute(format!("AdminBan {} {} {}", player_id.get(), duration, reason)).await?;
        Ok(())
    }

    async fn execute(&self, command: &str) -> Result<String, SupervisorError> {
        if !self.is_running() {
            return Err(not_running());
        }
        self.rcon_handle().await?.execute(command.to_string()).await
    }
}
