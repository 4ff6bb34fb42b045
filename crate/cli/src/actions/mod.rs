use clap::{Parser, Subcommand};
use ksema_client::HsmClient;

use self::{
    crypt::{DecryptAction, EncryptAction},
    keys::{BackupAction, DeleteAction, GenKeyAction, RestoreAction, SetIvAction},
    random::RandomAction,
    signature::{SignAction, VerifyAction},
};
use crate::error::result::{CliResult, CliResultHelper};

pub mod console;
pub mod crypt;
pub mod keys;
pub mod random;
pub mod signature;

#[derive(Subcommand)]
pub enum HsmActions {
    Ping(PingAction),
    Encrypt(EncryptAction),
    Decrypt(DecryptAction),
    Sign(SignAction),
    Verify(VerifyAction),
    Random(RandomAction),
    Backup(BackupAction),
    Restore(RestoreAction),
    Delete(DeleteAction),
    GenKey(GenKeyAction),
    SetIv(SetIvAction),
}

impl HsmActions {
    /// Process the command line arguments
    ///
    /// # Errors
    /// - If the configuration file is not found or invalid
    /// - If the HSM rejects the request
    pub async fn process(&self, hsm_client: &HsmClient) -> CliResult<()> {
        match self {
            Self::Ping(action) => action.run(hsm_client).await,
            Self::Encrypt(action) => action.run(hsm_client).await,
            Self::Decrypt(action) => action.run(hsm_client).await,
            Self::Sign(action) => action.run(hsm_client).await,
            Self::Verify(action) => action.run(hsm_client).await,
            Self::Random(action) => action.run(hsm_client).await,
            Self::Backup(action) => action.run(hsm_client).await,
            Self::Restore(action) => action.run(hsm_client).await,
            Self::Delete(action) => action.run(hsm_client).await,
            Self::GenKey(action) => action.run(hsm_client).await,
            Self::SetIv(action) => action.run(hsm_client).await,
        }
    }
}

/// Check that the HSM answers and that the session is valid.
#[derive(Parser, Debug)]
pub struct PingAction;

impl PingAction {
    pub async fn run(&self, hsm_client: &HsmClient) -> CliResult<()> {
        hsm_client
            .ping()
            .await
            .with_context(|| "Can't reach the HSM")?;

        console::Stdout::new(&format!(
            "The HSM at {} is up, session opened as {}",
            hsm_client.server_url,
            hsm_client.user_type()
        ))
        .write()
    }
}
