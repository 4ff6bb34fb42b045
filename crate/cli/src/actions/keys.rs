use clap::Parser;
use ksema_client::HsmClient;

use super::console;
use crate::error::result::{CliResult, CliResultHelper};

/// Generate a key in the HSM.
///
/// With a single label, a symmetric key is generated.
/// With a second label, a key pair is generated: the first label names
/// the public key and the second one the private key.
///
/// User object sessions are not allowed to generate keys.
#[derive(Parser, Debug)]
#[clap(verbatim_doc_comment)]
pub struct GenKeyAction {
    /// The label of the symmetric key, or of the public key
    #[clap(required = true, name = "LABEL")]
    label: String,

    /// The label of the private key
    #[clap(name = "PRIVATE_KEY_LABEL", default_value = "")]
    private_key_label: String,
}

impl GenKeyAction {
    pub async fn run(&self, hsm_client: &HsmClient) -> CliResult<()> {
        hsm_client
            .gen_key(&self.label, &self.private_key_label)
            .await
            .with_context(|| "Can't generate the key on the HSM")?;

        let message = if self.private_key_label.is_empty() {
            format!("The symmetric key {} was successfully generated", self.label)
        } else {
            format!(
                "The key pair {}/{} was successfully generated",
                self.label, self.private_key_label
            )
        };
        console::Stdout::new(&message).write()
    }
}

/// Delete a key from the HSM.
#[derive(Parser, Debug)]
pub struct DeleteAction {
    /// The label of the key to delete
    #[clap(required = true, name = "LABEL")]
    label: String,
}

impl DeleteAction {
    pub async fn run(&self, hsm_client: &HsmClient) -> CliResult<()> {
        hsm_client
            .delete(&self.label)
            .await
            .with_context(|| format!("Can't delete the key {}", self.label))?;

        console::Stdout::new(&format!("The key {} was successfully deleted", self.label)).write()
    }
}

/// Back up a key into a file stored by the HSM.
#[derive(Parser, Debug)]
pub struct BackupAction {
    /// The name of the backup file on the HSM side
    #[clap(required = true, name = "FILE_NAME")]
    file_name: String,

    /// The label of the key to back up.
    /// May be omitted by user object sessions.
    #[clap(long = "key-label", short = 'k', default_value = "")]
    key_label: String,
}

impl BackupAction {
    pub async fn run(&self, hsm_client: &HsmClient) -> CliResult<()> {
        hsm_client
            .backup(&self.file_name, &self.key_label)
            .await
            .with_context(|| "Can't back up the key")?;

        console::Stdout::new(&format!("The key was backed up to {}", self.file_name)).write()
    }
}

/// Restore a key from a backup file stored by the HSM.
#[derive(Parser, Debug)]
pub struct RestoreAction {
    /// The name of the backup file on the HSM side
    #[clap(required = true, name = "FILE_NAME")]
    file_name: String,
}

impl RestoreAction {
    pub async fn run(&self, hsm_client: &HsmClient) -> CliResult<()> {
        hsm_client
            .restore(&self.file_name)
            .await
            .with_context(|| "Can't restore the key")?;

        console::Stdout::new(&format!("The key was restored from {}", self.file_name)).write()
    }
}

/// Set the 16 character IV used by the session's symmetric operations.
#[derive(Parser, Debug)]
pub struct SetIvAction {
    /// The IV
    #[clap(required = true, name = "IV")]
    iv: String,
}

impl SetIvAction {
    pub async fn run(&self, hsm_client: &HsmClient) -> CliResult<()> {
        hsm_client.set_iv(&self.iv).await?;
        console::Stdout::new("The IV was successfully set").write()
    }
}
