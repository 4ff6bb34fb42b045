use std::path::PathBuf;

use clap::Parser;
use ksema_client::HsmClient;

use super::console;
use crate::error::result::{CliResult, CliResultHelper};

/// Sign a file with a key of the HSM.
///
/// The signature bytes are written to `signature.file` in the current directory,
/// unless an output file is given.
#[derive(Parser, Debug)]
#[clap(verbatim_doc_comment)]
pub struct SignAction {
    /// The file to sign
    #[clap(required = true, name = "FILE")]
    input_file: PathBuf,

    /// The label of the signing key.
    /// May be omitted by user object sessions.
    #[clap(long = "key-label", short = 'k', default_value = "")]
    key_label: String,

    /// The file receiving the signature
    #[clap(required = false, long, short = 'o')]
    output_file: Option<PathBuf>,
}

impl SignAction {
    pub async fn run(&self, hsm_client: &HsmClient) -> CliResult<()> {
        let signature_file = match &self.output_file {
            Some(output_file) => hsm_client
                .sign_to(&self.input_file, &self.key_label, output_file)
                .await,
            None => hsm_client.sign(&self.input_file, &self.key_label).await,
        }
        .with_context(|| "Can't execute the signature on the HSM")?;

        let mut stdout = console::Stdout::new("The file was successfully signed");
        stdout.set_output_file(signature_file.display().to_string());
        stdout.write()
    }
}

/// Verify the signature of a file with a key of the HSM.
#[derive(Parser, Debug)]
pub struct VerifyAction {
    /// The signed file
    #[clap(required = true, name = "FILE")]
    input_file: PathBuf,

    /// The file holding the signature
    #[clap(required = true, name = "SIGNATURE_FILE")]
    signature_file: PathBuf,

    /// The label of the verification key.
    /// May be omitted by user object sessions.
    #[clap(long = "key-label", short = 'k', default_value = "")]
    key_label: String,
}

impl VerifyAction {
    pub async fn run(&self, hsm_client: &HsmClient) -> CliResult<()> {
        hsm_client
            .verify(&self.input_file, &self.signature_file, &self.key_label)
            .await
            .with_context(|| "The signature could not be verified")?;

        console::Stdout::new("The signature is valid").write()
    }
}
