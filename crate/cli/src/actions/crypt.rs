use std::path::PathBuf;

use clap::Parser;
use ksema_client::{HsmClient, read_bytes_from_file, write_bytes_to_file};

use super::console;
use crate::{
    cli_bail,
    error::result::{CliResult, CliResultHelper},
};

/// Encrypt a file with a key of the HSM.
///
/// The ciphertext is printed in base64, or written to the output file.
///
/// Note: this is not a streaming call: the file is entirely loaded in memory before being sent for encryption.
#[derive(Parser, Debug)]
#[clap(verbatim_doc_comment)]
pub struct EncryptAction {
    /// The file to encrypt
    #[clap(required = true, name = "FILE")]
    input_file: PathBuf,

    /// The label of the key.
    /// May be omitted by user object sessions.
    #[clap(long = "key-label", short = 'k', default_value = "")]
    key_label: String,

    /// The file receiving the base64 ciphertext
    #[clap(required = false, long, short = 'o')]
    output_file: Option<PathBuf>,
}

impl EncryptAction {
    pub async fn run(&self, hsm_client: &HsmClient) -> CliResult<()> {
        let data = read_bytes_from_file(&self.input_file)?;

        let ciphertext = hsm_client
            .encrypt(&data, &self.key_label)
            .await
            .with_context(|| "Can't execute the encryption on the HSM")?;

        let stdout = match &self.output_file {
            Some(output_file) => {
                write_bytes_to_file(ciphertext.as_bytes(), output_file)?;
                let mut stdout = console::Stdout::new("");
                stdout.set_output_file(output_file.display().to_string());
                stdout
            }
            None => console::Stdout::new(&ciphertext),
        };
        stdout.write()
    }
}

/// Decrypt a base64 ciphertext with a key of the HSM.
///
/// The ciphertext is given on the command line or read from a file.
/// The plaintext is printed as text, or written as raw bytes to the output file.
#[derive(Parser, Debug)]
#[clap(verbatim_doc_comment)]
pub struct DecryptAction {
    /// The base64 ciphertext
    #[clap(name = "CIPHERTEXT", group = "input")]
    ciphertext: Option<String>,

    /// A file containing the base64 ciphertext
    #[clap(long = "input-file", short = 'i', group = "input")]
    input_file: Option<PathBuf>,

    /// The label of the key.
    /// May be omitted by user object sessions.
    #[clap(long = "key-label", short = 'k', default_value = "")]
    key_label: String,

    /// The file receiving the plaintext bytes
    #[clap(required = false, long, short = 'o')]
    output_file: Option<PathBuf>,
}

impl DecryptAction {
    pub async fn run(&self, hsm_client: &HsmClient) -> CliResult<()> {
        let ciphertext = if let Some(ciphertext) = &self.ciphertext {
            ciphertext.clone()
        } else if let Some(input_file) = &self.input_file {
            String::from_utf8(read_bytes_from_file(input_file)?)?
                .trim()
                .to_owned()
        } else {
            cli_bail!("Either a CIPHERTEXT or `--input-file` must be specified")
        };

        let stdout = match &self.output_file {
            Some(output_file) => {
                let plaintext = hsm_client
                    .decrypt_bytes(&ciphertext, &self.key_label)
                    .await
                    .with_context(|| "Can't execute the decryption on the HSM")?;
                write_bytes_to_file(&plaintext, output_file)?;
                let mut stdout = console::Stdout::new("");
                stdout.set_output_file(output_file.display().to_string());
                stdout
            }
            None => {
                let plaintext = hsm_client
                    .decrypt(&ciphertext, &self.key_label)
                    .await
                    .with_context(|| "Can't execute the decryption on the HSM")?;
                console::Stdout::new(&plaintext)
            }
        };
        stdout.write()
    }
}
