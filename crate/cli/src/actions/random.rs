use std::path::PathBuf;

use base64::{Engine, engine::general_purpose::STANDARD as b64};
use clap::Parser;
use ksema_client::{HsmClient, write_bytes_to_file};

use super::console;
use crate::error::result::{CliResult, CliResultHelper};

/// Generate random bytes with the HSM.
///
/// The bytes are printed in base64, or written raw to the output file.
/// A length of 0 lets the HSM pick its default length.
#[derive(Parser, Debug)]
#[clap(verbatim_doc_comment)]
pub struct RandomAction {
    /// The number of random bytes
    #[clap(long = "length", short = 'l', default_value = "0")]
    length: u16,

    /// The file receiving the random bytes
    #[clap(required = false, long, short = 'o')]
    output_file: Option<PathBuf>,
}

impl RandomAction {
    pub async fn run(&self, hsm_client: &HsmClient) -> CliResult<()> {
        let random = hsm_client
            .random(self.length)
            .await
            .with_context(|| "Can't generate random bytes on the HSM")?;

        let stdout = match &self.output_file {
            Some(output_file) => {
                write_bytes_to_file(&b64.decode(&random)?, output_file)?;
                let mut stdout = console::Stdout::new("");
                stdout.set_output_file(output_file.display().to_string());
                stdout
            }
            None => console::Stdout::new(&random),
        };
        stdout.write()
    }
}
