use serde::Serialize;

use crate::error::result::CliResult;

pub const KSEMA_CLI_FORMAT: &str = "KSEMA_CLI_FORMAT";
pub const CLI_DEFAULT_FORMAT: &str = "text";
pub const CLI_JSON_FORMAT: &str = "json";

/// What an action prints on stdout, as text or JSON depending on `KSEMA_CLI_FORMAT`
#[derive(Serialize, Debug, Default)]
pub struct Stdout {
    stdout: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_file: Option<String>,
}

impl Stdout {
    #[must_use]
    pub fn new(stdout: &str) -> Self {
        Self {
            stdout: stdout.to_owned(),
            ..Default::default()
        }
    }

    pub fn set_output_file<T: Into<String>>(&mut self, output_file: T) {
        self.output_file = Some(output_file.into());
    }

    /// Writes the output to the console.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON serialization fails.
    pub fn write(&self) -> CliResult<()> {
        let format = std::env::var(KSEMA_CLI_FORMAT)
            .unwrap_or_else(|_| CLI_DEFAULT_FORMAT.to_owned())
            .to_lowercase();

        if format == CLI_JSON_FORMAT {
            println!("{}", serde_json::to_string_pretty(&self)?);
        } else {
            if !self.stdout.is_empty() {
                println!("{}", self.stdout);
            }
            if let Some(output_file) = &self.output_file {
                println!("Output written to {output_file}");
            }
        }

        Ok(())
    }
}
