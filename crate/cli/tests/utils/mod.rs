use std::{
    io::Write,
    path::{Path, PathBuf},
    process::{Command, Output, Stdio},
};

use ksema_cli::error::{CliError, result::CliResult};
use ksema_client::{ClientConf, KSEMA_CLI_CONF_ENV};
use ksema_test_server::TestsContext;
use zeroize::Zeroizing;

/// A command running the `ksema` binary built for these tests
pub(crate) fn ksema_cmd() -> Command {
    Command::new(env!("CARGO_BIN_EXE_ksema"))
}

/// Recover output logs from a command call `cmd` and re-inject it into stdio
pub(crate) fn recover_cmd_logs(cmd: &mut Command) -> Output {
    let output = cmd
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .unwrap();
    std::io::stdout()
        .write_all(format!("\r\x1b[K{}", String::from_utf8_lossy(&output.stdout)).as_bytes())
        .unwrap();
    std::io::stderr()
        .write_all(format!("\r\x1b[K{}", String::from_utf8_lossy(&output.stderr)).as_bytes())
        .unwrap();
    output
}

/// Write a configuration pointing at the stub HSM of `context`
pub(crate) fn write_conf(context: &TestsContext, dir: &Path) -> CliResult<PathBuf> {
    let config = context.hsm.config();
    let conf = ClientConf {
        server_url: context.server_url.clone(),
        api_key: Zeroizing::new(config.api_key.clone()),
        pin: Zeroizing::new(config.pin.clone()),
        ..ClientConf::default()
    };
    let conf_path = dir.join("hsm.json");
    conf.save(&conf_path)?;
    Ok(conf_path)
}

/// Run the CLI with `args` and return its standard output
pub(crate) fn run_cli(conf_path: &Path, args: &[&str]) -> CliResult<String> {
    let mut cmd = ksema_cmd();
    cmd.env(KSEMA_CLI_CONF_ENV, conf_path);
    cmd.env_remove("KSEMA_DEFAULT_URL");
    cmd.env_remove("KSEMA_CLI_FORMAT");
    cmd.args(args);
    let output = recover_cmd_logs(&mut cmd);
    if output.status.success() {
        return Ok(String::from_utf8(output.stdout)?)
    }
    Err(CliError::Default(
        std::str::from_utf8(&output.stderr)?.to_owned(),
    ))
}
