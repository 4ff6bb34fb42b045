use std::process;

use ksema_cli::ksema_main;

#[tokio::main]
async fn main() {
    if let Some(err) = ksema_main().await.err() {
        eprintln!("ERROR: {err}");
        process::exit(1);
    }
}
