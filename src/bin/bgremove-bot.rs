//! Background removal chat bot
//!
//! Long-polls the Telegram Bot API and answers every image with a PNG whose
//! background is transparent. Configuration comes from the environment; see
//! `bgremove-bot --help` for flags that override it.

#[cfg(feature = "cli")]
use bgremove_bot::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Please rebuild with --features cli");
    std::process::exit(2);
}
