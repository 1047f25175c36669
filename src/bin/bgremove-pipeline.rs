//! Background removal CLI tool
//!
//! Command-line interface for the bgremove-pipeline library using the
//! built-in border-key remover.

#[cfg(feature = "cli")]
use bgremove_pipeline::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    panic!("CLI feature not enabled. Please rebuild with --features cli");
}
