//! Box supervisor process.
//!
//! Spawned by the runtime for each box; see `boxlease::shim`.

use clap::Parser;

use boxlease::shim::{ShimArgs, run};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = ShimArgs::parse();
    if let Err(e) = run(args).await {
        tracing::error!("Supervisor failed: {}", e);
        eprintln!("boxlease-shim: {}", e);
        std::process::exit(1);
    }
}
