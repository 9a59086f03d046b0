//! runmetrics CLI entry point.

use runmetrics_lib::cli::{self, Cli};
use runmetrics_lib::core::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();
    cli::execute(cli).await
}
