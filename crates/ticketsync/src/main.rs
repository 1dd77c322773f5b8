//! `ticketsync` command line entry point.

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    ticketsync::cli::run().await
}
