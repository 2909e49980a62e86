use eyre::Result;

mod cli;
pub(crate) mod config;
mod dns;
mod ui;

#[tokio::main]
async fn main() -> Result<()> {
    cli::run().await
}
