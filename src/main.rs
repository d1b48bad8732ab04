use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    lanchess::cli::run_cli().await
}
