#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = contest_rust::run().await {
        eprintln!("contest-rust fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
