//! Binary entrypoint for the heartree tool

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    heartree::cli::run().await
}
