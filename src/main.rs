#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tableside_lib::run().await
}
