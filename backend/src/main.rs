#[tokio::main]
async fn main() -> anyhow::Result<()> {
    #[cfg(feature = "seed")]
    {
        let config = server::config::Config::load()?;
        let state = server::state::State::new(config).await?;
        process::seed(&state, "+996555000000", "admin123").await?;
    }

    server::start_server().await
}
