use anyhow::Context;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg: rust_swarm::config::Config =
        rust_swarm::config_io::load_or_create_config("config.toml")
            .await
            .context("unable to read or create config.toml")?;

    rust_swarm::config::init_tracing(&cfg);
    tracing::info!("rust-swarm booted");

    rust_swarm::app::run(cfg).await?;
    Ok(())
}
