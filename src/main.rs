//! openerp-check - connectivity check for an OpenERP server.
//!
//! Reads `OPENERP_*` variables (see `openerp_rpc::config`), prints the server
//! version, logs in, and optionally resolves external ids:
//!
//! ```text
//! openerp-check [MODEL EXTERNAL_ID...]
//! ```

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use openerp_rpc::{Client, ClientConfig, ExternalId};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "openerp_rpc=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = ClientConfig::from_env().context("Failed to read OPENERP_* configuration")?;
    tracing::info!("Connecting to {}:{}{}", config.url, config.port, config.root_path);
    let client = Client::new(config).context("Failed to build client")?;

    let version = client
        .auth()
        .version()
        .await
        .context("Failed to fetch server version")?;
    println!("server version: {}", version);

    let user_id = client.login().await.context("Login failed")?;
    println!("user id: {}", user_id);

    let mut args = std::env::args().skip(1);
    if let Some(model) = args.next() {
        let external_ids: Vec<String> = args.collect();
        let refs: Vec<&str> = external_ids.iter().map(String::as_str).collect();
        let resolved = client
            .object()
            .resolve_external_ids(&model, &refs)
            .await
            .with_context(|| format!("Failed to resolve external ids on {}", model))?;

        for external_id in &refs {
            match resolved.get(&ExternalId::parse(external_id).to_string()) {
                Some(id) => println!("{} -> {}", external_id, id),
                None => println!("{} -> (unknown)", external_id),
            }
        }
    }

    Ok(())
}
