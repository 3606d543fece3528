//! `StudyRoom` development task store.
//!
//! Serves the task store API from memory so the client can be run
//! without a real backend.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 127.0.0.1:8000 with the demo accounts
//! cargo run --bin studyroom-devstore
//!
//! # Run on custom address
//! cargo run --bin studyroom-devstore -- --bind 0.0.0.0:8080
//!
//! # Then point the client at it
//! STUDYROOM_TOKEN=ana-token cargo run --bin studyroom -- sessions
//! ```

use std::sync::Arc;

use clap::Parser;
use studyroom_devstore::config::{DevStoreCliArgs, DevStoreConfig};
use studyroom_devstore::server::{self, DevState};

#[tokio::main]
async fn main() {
    let cli = DevStoreCliArgs::parse();

    let config = match DevStoreConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(
        addr = %config.bind_addr,
        accounts = config.accounts.len(),
        max_participants = config.max_participants,
        "starting studyroom devstore"
    );

    let state = Arc::new(DevState::from_config(&config));

    match server::start_server_with_state(&config.bind_addr, state).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "devstore listening");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "devstore server task failed");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start devstore");
            std::process::exit(1);
        }
    }
}
