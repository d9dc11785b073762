pub mod app;
pub mod config;

use anyhow::Result;
use relay_axum::RelayAxumApp;
use relay_core::RelayConfigSnapshot;

pub struct RelayServer {
    pub config: RelayConfigSnapshot,
    pub ax: RelayAxumApp,
}

impl RelayServer {
    pub fn addr(&self) -> String {
        let host = self.config.get_string_or("http.host", "127.0.0.1");
        let port = self.config.get_string_or("http.port", "3030");
        format!("{host}:{port}")
    }
}

pub async fn build() -> Result<RelayServer> {
    let config = config::config().snapshot();
    let ax = app::relay_app(&config).await?;
    Ok(RelayServer { config, ax })
}
