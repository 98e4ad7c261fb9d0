//! LavaVu Server Binary
//!
//! Boots a headless session and serves it. Arguments are files to load
//! (scripts, state JSON); `LAVAVU_PORT` picks the first port to try.

use std::path::{Path, PathBuf};

use lavavu_core::{Session, SessionConfig, SessionMode};
use lavavu_server::{Server, ServerConfig};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut config = SessionConfig::load_user()?;
    config.apply_env();
    config.mode = SessionMode::Thread;
    let session = Session::new(config)?;

    for arg in std::env::args().skip(1) {
        session.file(Path::new(&arg), None, Value::Null)?;
    }

    let port = match std::env::var("LAVAVU_PORT") {
        Ok(port) => port.parse()?,
        Err(_) => ServerConfig::default().port,
    };
    let mut server_config = ServerConfig::default().with_port(port);
    if session.config().html_path.is_none() {
        server_config.static_path =
            Some(PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/static")));
    }
    let mut server = Server::start(&session, &server_config)?;
    println!("{}", server.port());

    tokio::signal::ctrl_c().await?;
    server.close();
    lavavu_core::shutdown_all();
    Ok(())
}
