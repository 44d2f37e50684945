use crate::options::Options;
use crate::state::ManagedState;
use anyhow::{Context as _, Result};
use dsconverge_core::{catalog, Catalog, Version};
use dsconverge_store_local::LocalServer;
use std::process::exit;
use tokio::sync::Mutex;
use tracing::warn;

/// Create the single-threaded tokio runtime used by the CLI.
///
/// Panics if the runtime cannot be created.
pub fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to initialize tokio runtime")
}

/// Handle a Result, printing the error and exiting with code 1 on failure.
pub fn handle_result(r: Result<()>) {
    match r {
        Ok(()) => {}
        Err(e) => {
            eprintln!("dsconverge error: {:?}", e);
            exit(1);
        }
    }
}

/// Everything a command works with: the catalog, the server and the
/// managed state.
pub struct Session {
    pub options: Options,
    pub catalog: Catalog,
    pub server: LocalServer,
    pub state: Mutex<ManagedState>,
}

impl Session {
    pub fn open(options: &Options) -> Result<Session> {
        let server = LocalServer::open(&options.server, builtin_catalog()?)?;
        let state = ManagedState::open(&options.state)?;
        Ok(Session {
            options: options.clone(),
            catalog: builtin_catalog()?,
            server,
            state: Mutex::new(state),
        })
    }

    /// The version to validate against: `--server-version`, else the plan's
    /// own, else whatever the server reports.
    pub async fn server_version(&self, planned: Option<Version>) -> Result<Version> {
        let reported = self.server.version().await?;
        let version = self.options.server_version.or(planned).unwrap_or(reported);
        if version != reported {
            warn!(%reported, %version, "validating against a version the server does not report");
        }
        Ok(version)
    }
}

pub fn builtin_catalog() -> Result<Catalog> {
    catalog::builtin().context("built-in catalog is inconsistent")
}
