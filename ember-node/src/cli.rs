use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;

use ember_forge::{RuntimeBackend, WasmiBackend, WasmtimeBackend};
use ember_kiln::{GasRegister, HostCtx, Kiln, KilnConfig, TxContext};
use ember_storage::StoreSpaces;
use ember_types::env::BlockInfo;

use crate::config::NodeConfig;
use crate::error::NodeError;
use crate::pinner::Pinner;

#[derive(Parser)]
#[command(
    name = "ember",
    about = "Ember contract engine node — metered WebAssembly contract execution",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the node
    Run {
        /// Path to config file
        #[arg(short, long, default_value = "ember.toml")]
        config: String,
        /// Override the home directory
        #[arg(long)]
        home: Option<String>,
        /// Override the runtime backend: "compiler" or "interpreter"
        #[arg(long)]
        backend: Option<String>,
    },
    /// Write a default configuration file
    Init {
        /// Output directory
        #[arg(short, long, default_value = ".")]
        dir: String,
    },
}

/// Build the runtime backend selected by name. The two backends are
/// swappable without touching anything else.
fn build_backend(name: &str) -> Result<Arc<dyn RuntimeBackend<HostCtx>>, NodeError> {
    match name {
        "compiler" => Ok(Arc::new(WasmtimeBackend::new()?)),
        "interpreter" => Ok(Arc::new(WasmiBackend::new()?)),
        other => Err(NodeError::Config(format!(
            "unknown backend '{other}', expected 'compiler' or 'interpreter'"
        ))),
    }
}

fn genesis_context(spaces: &StoreSpaces) -> TxContext {
    TxContext::new(
        spaces.clone(),
        BlockInfo {
            height: 0,
            timestamp: 0,
            gas_limit: 0,
            hash: Vec::new(),
            proposer: [0u8; 20],
        },
        None,
        0,
    )
}

pub async fn run(cli: Cli) -> Result<(), NodeError> {
    match cli.command {
        Command::Run {
            config,
            home,
            backend,
        } => {
            let path = PathBuf::from(&config);
            let mut config = if path.exists() {
                NodeConfig::load(&path)?
            } else {
                NodeConfig::default()
            };
            if let Some(home) = home {
                config.home = home;
            }
            if let Some(backend) = backend {
                config.engine.backend = backend;
            }

            let vm = build_backend(&config.engine.backend)?;
            let mut kiln_config = KilnConfig::new(&config.home);
            kiln_config.denom = config.engine.denom.clone();
            kiln_config.chain_id = config.engine.chain_id;
            kiln_config.memory_limit = config.engine.memory_limit;
            kiln_config.shared_aot_cache =
                config.engine.shared_aot_cache.as_ref().map(PathBuf::from);

            let kiln = Kiln::new(vm, kiln_config, GasRegister::default())?;
            let spaces = StoreSpaces::in_memory();
            let genesis = genesis_context(&spaces);
            kiln.init_genesis(&genesis)?;
            let _pinner = Pinner::spawn(kiln.clone(), genesis);

            info!(
                home = %config.home,
                backend = kiln.backend_name(),
                "ember node ready"
            );
            tokio::signal::ctrl_c().await?;
            info!("shutting down");
            Ok(())
        }
        Command::Init { dir } => {
            let path = PathBuf::from(dir).join("ember.toml");
            NodeConfig::default().save(&path)?;
            info!(path = %path.display(), "wrote default configuration");
            Ok(())
        }
    }
}
