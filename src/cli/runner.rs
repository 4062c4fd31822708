//! CLI runner - executes commands

use crate::cli::commands::{Cli, Commands, OutputFormat};
use crate::config::{Catalog, TapConfig};
use crate::engine::{SyncConfig, SyncEngine};
use crate::error::{Error, Result, ResultExt};
use crate::output::JsonLinesSink;
use crate::selection::{self, Selection};
use crate::state::StateManager;
use crate::streams;
use crate::transport::ListrakClient;
use serde::Serialize;
use std::path::Path;
use tracing::info;

/// CLI runner
pub struct Runner {
    cli: Cli,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Run the CLI command
    pub async fn run(&self) -> Result<()> {
        match &self.cli.command {
            Commands::Check { config_json } => self.check(config_json.as_deref()).await,
            Commands::Discover => self.discover(),
            Commands::Read {
                catalog,
                streams,
                config_json,
            } => {
                self.read(
                    catalog.as_deref(),
                    streams.as_deref(),
                    config_json.as_deref(),
                )
                .await
            }
        }
    }

    /// Load the run configuration; inline JSON takes precedence
    fn load_config(&self, inline: Option<&str>) -> Result<TapConfig> {
        if let Some(json) = inline {
            return TapConfig::from_json(json);
        }

        let path = self
            .cli
            .config
            .as_ref()
            .ok_or_else(|| Error::config("Config file not specified (use --config)"))?;
        TapConfig::from_file(path)
    }

    /// Load state; inline JSON takes precedence and is not persisted
    fn load_state(&self) -> Result<StateManager> {
        if let Some(state_json) = &self.cli.state_json {
            StateManager::from_json(state_json)
        } else if let Some(path) = &self.cli.state {
            StateManager::from_file(path)
        } else {
            Ok(StateManager::in_memory())
        }
    }

    async fn check(&self, config_json: Option<&str>) -> Result<()> {
        let config = self.load_config(config_json)?;
        ListrakClient::new(&config)?.check().await?;

        self.output(&serde_json::json!({
            "type": "CONNECTION_STATUS",
            "connectionStatus": {"status": "SUCCEEDED"}
        }))
    }

    fn discover(&self) -> Result<()> {
        self.output(&streams::discover())
    }

    async fn read(
        &self,
        catalog: Option<&Path>,
        stream_list: Option<&str>,
        config_json: Option<&str>,
    ) -> Result<()> {
        let config = self.load_config(config_json)?;
        let selection = self.selection(catalog, stream_list)?;
        let state = self.load_state()?;

        info!(
            streams = ?selection.emit,
            state_file = ?self.cli.state,
            "Starting sync"
        );

        let client = ListrakClient::new(&config)?;
        let mut engine = SyncEngine::new(client, state, SyncConfig::from_tap_config(&config));
        let mut sink = JsonLinesSink::stdout().pretty(self.cli.format == OutputFormat::Pretty);

        engine.run(&selection, &mut sink).await?;
        Ok(())
    }

    /// Resolve the selection from a catalog file or a stream list
    fn selection(&self, catalog: Option<&Path>, stream_list: Option<&str>) -> Result<Selection> {
        let table = streams::dependency_table();

        if let Some(list) = stream_list {
            let names = list.split(',').map(str::trim).filter(|s| !s.is_empty());
            return selection::resolve(names, &table);
        }

        match catalog {
            Some(path) => {
                let catalog = Catalog::from_file(path)
                    .with_context(|| format!("Failed to load catalog {}", path.display()))?;
                selection::resolve_catalog(&catalog, &table)
            }
            None => Ok(Selection::default()),
        }
    }

    /// Print a document to stdout
    fn output<T: Serialize>(&self, value: &T) -> Result<()> {
        let text = match self.cli.format {
            OutputFormat::Json => serde_json::to_string(value)?,
            OutputFormat::Pretty => serde_json::to_string_pretty(value)?,
        };
        println!("{text}");
        Ok(())
    }
}
