//! paddock CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr};
use tracing::debug;

use paddock::Deployment;
use paddock_common::HostFacts;
use paddock_config::Config;
use paddock_runtime::DockerRuntime;

/// paddock - Declarative container and virtual network topology manager
#[derive(Debug, Parser)]
#[command(name = "paddock")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration files, merged in order
    #[arg(short = 'f', long = "config", default_value = "paddock.yaml")]
    pub config: Vec<PathBuf>,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// A container selector shared by the lifecycle subcommands.
#[derive(Debug, Args)]
pub struct Selector {
    /// Apply to every container of the topology
    #[arg(short, long, conflicts_with = "group")]
    pub all: bool,

    /// Restrict to one group
    #[arg(short, long)]
    pub group: Option<String>,

    /// Restrict to one container of the group
    #[arg(short, long, requires = "group")]
    pub container: Option<String>,
}

/// paddock commands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start containers, creating them from scratch
    Start {
        /// What to start.
        #[command(flatten)]
        selector: Selector,
    },

    /// Gracefully stop containers
    Stop {
        /// What to stop.
        #[command(flatten)]
        selector: Selector,
    },

    /// Remove containers and whatever is left of previous incarnations
    Purge {
        /// What to purge.
        #[command(flatten)]
        selector: Selector,
    },

    /// Manage virtual networks
    Network {
        /// The network operation.
        #[command(subcommand)]
        command: NetworkCommands,
    },

    /// Validate the configuration without touching the runtime
    Validate,
}

/// Network subcommands.
#[derive(Debug, Subcommand)]
pub enum NetworkCommands {
    /// Create a network, or all of them
    Create {
        /// Network name; omit to create every declared network
        name: Option<String>,
    },

    /// Delete a network, or all of them
    Delete {
        /// Network name; omit to delete every declared network
        name: Option<String>,
    },
}

impl Cli {
    /// Execute the CLI command.
    pub async fn execute(self) -> Result<()> {
        let config = load_config(&self.config)?;
        let facts = HostFacts::detect()?;
        let deployment = Deployment::from_config(&config, &facts)?;
        debug!(host = %facts.host_name, "topology validated");

        match self.command {
            Commands::Validate => {
                println!("Configuration is valid");
                Ok(())
            }

            Commands::Start { selector } => {
                let runtime = DockerRuntime::connect()?;
                let started = deployment
                    .start_containers(
                        &runtime,
                        selector.all,
                        selector.group.as_deref(),
                        selector.container.as_deref(),
                    )
                    .await?;
                if !started {
                    println!("Nothing to start");
                }
                Ok(())
            }

            Commands::Stop { selector } => {
                let runtime = DockerRuntime::connect()?;
                let existed = deployment
                    .stop_containers(
                        &runtime,
                        selector.all,
                        selector.group.as_deref(),
                        selector.container.as_deref(),
                    )
                    .await?;
                if !existed {
                    println!("Nothing to stop");
                }
                Ok(())
            }

            Commands::Purge { selector } => {
                let runtime = DockerRuntime::connect()?;
                let purged = deployment
                    .purge_containers(
                        &runtime,
                        selector.all,
                        selector.group.as_deref(),
                        selector.container.as_deref(),
                    )
                    .await?;
                if !purged {
                    println!("Nothing to purge");
                }
                Ok(())
            }

            Commands::Network { command } => {
                let runtime = DockerRuntime::connect()?;
                match command {
                    NetworkCommands::Create { name } => {
                        let created = deployment
                            .create_networks(&runtime, name.as_deref())
                            .await?;
                        if !created {
                            println!("Nothing to create");
                        }
                    }
                    NetworkCommands::Delete { name } => {
                        let deleted = deployment
                            .delete_networks(&runtime, name.as_deref())
                            .await?;
                        if !deleted {
                            println!("Nothing to delete");
                        }
                    }
                }
                Ok(())
            }
        }
    }
}

fn load_config(paths: &[PathBuf]) -> Result<Config> {
    let mut merged = Config::default();
    for path in paths {
        debug!(path = %path.display(), "loading configuration file");
        let raw = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("reading configuration file {}", path.display()))?;
        let overlay = Config::from_yaml(&raw)
            .wrap_err_with(|| format!("parsing configuration file {}", path.display()))?;
        merged.merge(overlay);
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn selector_requires_group_for_container() {
        let err = Cli::try_parse_from(["paddock", "start", "--container", "proxy"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn network_subcommands_parse() {
        let cli = Cli::try_parse_from(["paddock", "network", "create", "lan"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Network {
                command: NetworkCommands::Create { name: Some(_) }
            }
        ));
    }
}
