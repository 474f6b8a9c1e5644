// SPDX-FileCopyrightText: 2026 Meterbot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Meterbot - a metered AI answering bot with prepaid credit plans.
//!
//! This is the binary entry point: the long-running `serve` command plus the
//! operator commands for plans, payments and the answer cache.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod admin;
mod serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Meterbot - a metered AI answering bot with prepaid credit plans.
#[derive(Parser, Debug)]
#[command(name = "meterbot", version, about, long_about = None)]
struct Cli {
    /// Load configuration from this file instead of the standard locations.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the bot: Telegram transport, payment callback server and cache sweeper.
    Serve,
    /// Manage purchasable credit plans.
    Plan {
        #[command(subcommand)]
        command: PlanCommands,
    },
    /// Inspect payments.
    Payments {
        #[command(subcommand)]
        command: PaymentsCommands,
    },
    /// Maintain the answer cache.
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
}

#[derive(Subcommand, Debug)]
enum PlanCommands {
    /// Add a new plan.
    Add {
        #[arg(long)]
        name: String,
        /// Price in the payment provider's currency unit.
        #[arg(long)]
        price: i64,
        /// Credits granted when a payment for this plan completes.
        #[arg(long)]
        credits: i64,
        #[arg(long)]
        description: Option<String>,
    },
    /// List all plans.
    List,
}

#[derive(Subcommand, Debug)]
enum PaymentsCommands {
    /// List completed payments whose credit grant was never confirmed.
    Unreconciled,
}

#[derive(Subcommand, Debug)]
enum CacheCommands {
    /// Remove expired answers.
    Sweep,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => meterbot_config::load_and_validate_path(path),
        None => meterbot_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            meterbot_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config).await,
        Some(Commands::Plan { command }) => match command {
            PlanCommands::Add {
                name,
                price,
                credits,
                description,
            } => {
                admin::run_plan_add(
                    &config,
                    admin::PlanArgs {
                        name,
                        price,
                        credits,
                        description,
                    },
                )
                .await
            }
            PlanCommands::List => admin::run_plan_list(&config).await,
        },
        Some(Commands::Payments {
            command: PaymentsCommands::Unreconciled,
        }) => admin::run_payments_unreconciled(&config).await,
        Some(Commands::Cache {
            command: CacheCommands::Sweep,
        }) => admin::run_cache_sweep(&config).await,
        None => {
            println!("meterbot: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("meterbot: {e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(not(target_env = "msvc"))]
    fn jemalloc_is_active() {
        // Only jemalloc supports advancing the epoch.
        use tikv_jemalloc_ctl::{epoch, stats};
        epoch::advance().unwrap();
        let allocated = stats::allocated::read().unwrap();
        assert!(allocated > 0, "jemalloc should report non-zero allocation");
    }

    #[test]
    fn binary_loads_config_defaults() {
        let config = meterbot_config::load_and_validate_str("")
            .expect("default config should be valid");
        assert_eq!(config.bot.name, "meterbot");
        assert_eq!(config.bot.initial_credits, 20);
    }

    #[test]
    fn cli_parses_plan_add() {
        let cli = Cli::try_parse_from([
            "meterbot", "plan", "add", "--name", "Starter", "--price", "50000", "--credits",
            "100",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Plan {
                command:
                    PlanCommands::Add {
                        name,
                        price,
                        credits,
                        description,
                    },
            }) => {
                assert_eq!(name, "Starter");
                assert_eq!(price, 50_000);
                assert_eq!(credits, 100);
                assert!(description.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn cli_accepts_global_config_flag() {
        let cli = Cli::try_parse_from(["meterbot", "cache", "sweep", "--config", "/tmp/m.toml"])
            .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/m.toml")));
        assert!(matches!(
            cli.command,
            Some(Commands::Cache {
                command: CacheCommands::Sweep
            })
        ));
    }

    #[test]
    fn cli_rejects_plan_add_without_credits() {
        let result = Cli::try_parse_from(["meterbot", "plan", "add", "--name", "x", "--price", "1"]);
        assert!(result.is_err());
    }
}
