//! leadtrap-engine - lead acquisition and outreach CLI
//!
//! Drives the scan -> enrich -> dispatch pipeline against the configured
//! data and messaging providers. Inbound webhook delivery is an external
//! concern; the `inbound` subcommand feeds an already-verified
//! notification to the attributor.

use anyhow::Result;
use clap::{Parser, Subcommand};
use leadtrap_common::config::{EngineConfig, TomlConfig};
use leadtrap_engine::clients::radar::RadarClient;
use leadtrap_engine::clients::sms::TwilioClient;
use leadtrap_engine::criteria::SearchCriteria;
use leadtrap_engine::{campaign, enrich, inbound, scan};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "leadtrap-engine", about = "Lead acquisition and outreach engine")]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, default_value = "leadtrap.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan the watch set and report owned vs. new identifiers (spends nothing)
    Scan {
        #[arg(long)]
        state: String,
        #[arg(long)]
        city: Option<String>,
        #[arg(long)]
        strategy: String,
    },
    /// Purchase and save full records for the given identifiers
    Enrich {
        #[arg(long)]
        state: String,
        #[arg(long)]
        city: Option<String>,
        #[arg(long)]
        strategy: String,
        /// Identifiers to enrich
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Create a campaign and queue leads on its roster
    CreateCampaign {
        #[arg(long)]
        name: String,
        /// Message template with {name}, {address} and {city} placeholders
        #[arg(long)]
        template: String,
        #[arg(required = true)]
        lead_ids: Vec<String>,
    },
    /// Send to every queued roster entry of a campaign
    Dispatch {
        campaign_id: Uuid,
    },
    /// Send a single immediate message to one lead
    SendOne {
        #[arg(long)]
        lead_id: String,
        #[arg(long)]
        body: String,
        /// Attach the message to a campaign's conversation
        #[arg(long)]
        campaign_id: Option<Uuid>,
    },
    /// Record a verified inbound reply notification
    Inbound {
        #[arg(long)]
        from: String,
        #[arg(long)]
        body: String,
        #[arg(long)]
        message_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let toml_config = TomlConfig::load(&cli.config)?;
    let config = EngineConfig::resolve(&toml_config);

    let db_path = config.database_path();
    info!("Database: {}", db_path.display());
    let pool = leadtrap_engine::db::init_database_pool(&db_path).await?;

    match cli.command {
        Command::Scan {
            state,
            city,
            strategy,
        } => {
            let client = RadarClient::new(config.require_radar_token()?)?;
            let criteria = SearchCriteria::new(state, city, strategy);
            let summary = scan::scan(&pool, &client, &criteria).await?;

            println!("Scan report for {}", criteria.watch_set_name());
            println!("  Total found:   {}", summary.total_found);
            println!("  Already owned: {}", summary.owned_full.len());
            println!("  New:           {}", summary.new_previews.len());
            for preview in &summary.new_previews {
                println!(
                    "    {}  {}  ({})",
                    preview.radar_id, preview.address, preview.owner_label
                );
            }
        }
        Command::Enrich {
            state,
            city,
            strategy,
            ids,
        } => {
            let client = RadarClient::new(config.require_radar_token()?)?;
            let criteria = SearchCriteria::new(state, city, strategy);
            let outcome = enrich::enrich(&pool, &client, &ids, &criteria).await?;

            println!(
                "Enrichment complete: {} saved, {} failed (batch {})",
                outcome.saved_count, outcome.failed_count, outcome.batch_id
            );
        }
        Command::CreateCampaign {
            name,
            template,
            lead_ids,
        } => {
            let (campaign_id, queued) =
                campaign::create_campaign_with_roster(&pool, &name, &template, &lead_ids).await?;
            println!("Campaign {} created with {} queued leads", campaign_id, queued);
        }
        Command::Dispatch { campaign_id } => {
            let messaging = TwilioClient::new(config.messaging.clone())?;
            let outcome = campaign::dispatch_campaign(&pool, &messaging, campaign_id).await?;
            let logged =
                leadtrap_engine::db::messages::count_campaign_messages(&pool, campaign_id).await?;
            println!(
                "Dispatch complete: {} sent, {} failed ({} messages logged)",
                outcome.sent, outcome.failed, logged
            );
        }
        Command::SendOne {
            lead_id,
            body,
            campaign_id,
        } => {
            let messaging = TwilioClient::new(config.messaging.clone())?;
            let message =
                campaign::send_one_off(&pool, &messaging, campaign_id, &lead_id, &body).await?;
            println!("Message to {} recorded as {}", lead_id, message.status);
        }
        Command::Inbound {
            from,
            body,
            message_id,
        } => {
            inbound::attribute(&pool, &from, &body, &message_id).await?;
            println!("Inbound message processed");
        }
    }

    Ok(())
}
