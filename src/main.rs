use clap::Parser;
use color_eyre::Result;
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use tpp::{Config, DataService, KvStore, Profile, cli::{self, Cli, Commands}};

fn main() -> Result<()> {
    // Set up error reporting with color-eyre
    color_eyre::install()?;

    // Logs go to stderr so command output stays clean
    let filter = EnvFilter::try_from_env("TPP_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("tpp=info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .init();

    let cli = Cli::parse();

    // Determine profile: --dev flag enables dev mode, otherwise use prod
    let profile = if cli.dev { Profile::Dev } else { Profile::Prod };

    let config_path = match &cli.config {
        Some(path) => tpp::utils::expand_path(path),
        None => Config::get_config_path(profile)?,
    };
    let mut config = Config::load_from(&config_path, profile)?;
    tracing::debug!(path = ?config_path, "Loaded configuration");

    let command = cli.command.unwrap_or(Commands::Status);

    // Backup commands work on the raw store, without seeding or subscribing
    match &command {
        Commands::Export { dir } => {
            cli::handle_export(&open_kv(&config)?, dir.clone())?;
            return Ok(());
        }
        Commands::Import { file } => {
            cli::handle_import(&open_kv(&config)?, Path::new(file))?;
            return Ok(());
        }
        Commands::Reset { confirm } => {
            cli::handle_reset(&open_kv(&config)?, confirm)?;
            return Ok(());
        }
        _ => {}
    }

    let mut service = DataService::open(&config)?;
    // Pick up whatever the remote side already holds
    service.poll();

    let base_currency = config.currency.base.clone();
    match command {
        Commands::Status => cli::handle_status(&service),
        Commands::List { collection } => cli::handle_list(collection, &service),
        Commands::AddItinerary {
            date,
            time,
            title,
            city,
            kind,
            location,
            lat,
            lng,
            travel_mode,
            travel_minutes,
        } => cli::handle_add_itinerary(
            date,
            time,
            title,
            city,
            kind,
            location,
            (lat, lng),
            (travel_mode, travel_minutes),
            &mut service,
        )?,
        Commands::AddBooking {
            kind,
            title,
            date,
            reference,
            cost,
            currency,
            paid_by,
            location,
            from_code,
            to_code,
            airline,
        } => cli::handle_add_booking(
            kind,
            title,
            date,
            reference,
            cost,
            currency,
            paid_by,
            (from_code, to_code, airline),
            location,
            &base_currency,
            &mut service,
        )?,
        Commands::AddExpense {
            description,
            amount,
            currency,
            kind,
            category,
            paid_by,
            split,
        } => cli::handle_add_expense(description, amount, currency, kind, category, paid_by, split, &mut service)?,
        Commands::AddItem { text, kind, assign } => cli::handle_add_item(text, kind, assign, &mut service)?,
        Commands::AddMember { name, email } => cli::handle_add_member(name, email, &mut service)?,
        Commands::Toggle { id } => cli::handle_toggle(&id, &mut service)?,
        Commands::Delete { collection, id } => cli::handle_delete(collection, &id, &mut service)?,
        Commands::SwitchUser { member } => {
            let id = cli::handle_switch_user(&member, &mut service)?;
            config.current_user = Some(id);
            config.save_to(&config_path)?;
        }
        Commands::Rate { value } => cli::handle_rate(value, &mut service)?,
        Commands::Summary => cli::handle_summary(&base_currency, &service),
        Commands::Export { .. } | Commands::Import { .. } | Commands::Reset { .. } => {}
    }

    // Flush remote writes made by this command into the local view before exit
    service.poll();
    service.shutdown();
    Ok(())
}

fn open_kv(config: &Config) -> Result<KvStore> {
    let path: PathBuf = config.get_storage_path();
    Ok(KvStore::open(&path)?)
}
