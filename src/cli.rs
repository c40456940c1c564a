use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::backup::{self, BackupError};
use crate::collection::{Collection, Entity};
use crate::models::{
    Booking, BookingKind, ChecklistItem, ChecklistKind, Expense, ExpenseCategory, ExpenseType, ItineraryItem,
    ItineraryKind, Member, TravelMode, agenda,
};
use crate::service::{DataService, ServiceError};
use crate::storage::KvStore;
use crate::utils::{parse_date, parse_time};

#[derive(Parser)]
#[command(name = "tpp")]
#[command(about = "Trip planner - itinerary, bookings, shared expenses and checklists for a travel group")]
#[command(version)]
pub struct Cli {
    /// Custom config file path
    #[arg(short, long)]
    pub config: Option<String>,

    /// Use development mode (separate dev config and storage)
    #[arg(long)]
    pub dev: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show storage mode, current user and collection sizes (default)
    Status,
    /// Print every item of a collection
    List {
        /// members, itinerary, bookings, expenses or planning
        collection: Collection,
    },
    /// Add a stop to the itinerary
    AddItinerary {
        /// Day (YYYY-MM-DD)
        date: String,
        /// Start time (HH:MM)
        time: String,
        title: String,
        #[arg(long, default_value = "Seoul")]
        city: String,
        /// activity, flight or transport
        #[arg(long = "type", default_value = "activity")]
        kind: ItineraryKind,
        #[arg(long)]
        location: Option<String>,
        #[arg(long, allow_hyphen_values = true)]
        lat: Option<f64>,
        #[arg(long, allow_hyphen_values = true)]
        lng: Option<f64>,
        /// How to get to the next stop: subway, walk, car, bus or taxi
        #[arg(long)]
        travel_mode: Option<TravelMode>,
        #[arg(long)]
        travel_minutes: Option<u32>,
    },
    /// Record a flight, hotel, car or ticket booking
    AddBooking {
        /// flight, hotel, car or ticket
        kind: BookingKind,
        title: String,
        /// Date (YYYY-MM-DD)
        date: String,
        #[arg(long)]
        reference: Option<String>,
        #[arg(long, default_value_t = 0.0)]
        cost: f64,
        /// Defaults to the base currency
        #[arg(long)]
        currency: Option<String>,
        /// Member id or name; defaults to the current user
        #[arg(long)]
        paid_by: Option<String>,
        #[arg(long)]
        location: Option<String>,
        #[arg(long)]
        from_code: Option<String>,
        #[arg(long)]
        to_code: Option<String>,
        #[arg(long)]
        airline: Option<String>,
    },
    /// Record an expense
    AddExpense {
        description: String,
        amount: f64,
        /// Defaults to the foreign currency
        #[arg(long)]
        currency: Option<String>,
        /// public or private
        #[arg(long = "type", default_value = "public")]
        kind: ExpenseType,
        #[arg(long, default_value = "food")]
        category: ExpenseCategory,
        /// Member id or name; defaults to the current user
        #[arg(long)]
        paid_by: Option<String>,
        /// Comma-separated member ids or names
        #[arg(long)]
        split: Option<String>,
    },
    /// Add a planning checklist item
    AddItem {
        text: String,
        /// todo, shopping or packing
        #[arg(long = "type", default_value = "todo")]
        kind: ChecklistKind,
        /// Member id or name
        #[arg(long)]
        assign: Option<String>,
    },
    /// Add a trip member
    AddMember {
        name: String,
        #[arg(long)]
        email: Option<String>,
    },
    /// Flip a planning item between done and not done
    Toggle { id: String },
    /// Delete an item by id
    Delete { collection: Collection, id: String },
    /// Act as another member (id or name)
    SwitchUser { member: String },
    /// Show or set the foreign-to-base exchange rate
    Rate {
        #[arg(allow_hyphen_values = true)]
        value: Option<f64>,
    },
    /// Expense totals for the current user
    Summary,
    /// Write all local data to travel_backup_YYYY-MM-DD.json
    Export {
        /// Target directory (defaults to the working directory)
        #[arg(long)]
        dir: Option<String>,
    },
    /// Restore local data from a backup file
    Import { file: String },
    /// Wipe all local data
    Reset {
        /// Must be RESET
        #[arg(long)]
        confirm: String,
    },
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    ServiceError(#[from] ServiceError),
    #[error("{0}")]
    BackupError(#[from] BackupError),
    #[error("Failed to open local storage: {0}")]
    StorageError(#[from] crate::storage::StorageError),
    #[error("Failed to parse date: {0}")]
    DateParseError(String),
    #[error("Failed to parse time: {0}")]
    TimeParseError(String),
    #[error("Invalid number for {field}: {value}")]
    InvalidNumber { field: &'static str, value: f64 },
    #[error("{0} must not be empty")]
    MissingField(&'static str),
    #[error("No member matches '{0}'")]
    UnknownMember(String),
    #[error("No current user selected")]
    NoCurrentUser,
    #[error("No {collection} item with id '{id}'")]
    NotFound { collection: Collection, id: String },
}

/// Handle the status command
pub fn handle_status(service: &DataService) {
    println!("Mode: {}", service.mode().as_str());
    match service.current_user() {
        Some(member) => println!("Current user: {} ({})", member.name, member.id),
        None => println!("Current user: none"),
    }
    let rates = service.rate_context();
    println!("Exchange rate: 1 {} = {}", rates.foreign_currency, rates.live_rate);

    let state = service.state();
    for collection in Collection::ALL {
        println!("  {:<10} {}", collection.name(), state.len_of(collection));
    }
}

/// Handle the list command
pub fn handle_list(collection: Collection, service: &DataService) {
    let state = service.state();
    match collection {
        Collection::Members => {
            for m in &state.members {
                let marker = if state.current_user.as_deref() == Some(m.id.as_str()) { "*" } else { " " };
                println!("{} {:<24} {}", marker, m.id, m.name);
            }
        }
        Collection::Itinerary => {
            for (date, items) in agenda(&state.itinerary) {
                println!("{}", date);
                for i in items {
                    println!("  {} [{}] {} ({}) {}", i.time, i.kind, i.title, i.city, i.id);
                }
            }
        }
        Collection::Bookings => {
            for b in &state.bookings {
                println!("{} [{}] {} {:.2} {} {}", b.date, b.kind, b.title, b.cost, b.currency, b.id);
            }
        }
        Collection::Expenses => {
            for e in &state.expenses {
                println!(
                    "{} [{}/{}] {} {:.2} {} paid by {} {}",
                    e.date, e.kind, e.category, e.description, e.amount, e.currency, e.paid_by_member_id, e.id
                );
            }
        }
        Collection::Planning => {
            for p in &state.planning {
                let check = if p.is_completed { "x" } else { " " };
                println!("[{}] ({}) {} {}", check, p.kind, p.text, p.id);
            }
        }
    }
    if state.len_of(collection) == 0 {
        println!("No {} yet", collection.name());
    }
}

/// Handle the add-itinerary command
#[allow(clippy::too_many_arguments)]
pub fn handle_add_itinerary(
    date: String,
    time: String,
    title: String,
    city: String,
    kind: ItineraryKind,
    location: Option<String>,
    coords: (Option<f64>, Option<f64>),
    travel: (Option<TravelMode>, Option<u32>),
    service: &mut DataService,
) -> Result<(), CliError> {
    validate_date(&date)?;
    parse_time(&time).map_err(|e| CliError::TimeParseError(format!("Invalid time '{}': {}", time, e)))?;
    let title = required("title", title)?;
    let city = required("city", city)?;

    let mut item = ItineraryItem::new(date, time, kind, city, title);
    item.location = location;
    item.lat = coords.0.map(|v| finite("lat", v)).transpose()?;
    item.lng = coords.1.map(|v| finite("lng", v)).transpose()?;
    item.travel_mode = travel.0;
    item.travel_time_minutes = travel.1;

    let items = service.add(item)?;
    report_added(service, Collection::Itinerary, items.len());
    Ok(())
}

/// Handle the add-booking command
#[allow(clippy::too_many_arguments)]
pub fn handle_add_booking(
    kind: BookingKind,
    title: String,
    date: String,
    reference: Option<String>,
    cost: f64,
    currency: Option<String>,
    paid_by: Option<String>,
    route: (Option<String>, Option<String>, Option<String>),
    location: Option<String>,
    base_currency: &str,
    service: &mut DataService,
) -> Result<(), CliError> {
    let title = required("title", title)?;
    validate_date(&date)?;
    if !cost.is_finite() || cost < 0.0 {
        return Err(CliError::InvalidNumber { field: "cost", value: cost });
    }

    let mut booking = Booking::new(kind, title, date, currency.unwrap_or_else(|| base_currency.to_string()));
    booking.reference_no = reference;
    booking.cost = cost;
    booking.paid_by_member_id = payer(service, paid_by)?;
    booking.details.location = location;
    booking.details.from_code = route.0;
    booking.details.to_code = route.1;
    booking.details.airline = route.2;

    let items = service.add(booking)?;
    report_added(service, Collection::Bookings, items.len());
    Ok(())
}

/// Handle the add-expense command
#[allow(clippy::too_many_arguments)]
pub fn handle_add_expense(
    description: String,
    amount: f64,
    currency: Option<String>,
    kind: ExpenseType,
    category: ExpenseCategory,
    paid_by: Option<String>,
    split: Option<String>,
    service: &mut DataService,
) -> Result<(), CliError> {
    let description = required("description", description)?;
    if !amount.is_finite() || amount <= 0.0 {
        return Err(CliError::InvalidNumber { field: "amount", value: amount });
    }

    let lookup: &DataService = service;
    let rates = lookup.rate_context();
    let currency = currency.unwrap_or_else(|| rates.foreign_currency.clone()).to_uppercase();
    let paid_by = payer(lookup, paid_by)?;
    let split_between = match split {
        Some(split) => split
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|who| resolve_member(lookup, who))
            .collect::<Result<Vec<_>, _>>()?,
        // Public costs are shared by the whole roster unless narrowed
        None => match kind {
            ExpenseType::Public => lookup.state().members.iter().map(|m| m.id.clone()).collect(),
            ExpenseType::Private => Vec::new(),
        },
    };

    let mut expense = Expense::new(description, amount, currency, kind, paid_by);
    expense.category = category;
    expense.exchange_rate_to_base = rates.live_rate;
    expense.split_between_member_ids = split_between;

    let items = service.add(expense)?;
    report_added(service, Collection::Expenses, items.len());
    Ok(())
}

/// Handle the add-item command
pub fn handle_add_item(
    text: String,
    kind: ChecklistKind,
    assign: Option<String>,
    service: &mut DataService,
) -> Result<(), CliError> {
    let text = required("text", text)?;
    let lookup: &DataService = service;
    let mut item = ChecklistItem::new(text, kind);
    item.assigned_to_member_id = assign.map(|who| resolve_member(lookup, &who)).transpose()?;

    let items = service.add(item)?;
    report_added(service, Collection::Planning, items.len());
    Ok(())
}

/// Handle the add-member command
pub fn handle_add_member(name: String, email: Option<String>, service: &mut DataService) -> Result<(), CliError> {
    let mut member = Member::new(required("name", name)?);
    member.email = email.filter(|e| !e.trim().is_empty());

    let items = service.add(member)?;
    report_added(service, Collection::Members, items.len());
    Ok(())
}

/// Handle the toggle command
pub fn handle_toggle(id: &str, service: &mut DataService) -> Result<(), CliError> {
    let mut item = find::<ChecklistItem>(service, id)?;
    item.is_completed = !item.is_completed;
    let done = item.is_completed;
    service.update(item)?;
    println!("Marked '{}' as {}", id, if done { "done" } else { "not done" });
    Ok(())
}

/// Handle the delete command
pub fn handle_delete(collection: Collection, id: &str, service: &mut DataService) -> Result<(), CliError> {
    let before = service.state().len_of(collection);
    service.delete_in(collection, id)?;
    if service.state().len_of(collection) < before {
        println!("Deleted {} from {}", id, collection);
    } else {
        println!("Delete of {} from {} requested", id, collection);
    }
    Ok(())
}

/// Handle the switch-user command. Returns the new current member's id.
pub fn handle_switch_user(member: &str, service: &mut DataService) -> Result<String, CliError> {
    let member = service.switch_user(member)?;
    println!("Now acting as {} ({})", member.name, member.id);
    Ok(member.id)
}

/// Handle the rate command
pub fn handle_rate(value: Option<f64>, service: &mut DataService) -> Result<(), CliError> {
    if let Some(rate) = value {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(CliError::InvalidNumber { field: "rate", value: rate });
        }
        service.set_exchange_rate(rate)?;
    }
    let rates = service.rate_context();
    println!("1 {} = {}", rates.foreign_currency, rates.live_rate);
    Ok(())
}

/// Handle the summary command
pub fn handle_summary(base_currency: &str, service: &DataService) {
    let summary = service.expense_summary();
    println!("Total:      {:.2} {}", summary.total, base_currency);
    println!("Public:     {:.2} {}", summary.public, base_currency);
    println!("Private:    {:.2} {}", summary.private, base_currency);
    println!(
        "Per person: {:.2} {} ({} members)",
        summary.per_person, base_currency, summary.member_count
    );
}

/// Handle the export command
pub fn handle_export(kv: &KvStore, dir: Option<String>) -> Result<PathBuf, CliError> {
    let dir = dir.map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
    let today = chrono::Local::now().date_naive();
    let path = backup::export_to_dir(kv, &dir, today)?;
    println!("Exported to {}", path.display());
    Ok(path)
}

/// Handle the import command
pub fn handle_import(kv: &KvStore, file: &Path) -> Result<(), CliError> {
    let applied = backup::import_file(kv, file)?;
    println!("Imported {} keys: {}", applied.len(), applied.join(", "));
    println!("Restart to load the imported data");
    Ok(())
}

/// Handle the reset command
pub fn handle_reset(kv: &KvStore, confirm: &str) -> Result<(), CliError> {
    let removed = backup::reset(kv, confirm)?;
    println!("Removed {} keys from local storage", removed);
    Ok(())
}

fn required(field: &'static str, value: String) -> Result<String, CliError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CliError::MissingField(field));
    }
    Ok(trimmed.to_string())
}

fn finite(field: &'static str, value: f64) -> Result<f64, CliError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(CliError::InvalidNumber { field, value })
    }
}

fn validate_date(date: &str) -> Result<(), CliError> {
    parse_date(date)
        .map(|_| ())
        .map_err(|e| CliError::DateParseError(format!("Invalid date format '{}': {}", date, e)))
}

/// Member id for an id or a case-insensitive name
fn resolve_member(service: &DataService, who: &str) -> Result<String, CliError> {
    let state = service.state();
    state
        .members
        .iter()
        .find(|m| m.id == who)
        .or_else(|| state.members.iter().find(|m| m.name.eq_ignore_ascii_case(who)))
        .map(|m| m.id.clone())
        .ok_or_else(|| CliError::UnknownMember(who.to_string()))
}

fn payer(service: &DataService, paid_by: Option<String>) -> Result<String, CliError> {
    match paid_by {
        Some(who) => resolve_member(service, &who),
        None => service.current_user().map(|m| m.id).ok_or(CliError::NoCurrentUser),
    }
}

fn find<T: Entity>(service: &DataService, id: &str) -> Result<T, CliError> {
    service
        .items::<T>()
        .into_iter()
        .find(|i| i.id() == id)
        .ok_or_else(|| CliError::NotFound {
            collection: T::COLLECTION,
            id: id.to_string(),
        })
}

fn report_added(service: &DataService, collection: Collection, count: usize) {
    match service.mode() {
        crate::service::Mode::Local => println!("Added to {} ({} total)", collection, count),
        crate::service::Mode::Remote => println!("Sent to {}", collection),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LocalStore;
    use crate::service::ServiceSettings;

    fn service() -> DataService {
        let store = LocalStore::new(KvStore::open_in_memory().unwrap());
        DataService::local(store, ServiceSettings::default()).unwrap()
    }

    #[test]
    fn test_cli_parses_commands() {
        let cli = Cli::try_parse_from(["tpp", "--dev", "add-expense", "Dinner", "10000", "--type", "private"]).unwrap();
        assert!(cli.dev);
        match cli.command {
            Some(Commands::AddExpense { amount, kind, .. }) => {
                assert_eq!(amount, 10000.0);
                assert_eq!(kind, ExpenseType::Private);
            }
            _ => panic!("expected add-expense"),
        }

        assert!(Cli::try_parse_from(["tpp", "list", "journal"]).is_err());
        assert!(Cli::try_parse_from(["tpp", "add-expense", "Dinner", "lots"]).is_err());
    }

    #[test]
    fn test_add_expense_rejects_bad_amounts_before_storing() {
        let mut service = service();
        for amount in [0.0, -5.0, f64::NAN] {
            let result = handle_add_expense(
                "Taxi".into(),
                amount,
                None,
                ExpenseType::Public,
                ExpenseCategory::Transport,
                None,
                None,
                &mut service,
            );
            assert!(matches!(result, Err(CliError::InvalidNumber { .. })));
        }
        assert!(service.items::<Expense>().is_empty());
    }

    #[test]
    fn test_add_expense_defaults_to_current_user_and_live_rate() {
        let mut service = service();
        handle_add_expense(
            "Tteokbokki".into(),
            8000.0,
            None,
            ExpenseType::Public,
            ExpenseCategory::Food,
            None,
            Some("lily, mem_2".into()),
            &mut service,
        )
        .unwrap();

        let expense = &service.items::<Expense>()[0];
        assert_eq!(expense.paid_by_member_id, "mem_0");
        assert_eq!(expense.currency, "KRW");
        assert_eq!(expense.exchange_rate_to_base, 0.0058);
        assert_eq!(expense.split_between_member_ids, vec!["mem_1".to_string(), "mem_2".to_string()]);
    }

    #[test]
    fn test_add_expense_without_split_shares_public_costs_with_everyone() {
        let mut service = service();
        for kind in [ExpenseType::Public, ExpenseType::Private] {
            handle_add_expense(
                "Dinner".into(),
                10000.0,
                None,
                kind,
                ExpenseCategory::Food,
                None,
                None,
                &mut service,
            )
            .unwrap();
        }

        let expenses = service.items::<Expense>();
        let everyone: Vec<String> = service.items::<Member>().into_iter().map(|m| m.id).collect();
        assert_eq!(everyone.len(), 6);
        assert_eq!(expenses[0].split_between_member_ids, everyone);
        assert!(expenses[1].split_between_member_ids.is_empty());
    }

    #[test]
    fn test_add_expense_records_live_rate_for_any_currency() {
        let mut service = service();
        handle_add_expense(
            "Airport bus".into(),
            40.0,
            Some("hkd".into()),
            ExpenseType::Private,
            ExpenseCategory::Transport,
            None,
            None,
            &mut service,
        )
        .unwrap();

        let expense = &service.items::<Expense>()[0];
        assert_eq!(expense.currency, "HKD");
        assert_eq!(expense.exchange_rate_to_base, 0.0058);
    }

    #[test]
    fn test_add_itinerary_validates_date_and_time() {
        let mut service = service();
        let add = |service: &mut DataService, date: &str, time: &str| {
            handle_add_itinerary(
                date.into(),
                time.into(),
                "N Seoul Tower".into(),
                "Seoul".into(),
                ItineraryKind::Activity,
                None,
                (None, None),
                (None, None),
                service,
            )
        };

        assert!(matches!(add(&mut service, "2025/12/25", "10:00"), Err(CliError::DateParseError(_))));
        assert!(matches!(add(&mut service, "2025-12-25", "late"), Err(CliError::TimeParseError(_))));
        assert_eq!(service.items::<ItineraryItem>().len(), 3);

        add(&mut service, "2025-12-25", "19:30").unwrap();
        assert_eq!(service.items::<ItineraryItem>().len(), 4);
    }

    #[test]
    fn test_blank_names_are_rejected() {
        let mut service = service();
        assert!(matches!(
            handle_add_member("   ".into(), None, &mut service),
            Err(CliError::MissingField("name"))
        ));
        assert!(matches!(
            handle_add_item("".into(), ChecklistKind::Packing, None, &mut service),
            Err(CliError::MissingField("text"))
        ));
    }

    #[test]
    fn test_toggle_flips_completion() {
        let mut service = service();
        handle_toggle("1", &mut service).unwrap();
        assert!(service.items::<ChecklistItem>()[0].is_completed);

        assert!(matches!(handle_toggle("404", &mut service), Err(CliError::NotFound { .. })));
    }

    #[test]
    fn test_unknown_payer_is_rejected() {
        let mut service = service();
        let result = handle_add_booking(
            BookingKind::Hotel,
            "Myeongdong stay".into(),
            "2025-12-24".into(),
            None,
            1200.0,
            None,
            Some("Mallory".into()),
            (None, None, None),
            None,
            "HKD",
            &mut service,
        );
        assert!(matches!(result, Err(CliError::UnknownMember(_))));
    }
}
