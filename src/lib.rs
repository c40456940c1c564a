pub mod backup;
pub mod cli;
pub mod collection;
pub mod config;
pub mod local;
pub mod models;
pub mod remote;
pub mod seed;
pub mod service;
pub mod storage;
pub mod summary;
pub mod utils;

pub use collection::{Collection, Entity, TripState};
pub use config::Config;
pub use local::LocalStore;
pub use models::{Booking, ChecklistItem, Expense, ItineraryItem, JournalEntry, Member};
pub use service::{DataService, Mode, ServiceError, ServiceSettings};
pub use storage::KvStore;
pub use utils::Profile;
