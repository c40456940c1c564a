//! Unified data service
//!
//! Picks local or remote storage once, at open, and gives callers the same
//! add/update/delete contract either way. Nothing outside this module looks
//! at the mode to decide how to store data.

use std::cell::{Ref, RefCell};
use std::rc::Rc;
use thiserror::Error;

use crate::collection::{Collection, Entity, TripState};
use crate::config::Config;
use crate::local::{LocalStore, generate_id};
use crate::models::{Booking, ChecklistItem, Expense, ItineraryItem, Member};
use crate::remote::{DocumentDb, RemoteError, RemoteStore, SqliteDocumentDb, Subscription};
use crate::seed;
use crate::storage::{KvStore, StorageError};
use crate::summary::{self, ExpenseSummary, RateContext};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),
    #[error("Remote error: {0}")]
    RemoteError(#[from] RemoteError),
    #[error("Unknown member: {0}")]
    UnknownMember(String),
    #[error("Exchange rate must be a positive number, got {0}")]
    InvalidExchangeRate(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Local,
    Remote,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Local => "local",
            Mode::Remote => "remote",
        }
    }
}

/// Process-wide context the service is opened with.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceSettings {
    pub default_exchange_rate: f64,
    pub foreign_currency: String,
    pub preferred_user: Option<String>,
}

impl ServiceSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            default_exchange_rate: config.currency.default_rate,
            foreign_currency: config.currency.foreign.clone(),
            preferred_user: config.current_user.clone(),
        }
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

enum Backend {
    Local,
    Remote {
        store: RemoteStore,
        subscriptions: Vec<Subscription>,
    },
}

pub struct DataService {
    local: LocalStore,
    backend: Backend,
    state: Rc<RefCell<TripState>>,
    exchange_rate: f64,
    settings: ServiceSettings,
}

impl DataService {
    /// Open storage described by `config`; remote mode when credentials are configured
    pub fn open(config: &Config) -> Result<Self, ServiceError> {
        let kv = KvStore::open(&config.get_storage_path())?;
        let local = LocalStore::new(kv);
        let settings = ServiceSettings::from_config(config);

        if config.remote.is_configured() {
            let db = SqliteDocumentDb::open(&config.remote.get_database_path(), &config.remote.project_id)?;
            Self::remote(local, Rc::new(db), settings)
        } else {
            tracing::warn!("Remote storage is not configured, running in local mode");
            Self::local(local, settings)
        }
    }

    /// Local mode: load every collection, seeding and persisting defaults for absent keys
    pub fn local(local: LocalStore, settings: ServiceSettings) -> Result<Self, ServiceError> {
        let mut members: Vec<Member> = local.load(Collection::Members.storage_key(), Vec::new());
        if members.is_empty() {
            members = seed::members();
            local.save(Collection::Members.storage_key(), &members)?;
            tracing::info!(count = members.len(), "Seeded trip members");
        }

        let mut state = TripState {
            members,
            itinerary: load_or_seed(&local, seed::itinerary())?,
            bookings: load_or_seed(&local, Vec::<Booking>::new())?,
            expenses: load_or_seed(&local, Vec::<Expense>::new())?,
            planning: load_or_seed(&local, seed::planning())?,
            current_user: None,
        };
        state.select_default_user(settings.preferred_user.as_deref());

        let exchange_rate = local.load_exchange_rate(settings.default_exchange_rate);
        tracing::info!(mode = "local", "Data service ready");

        Ok(Self {
            local,
            backend: Backend::Local,
            state: Rc::new(RefCell::new(state)),
            exchange_rate,
            settings,
        })
    }

    /// Remote mode: one live subscription per collection. State fills in as
    /// snapshots arrive through `poll`.
    pub fn remote(local: LocalStore, db: Rc<dyn DocumentDb>, settings: ServiceSettings) -> Result<Self, ServiceError> {
        let store = RemoteStore::new(db);
        let state = Rc::new(RefCell::new(TripState::default()));

        let preferred = settings.preferred_user.clone();
        let members_state = Rc::clone(&state);
        let subscriptions = vec![
            store.subscribe::<Member, _>(move |members| {
                let mut state = members_state.borrow_mut();
                state.members = members;
                if !state.members.is_empty() {
                    state.select_default_user(preferred.as_deref());
                }
            })?,
            subscribe_into::<ItineraryItem>(&store, &state)?,
            subscribe_into::<Booking>(&store, &state)?,
            subscribe_into::<Expense>(&store, &state)?,
            subscribe_into::<ChecklistItem>(&store, &state)?,
        ];

        let exchange_rate = local.load_exchange_rate(settings.default_exchange_rate);
        tracing::info!(mode = "remote", subscriptions = subscriptions.len(), "Data service ready");

        Ok(Self {
            local,
            backend: Backend::Remote { store, subscriptions },
            state,
            exchange_rate,
            settings,
        })
    }

    pub fn mode(&self) -> Mode {
        match self.backend {
            Backend::Local => Mode::Local,
            Backend::Remote { .. } => Mode::Remote,
        }
    }

    /// Deliver pending remote snapshots into the state. Local mode has nothing to pull.
    pub fn poll(&self) -> usize {
        match &self.backend {
            Backend::Local => 0,
            Backend::Remote { store, .. } => match store.poll() {
                Ok(delivered) => delivered,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to poll remote snapshots");
                    0
                }
            },
        }
    }

    /// Add `item` and return the collection as it now stands.
    ///
    /// In remote mode the new item shows up only after a later `poll`.
    pub fn add<T: Entity>(&mut self, mut item: T) -> Result<Vec<T>, ServiceError> {
        let collection = T::COLLECTION;
        match &self.backend {
            Backend::Local => {
                let mut state = self.state.borrow_mut();
                let items = T::slot_mut(&mut state);
                item.set_id(unique_local_id(items));
                tracing::info!(%collection, id = item.id(), "Adding item");

                let mut next = items.clone();
                next.push(item);
                self.local.save(collection.storage_key(), &next)?;
                *items = next;
                Ok(items.clone())
            }
            Backend::Remote { store, .. } => {
                match store.create(&item) {
                    Ok(id) => tracing::info!(%collection, id = %id, "Created remote document"),
                    Err(e) => tracing::error!(%collection, error = %e, "Failed to create remote document"),
                }
                Ok(T::slot(&self.state.borrow()).clone())
            }
        }
    }

    /// Replace the item with the same id. An unknown id changes nothing.
    pub fn update<T: Entity>(&mut self, item: T) -> Result<Vec<T>, ServiceError> {
        let collection = T::COLLECTION;
        if item.id().is_empty() {
            tracing::warn!(%collection, "Ignoring update without an id");
            return Ok(self.items::<T>());
        }

        match &self.backend {
            Backend::Local => {
                let mut state = self.state.borrow_mut();
                let items = T::slot_mut(&mut state);
                let Some(pos) = items.iter().position(|i| i.id() == item.id()) else {
                    tracing::debug!(%collection, id = item.id(), "Update target not found");
                    return Ok(items.clone());
                };

                let mut next = items.clone();
                next[pos] = item;
                self.local.save(collection.storage_key(), &next)?;
                *items = next;
                Ok(items.clone())
            }
            Backend::Remote { store, .. } => {
                if let Err(e) = store.replace(item.id(), &item) {
                    tracing::error!(%collection, id = item.id(), error = %e, "Failed to replace remote document");
                }
                Ok(T::slot(&self.state.borrow()).clone())
            }
        }
    }

    /// Remove the item with `id`. Empty or unknown ids are a no-op.
    pub fn delete<T: Entity>(&mut self, id: &str) -> Result<Vec<T>, ServiceError> {
        let collection = T::COLLECTION;
        if id.is_empty() {
            return Ok(self.items::<T>());
        }
        tracing::info!(%collection, id, "Deleting item");

        match &self.backend {
            Backend::Local => {
                let mut state = self.state.borrow_mut();
                let items = T::slot_mut(&mut state);
                if !items.iter().any(|i| i.id() == id) {
                    // Entries this version can't read are still deletable by id
                    if self.local.discard_retained(collection.storage_key(), id) {
                        self.local.save(collection.storage_key(), items)?;
                    }
                    return Ok(items.clone());
                }

                let next: Vec<T> = items.iter().filter(|i| i.id() != id).cloned().collect();
                self.local.save(collection.storage_key(), &next)?;
                *items = next;
                if collection == Collection::Members {
                    state.select_default_user(self.settings.preferred_user.as_deref());
                }
                Ok(T::slot(&state).clone())
            }
            Backend::Remote { store, .. } => {
                if let Err(e) = store.remove(collection, id) {
                    tracing::error!(%collection, id, error = %e, "Failed to remove remote document");
                }
                Ok(T::slot(&self.state.borrow()).clone())
            }
        }
    }

    /// `delete` for callers that only know the collection by name
    pub fn delete_in(&mut self, collection: Collection, id: &str) -> Result<(), ServiceError> {
        match collection {
            Collection::Members => self.delete::<Member>(id).map(|_| ()),
            Collection::Itinerary => self.delete::<ItineraryItem>(id).map(|_| ()),
            Collection::Bookings => self.delete::<Booking>(id).map(|_| ()),
            Collection::Expenses => self.delete::<Expense>(id).map(|_| ()),
            Collection::Planning => self.delete::<ChecklistItem>(id).map(|_| ()),
        }
    }

    /// Current contents of `T`'s collection
    pub fn items<T: Entity>(&self) -> Vec<T> {
        T::slot(&self.state.borrow()).clone()
    }

    pub fn state(&self) -> Ref<'_, TripState> {
        self.state.borrow()
    }

    pub fn current_user(&self) -> Option<Member> {
        self.state.borrow().current_member().cloned()
    }

    /// Select the current user by member id or (case-insensitive) name
    pub fn switch_user(&mut self, who: &str) -> Result<Member, ServiceError> {
        let mut state = self.state.borrow_mut();
        let member = state
            .members
            .iter()
            .find(|m| m.id == who)
            .or_else(|| state.members.iter().find(|m| m.name.eq_ignore_ascii_case(who)))
            .cloned()
            .ok_or_else(|| ServiceError::UnknownMember(who.to_string()))?;
        state.current_user = Some(member.id.clone());
        tracing::info!(user = %member.id, "Switched current user");
        Ok(member)
    }

    pub fn exchange_rate(&self) -> f64 {
        self.exchange_rate
    }

    pub fn set_exchange_rate(&mut self, rate: f64) -> Result<(), ServiceError> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(ServiceError::InvalidExchangeRate(rate));
        }
        self.local.save_exchange_rate(rate)?;
        self.exchange_rate = rate;
        tracing::info!(rate, "Exchange rate updated");
        Ok(())
    }

    pub fn rate_context(&self) -> RateContext {
        RateContext {
            foreign_currency: self.settings.foreign_currency.clone(),
            live_rate: self.exchange_rate,
        }
    }

    /// Dashboard figures as seen by the current user
    pub fn expense_summary(&self) -> ExpenseSummary {
        let state = self.state.borrow();
        summary::summarize(
            &state.expenses,
            state.members.len(),
            state.current_user.as_deref(),
            &self.rate_context(),
        )
    }

    /// The key-value store behind local persistence, for backup and reset
    pub fn local_store(&self) -> &LocalStore {
        &self.local
    }

    /// Detach every remote subscription
    pub fn shutdown(self) {
        if let Backend::Remote { subscriptions, .. } = self.backend {
            let count = subscriptions.len();
            for subscription in subscriptions {
                subscription.unsubscribe();
            }
            tracing::info!(count, "Closed remote subscriptions");
        }
    }
}

fn load_or_seed<T: Entity>(local: &LocalStore, defaults: Vec<T>) -> Result<Vec<T>, ServiceError> {
    let key = T::COLLECTION.storage_key();
    if local.contains(key)? {
        Ok(local.load(key, defaults))
    } else {
        local.save(key, &defaults)?;
        Ok(defaults)
    }
}

fn unique_local_id<T: Entity>(existing: &[T]) -> String {
    loop {
        let id = generate_id();
        if !existing.iter().any(|i| i.id() == id) {
            return id;
        }
    }
}

fn subscribe_into<T: Entity>(store: &RemoteStore, state: &Rc<RefCell<TripState>>) -> Result<Subscription, RemoteError> {
    let state = Rc::clone(state);
    store.subscribe::<T, _>(move |items| {
        *T::slot_mut(&mut state.borrow_mut()) = items;
    })
}
