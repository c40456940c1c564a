use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::str::FromStr;

use crate::models::{Booking, ChecklistItem, Expense, ItineraryItem, Member};

/// Storage key of the exchange-rate scalar.
pub const EXCHANGE_RATE_KEY: &str = "tpp_exchange_rate";

/// Every key this application persists. Export and import only touch these.
pub const ALL_STORAGE_KEYS: [&str; 6] = [
    "tpp_local_itinerary",
    "tpp_local_bookings",
    "tpp_local_expenses",
    "tpp_local_planning",
    "tpp_local_members",
    EXCHANGE_RATE_KEY,
];

/// A named group of homogeneous entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Members,
    Itinerary,
    Bookings,
    Expenses,
    Planning,
}

impl Collection {
    pub const ALL: [Collection; 5] = [
        Collection::Members,
        Collection::Itinerary,
        Collection::Bookings,
        Collection::Expenses,
        Collection::Planning,
    ];

    /// Remote collection name
    pub fn name(self) -> &'static str {
        match self {
            Collection::Members => "members",
            Collection::Itinerary => "itinerary",
            Collection::Bookings => "bookings",
            Collection::Expenses => "expenses",
            Collection::Planning => "planning",
        }
    }

    /// Local storage key; must stay stable for export/import compatibility
    pub fn storage_key(self) -> &'static str {
        match self {
            Collection::Members => "tpp_local_members",
            Collection::Itinerary => "tpp_local_itinerary",
            Collection::Bookings => "tpp_local_bookings",
            Collection::Expenses => "tpp_local_expenses",
            Collection::Planning => "tpp_local_planning",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Collection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Collection::ALL
            .into_iter()
            .find(|c| c.name() == wanted)
            .ok_or_else(|| {
                format!(
                    "unknown collection '{}' (expected one of: members, itinerary, bookings, expenses, planning)",
                    s
                )
            })
    }
}

/// In-memory view of every collection plus the selected member.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TripState {
    pub members: Vec<Member>,
    pub itinerary: Vec<ItineraryItem>,
    pub bookings: Vec<Booking>,
    pub expenses: Vec<Expense>,
    pub planning: Vec<ChecklistItem>,
    pub current_user: Option<String>,
}

impl TripState {
    pub fn current_member(&self) -> Option<&Member> {
        let id = self.current_user.as_deref()?;
        self.members.iter().find(|m| m.id == id)
    }

    /// Keep the current user while it is still on the roster; otherwise pick
    /// `preferred` when it is a member, falling back to the first member.
    pub fn select_default_user(&mut self, preferred: Option<&str>) {
        if self.current_member().is_some() {
            return;
        }
        let chosen = preferred
            .and_then(|id| self.members.iter().find(|m| m.id == id))
            .or_else(|| self.members.first())
            .map(|m| m.id.clone());
        if chosen.is_some() {
            tracing::debug!(user = ?chosen, "Selected current user");
        }
        self.current_user = chosen;
    }

    pub fn len_of(&self, collection: Collection) -> usize {
        match collection {
            Collection::Members => self.members.len(),
            Collection::Itinerary => self.itinerary.len(),
            Collection::Bookings => self.bookings.len(),
            Collection::Expenses => self.expenses.len(),
            Collection::Planning => self.planning.len(),
        }
    }
}

/// A stored record type: knows its collection, its id and where it lives in `TripState`.
pub trait Entity: Serialize + DeserializeOwned + Clone + fmt::Debug + 'static {
    const COLLECTION: Collection;

    fn id(&self) -> &str;
    fn set_id(&mut self, id: String);
    fn slot(state: &TripState) -> &Vec<Self>;
    fn slot_mut(state: &mut TripState) -> &mut Vec<Self>;
}

macro_rules! impl_entity {
    ($ty:ty, $collection:expr, $field:ident) => {
        impl Entity for $ty {
            const COLLECTION: Collection = $collection;

            fn id(&self) -> &str {
                &self.id
            }

            fn set_id(&mut self, id: String) {
                self.id = id;
            }

            fn slot(state: &TripState) -> &Vec<Self> {
                &state.$field
            }

            fn slot_mut(state: &mut TripState) -> &mut Vec<Self> {
                &mut state.$field
            }
        }
    };
}

impl_entity!(Member, Collection::Members, members);
impl_entity!(ItineraryItem, Collection::Itinerary, itinerary);
impl_entity!(Booking, Collection::Bookings, bookings);
impl_entity!(Expense, Collection::Expenses, expenses);
impl_entity!(ChecklistItem, Collection::Planning, planning);

#[cfg(test)]
mod tests {
    use super::*;

    fn member(id: &str, name: &str) -> Member {
        let mut m = Member::new(name.to_string());
        m.id = id.to_string();
        m
    }

    #[test]
    fn test_storage_keys_cover_every_collection() {
        for collection in Collection::ALL {
            assert!(ALL_STORAGE_KEYS.contains(&collection.storage_key()));
        }
        assert!(ALL_STORAGE_KEYS.contains(&EXCHANGE_RATE_KEY));
    }

    #[test]
    fn test_collection_from_str() {
        assert_eq!("Expenses".parse::<Collection>().unwrap(), Collection::Expenses);
        assert!("journal".parse::<Collection>().is_err());
    }

    #[test]
    fn test_select_default_user_prefers_configured_member() {
        let mut state = TripState {
            members: vec![member("mem_0", "Simon"), member("mem_1", "Lily")],
            ..TripState::default()
        };
        state.select_default_user(Some("mem_1"));
        assert_eq!(state.current_user.as_deref(), Some("mem_1"));

        // Unknown preference falls back to the first member
        state.current_user = None;
        state.select_default_user(Some("ghost"));
        assert_eq!(state.current_user.as_deref(), Some("mem_0"));
    }

    #[test]
    fn test_select_default_user_keeps_existing_selection() {
        let mut state = TripState {
            members: vec![member("mem_0", "Simon"), member("mem_1", "Lily")],
            current_user: Some("mem_1".to_string()),
            ..TripState::default()
        };
        state.select_default_user(None);
        assert_eq!(state.current_user.as_deref(), Some("mem_1"));

        state.members.retain(|m| m.id != "mem_1");
        state.select_default_user(None);
        assert_eq!(state.current_user.as_deref(), Some("mem_0"));
    }

    #[test]
    fn test_select_default_user_with_empty_roster() {
        let mut state = TripState::default();
        state.select_default_user(None);
        assert!(state.current_user.is_none());
    }
}
