use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Accepts ids stored either as JSON strings or numbers and always yields a string.
fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    coerce_id(&value).ok_or_else(|| serde::de::Error::custom(format!("invalid id: {}", value)))
}

/// String form of an id value, as used for matching and deduplication.
pub fn coerce_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    #[serde(default, deserialize_with = "deserialize_id")]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Keys this version does not model; written back unchanged
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Member {
    pub fn new(name: String) -> Self {
        Self {
            id: String::new(),
            name,
            avatar_url: None,
            email: None,
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItineraryKind {
    Activity,
    Flight,
    Transport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TravelMode {
    Subway,
    Walk,
    Car,
    Bus,
    Taxi,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItineraryItem {
    #[serde(default, deserialize_with = "deserialize_id")]
    pub id: String,
    pub date: String, // YYYY-MM-DD
    pub time: String, // HH:MM
    #[serde(rename = "type")]
    pub kind: ItineraryKind,
    pub city: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub travel_mode: Option<TravelMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub travel_time_minutes: Option<u32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ItineraryItem {
    pub fn new(date: String, time: String, kind: ItineraryKind, city: String, title: String) -> Self {
        Self {
            id: String::new(),
            date,
            time,
            kind,
            city,
            title,
            location: None,
            lat: None,
            lng: None,
            icon: None,
            travel_mode: None,
            travel_time_minutes: None,
            extra: Map::new(),
        }
    }
}

/// Group itinerary items by day (ascending) with each day sorted by time.
pub fn agenda(items: &[ItineraryItem]) -> BTreeMap<String, Vec<ItineraryItem>> {
    let mut days: BTreeMap<String, Vec<ItineraryItem>> = BTreeMap::new();
    for item in items {
        days.entry(item.date.clone()).or_default().push(item.clone());
    }
    for day in days.values_mut() {
        day.sort_by(|a, b| a.time.cmp(&b.time));
    }
    days
}

/// Items scheduled on `date`, sorted by time.
pub fn day_items(items: &[ItineraryItem], date: &str) -> Vec<ItineraryItem> {
    let mut day: Vec<ItineraryItem> = items.iter().filter(|i| i.date == date).cloned().collect();
    day.sort_by(|a, b| a.time.cmp(&b.time));
    day
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingKind {
    Flight,
    Hotel,
    Car,
    Ticket,
}

/// Type-specific booking details; every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub airline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_in: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_out: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pickup_location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dropoff_location: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    #[serde(default, deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: BookingKind,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_no: Option<String>,
    pub date: String,
    #[serde(default)]
    pub details: BookingDetails,
    #[serde(default)]
    pub attachments: Vec<String>,
    #[serde(default)]
    pub cost: f64,
    pub currency: String,
    #[serde(default)]
    pub paid_by_member_id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Booking {
    pub fn new(kind: BookingKind, title: String, date: String, currency: String) -> Self {
        Self {
            id: String::new(),
            kind,
            title,
            reference_no: None,
            date,
            details: BookingDetails::default(),
            attachments: Vec::new(),
            cost: 0.0,
            currency,
            paid_by_member_id: String::new(),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpenseType {
    Public,
    Private,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpenseCategory {
    Food,
    Transport,
    Shopping,
    Accommodation,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    #[serde(default, deserialize_with = "deserialize_id")]
    pub id: String,
    pub date: String,
    pub description: String,
    pub amount: f64,
    pub currency: String,
    /// Rate captured when the expense was recorded.
    #[serde(default)]
    pub exchange_rate_to_base: f64,
    pub paid_by_member_id: String,
    #[serde(default)]
    pub split_between_member_ids: Vec<String>,
    #[serde(rename = "type")]
    pub kind: ExpenseType,
    #[serde(default = "default_expense_category")]
    pub category: ExpenseCategory,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_expense_category() -> ExpenseCategory {
    ExpenseCategory::Other
}

impl Expense {
    pub fn new(description: String, amount: f64, currency: String, kind: ExpenseType, paid_by_member_id: String) -> Self {
        Self {
            id: String::new(),
            date: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            description,
            amount,
            currency,
            exchange_rate_to_base: 0.0,
            paid_by_member_id,
            split_between_member_ids: Vec::new(),
            kind,
            category: ExpenseCategory::Food,
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecklistKind {
    Todo,
    Shopping,
    Packing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistItem {
    #[serde(default, deserialize_with = "deserialize_id")]
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(rename = "type")]
    pub kind: ChecklistKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to_member_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChecklistItem {
    pub fn new(text: String, kind: ChecklistKind) -> Self {
        Self {
            id: String::new(),
            text,
            is_completed: false,
            kind,
            assigned_to_member_id: None,
            extra: Map::new(),
        }
    }
}

/// Shared trip journal post. Not backed by a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntry {
    #[serde(default, deserialize_with = "deserialize_id")]
    pub id: String,
    pub date: String,
    pub author_id: String,
    pub content: String,
    #[serde(default)]
    pub photos: Vec<String>,
    #[serde(default)]
    pub likes: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl JournalEntry {
    pub fn new(author_id: String, content: String) -> Self {
        Self {
            id: String::new(),
            date: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            author_id,
            content,
            photos: Vec::new(),
            likes: Vec::new(),
            extra: Map::new(),
        }
    }

    /// Add or withdraw `member_id`'s like. Returns true when the entry is now liked by them.
    pub fn toggle_like(&mut self, member_id: &str) -> bool {
        if let Some(pos) = self.likes.iter().position(|id| id == member_id) {
            self.likes.remove(pos);
            false
        } else {
            self.likes.push(member_id.to_string());
            true
        }
    }
}

/// Wire names of the enum values, shared by `Display` and `FromStr`.
macro_rules! wire_names {
    ($ty:ty, $label:literal, { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_lowercase().as_str() {
                    $($name => Ok(Self::$variant),)+
                    other => Err(format!(
                        "unknown {} '{}' (expected one of: {})",
                        $label,
                        other,
                        [$($name),+].join(", ")
                    )),
                }
            }
        }
    };
}

wire_names!(ItineraryKind, "itinerary type", {
    Activity => "activity",
    Flight => "flight",
    Transport => "transport",
});

wire_names!(TravelMode, "travel mode", {
    Subway => "subway",
    Walk => "walk",
    Car => "car",
    Bus => "bus",
    Taxi => "taxi",
});

wire_names!(BookingKind, "booking type", {
    Flight => "flight",
    Hotel => "hotel",
    Car => "car",
    Ticket => "ticket",
});

wire_names!(ExpenseType, "expense type", {
    Public => "public",
    Private => "private",
});

wire_names!(ExpenseCategory, "expense category", {
    Food => "food",
    Transport => "transport",
    Shopping => "shopping",
    Accommodation => "accommodation",
    Other => "other",
});

wire_names!(ChecklistKind, "checklist type", {
    Todo => "todo",
    Shopping => "shopping",
    Packing => "packing",
});
