//! Built-in dataset used the first time local mode starts with empty storage.

use crate::models::{ChecklistItem, ChecklistKind, ItineraryItem, ItineraryKind, Member, TravelMode};

const MEMBER_NAMES: [&str; 6] = ["Simon", "Lily", "Katherine", "Ashley", "Eric", "Alvin"];

/// Fixed trip roster, ids `mem_0`..`mem_5`
pub fn members() -> Vec<Member> {
    MEMBER_NAMES
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let mut member = Member::new(name.to_string());
            member.id = format!("mem_{}", i);
            member
        })
        .collect()
}

pub fn itinerary() -> Vec<ItineraryItem> {
    let stop = |id: &str, time: &str, kind: ItineraryKind, title: &str, location: &str, lat: f64, lng: f64| {
        let mut item = ItineraryItem::new(
            "2025-12-24".to_string(),
            time.to_string(),
            kind,
            "Seoul".to_string(),
            title.to_string(),
        );
        item.id = id.to_string();
        item.location = Some(location.to_string());
        item.lat = Some(lat);
        item.lng = Some(lng);
        item
    };

    let mut arrival = stop("1", "10:00", ItineraryKind::Flight, "Arrive at Incheon Airport", "Incheon Airport", 37.4602, 126.4407);
    arrival.travel_mode = Some(TravelMode::Subway);

    vec![
        arrival,
        stop("2", "14:00", ItineraryKind::Activity, "Hotel check-in", "Myeongdong", 37.5636, 126.9837),
        stop("3", "18:00", ItineraryKind::Activity, "Dinner in Myeongdong", "Myeongdong Night Market", 37.5609, 126.9863),
    ]
}

pub fn planning() -> Vec<ChecklistItem> {
    let item = |id: &str, text: &str, kind: ChecklistKind, done: bool| {
        let mut item = ChecklistItem::new(text.to_string(), kind);
        item.id = id.to_string();
        item.is_completed = done;
        item
    };

    vec![
        item("1", "Buy a SIM card", ChecklistKind::Todo, false),
        item("2", "Exchange KRW", ChecklistKind::Todo, true),
        item("3", "Winter coat", ChecklistKind::Shopping, false),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_seed_ids_are_unique() {
        let ids: HashSet<String> = members().into_iter().map(|m| m.id).collect();
        assert_eq!(ids.len(), 6);
        assert_eq!(itinerary().len(), 3);
        assert_eq!(planning().len(), 3);
    }
}
