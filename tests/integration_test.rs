//! Integration tests for tpp
//!
//! End-to-end flows against on-disk storage:
//! - Local persistence across restarts
//! - Backup export and import
//! - Remote mode through a shared document database file

use std::fs;
use std::rc::Rc;
use tempfile::TempDir;
use tpp::backup;
use tpp::config::{Config, RemoteSettings};
use tpp::models::{ChecklistKind, Expense, ExpenseType, ItineraryItem, ItineraryKind};
use tpp::remote::SqliteDocumentDb;
use tpp::{ChecklistItem, DataService, KvStore, LocalStore, Member, Mode, ServiceSettings};

/// Config pointing every path into `dir`, local mode
fn local_config(dir: &TempDir) -> Config {
    Config {
        storage_path: dir.path().join("local_storage.db").to_string_lossy().to_string(),
        remote: RemoteSettings {
            database_path: dir.path().join("remote.db").to_string_lossy().to_string(),
            ..RemoteSettings::default()
        },
        ..Config::default()
    }
}

fn remote_client(dir: &TempDir, db_path: &std::path::Path) -> DataService {
    let kv = KvStore::open(&dir.path().join("client.db")).unwrap();
    let db = SqliteDocumentDb::open(db_path, "seoul-trip").unwrap();
    DataService::remote(LocalStore::new(kv), Rc::new(db), ServiceSettings::default()).unwrap()
}

#[test]
fn test_local_data_survives_restart() {
    let temp = TempDir::new().unwrap();
    let config = local_config(&temp);

    let added_id = {
        let mut service = DataService::open(&config).unwrap();
        assert_eq!(service.mode(), Mode::Local);
        let items = service
            .add(ChecklistItem::new("Pack chargers".to_string(), ChecklistKind::Packing))
            .unwrap();
        service.delete::<ItineraryItem>("2").unwrap();
        service.set_exchange_rate(0.0061).unwrap();
        items.last().unwrap().id.clone()
    };

    let service = DataService::open(&config).unwrap();
    let planning = service.items::<ChecklistItem>();
    assert_eq!(planning.len(), 4);
    assert!(planning.iter().any(|i| i.id == added_id && i.text == "Pack chargers"));

    let itinerary: Vec<String> = service.items::<ItineraryItem>().into_iter().map(|i| i.id).collect();
    assert_eq!(itinerary, vec!["1".to_string(), "3".to_string()]);
    assert_eq!(service.exchange_rate(), 0.0061);
}

#[test]
fn test_export_import_into_fresh_storage() {
    let temp = TempDir::new().unwrap();
    let config = local_config(&temp);

    let source = DataService::open(&config).unwrap();
    let kv = source.local_store().kv();
    let date = chrono::NaiveDate::from_ymd_opt(2025, 12, 31).unwrap();
    let path = backup::export_to_dir(kv, temp.path(), date).unwrap();
    assert!(path.ends_with("travel_backup_2025-12-31.json"));

    let target_dir = TempDir::new().unwrap();
    let target = KvStore::open(&target_dir.path().join("restored.db")).unwrap();
    let applied = backup::import_file(&target, &path).unwrap();
    assert_eq!(applied.len(), 5);

    for key in tpp::collection::ALL_STORAGE_KEYS {
        assert_eq!(kv.get_item(key).unwrap(), target.get_item(key).unwrap(), "{}", key);
    }

    let restored = DataService::local(LocalStore::new(target), ServiceSettings::default()).unwrap();
    assert_eq!(restored.items::<Member>(), source.items::<Member>());
}

#[test]
fn test_import_missing_key_keeps_existing_value() {
    let temp = TempDir::new().unwrap();
    let config = local_config(&temp);
    let mut service = DataService::open(&config).unwrap();
    service
        .add(Expense::new("Hotpot".into(), 45000.0, "KRW".into(), ExpenseType::Public, "mem_1".into()))
        .unwrap();
    let expenses_before = service.local_store().kv().get_item("tpp_local_expenses").unwrap();

    let file = temp.path().join("partial.json");
    fs::write(&file, r#"{"tpp_local_members":[{"id":7,"name":"Guide"}]}"#).unwrap();
    backup::import_file(service.local_store().kv(), &file).unwrap();
    drop(service);

    let reopened = DataService::open(&config).unwrap();
    assert_eq!(
        reopened.local_store().kv().get_item("tpp_local_expenses").unwrap(),
        expenses_before
    );
    let members = reopened.items::<Member>();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].id, "7");
    assert_eq!(reopened.current_user().unwrap().name, "Guide");
}

#[test]
fn test_malformed_import_file_is_rejected() {
    let temp = TempDir::new().unwrap();
    let kv = KvStore::open(&temp.path().join("store.db")).unwrap();
    let file = temp.path().join("broken.json");
    fs::write(&file, "[\"not\", \"an\", \"object\"]").unwrap();

    assert!(matches!(
        backup::import_file(&kv, &file),
        Err(backup::BackupError::MalformedImport)
    ));
    assert!(kv.keys().unwrap().is_empty());
}

#[test]
fn test_two_clients_share_a_remote_database_file() {
    let temp = TempDir::new().unwrap();
    let db_path = temp.path().join("shared.db");
    let mut first = remote_client(&temp, &db_path);
    let mut second = remote_client(&temp, &db_path);

    first
        .add(ItineraryItem::new(
            "2025-12-27".into(),
            "11:00".into(),
            ItineraryKind::Activity,
            "Busan".into(),
            "Gamcheon village".into(),
        ))
        .unwrap();
    second
        .add(ItineraryItem::new(
            "2025-12-27".into(),
            "08:00".into(),
            ItineraryKind::Transport,
            "Seoul".into(),
            "KTX to Busan".into(),
        ))
        .unwrap();

    first.poll();
    second.poll();
    assert_eq!(first.items::<ItineraryItem>().len(), 2);
    assert_eq!(second.items::<ItineraryItem>().len(), 2);

    first.shutdown();
    second.shutdown();
}
