//! Behaviour every MappingStore implementation must share.

use brickmap_core::{
    BrickmapError, Catalog, ColorEquivalence, Direction, DirectionSet, PartEquivalence,
    StorageError, Table,
};
use brickmap_storage::{MappingStore, MockStore, SqliteStore, PART_TEXT_COLUMNS};
use chrono::{NaiveDate, TimeZone, Utc};

fn with_tables<S: MappingStore>(store: S) -> S {
    store.create_table(Table::Colors).unwrap();
    store.create_table(Table::PartMapping).unwrap();
    store
}

fn stores() -> Vec<(&'static str, Box<dyn MappingStore>)> {
    vec![
        (
            "mock",
            Box::new(with_tables(MockStore::new())) as Box<dyn MappingStore>,
        ),
        (
            "sqlite",
            Box::new(with_tables(SqliteStore::open_in_memory().unwrap())) as Box<dyn MappingStore>,
        ),
    ]
}

#[test]
fn test_create_table_is_idempotent() {
    for (name, store) in stores() {
        store.create_table(Table::PartMapping).unwrap();
        assert!(store.table_exists(Table::PartMapping).unwrap(), "{name}");
    }
}

#[test]
fn test_color_crud() {
    for (name, store) in stores() {
        let id = store
            .color_insert(&ColorEquivalence::new(Some(21), Some(5), Some(4)).with_name("Bright Red"))
            .unwrap();
        let mut color = store.color_get(id).unwrap().unwrap();
        assert_eq!(color.name, "Bright Red", "{name}");
        assert!(color.last_modified.is_some(), "{name}");

        color.notes = "checked".to_string();
        store.color_update(&color).unwrap();
        assert_eq!(store.color_get(id).unwrap().unwrap().notes, "checked", "{name}");

        let found = store.color_find_by_code(Catalog::Marketplace, 5).unwrap();
        assert_eq!(found.len(), 1, "{name}");
        assert!(store.color_find_by_code(Catalog::OpenFormat, 5).unwrap().is_empty());
        assert_eq!(store.color_get(id + 100).unwrap(), None, "{name}");
        assert_eq!(store.color_count().unwrap(), 1, "{name}");
    }
}

#[test]
fn test_absent_codes_are_never_found() {
    for (name, store) in stores() {
        store
            .color_insert(&ColorEquivalence::new(None, None, Some(4)).with_name("Red"))
            .unwrap();
        store
            .color_insert(&ColorEquivalence::new(None, None, Some(14)).with_name("Yellow"))
            .unwrap();
        for catalog in Catalog::ALL {
            let found = store
                .color_find_by_code(catalog, catalog.absent_color_code())
                .unwrap();
            assert!(found.is_empty(), "{name}: {catalog}");
        }
        assert_eq!(store.color_find_by_code(Catalog::OpenFormat, 4).unwrap().len(), 1, "{name}");
    }
}

#[test]
fn test_color_table_has_no_fulltext_columns() {
    for (name, store) in stores() {
        assert!(store.create_fulltext(Table::Colors, &["lddname"]).is_err(), "{name}");
        assert!(!store.fulltext_exists(Table::Colors).unwrap(), "{name}");
    }
}

#[test]
fn test_update_of_missing_record_is_not_found() {
    for (name, store) in stores() {
        let err = store
            .color_update(&ColorEquivalence::new(Some(1), None, None).with_id(42))
            .unwrap_err();
        assert_eq!(
            err,
            BrickmapError::Storage(StorageError::NotFound {
                table: Table::Colors,
                id: 42
            }),
            "{name}"
        );
    }
}

#[test]
fn test_part_lookup_by_translation_source() {
    for (name, store) in stores() {
        store
            .part_insert(
                &PartEquivalence::new("3001", "3001", "3001.dat")
                    .with_directions(DirectionSet::OPEN_FORMAT_TO_PRIMARY),
            )
            .unwrap();
        store
            .part_insert(
                &PartEquivalence::new("3001", "3001pb01", "3001p01.dat")
                    .with_decoration("4113")
                    .with_directions(DirectionSet::PRIMARY_TO_MARKETPLACE),
            )
            .unwrap();

        let hits = store
            .part_find_by_source(Direction::OpenFormatToPrimary, "3001.dat", "")
            .unwrap();
        assert_eq!(hits.len(), 1, "{name}");
        let hits = store
            .part_find_by_source(Direction::PrimaryToMarketplace, "3001", "4113")
            .unwrap();
        assert_eq!(hits[0].marketplace_id, "3001pb01", "{name}");
        assert!(store
            .part_find_by_source(Direction::PrimaryToMarketplace, "3001", "")
            .unwrap()
            .is_empty());
    }
}

#[test]
fn test_rollback_discards_writes() {
    for (name, store) in stores() {
        store.part_insert(&PartEquivalence::new("3001", "", "")).unwrap();
        store.set_autocommit(false).unwrap();
        store.part_insert(&PartEquivalence::new("3002", "", "")).unwrap();
        let mut first = store.part_get(1).unwrap().unwrap();
        first.name = "changed".to_string();
        store.part_update(&first).unwrap();
        store.rollback().unwrap();
        store.set_autocommit(true).unwrap();

        assert_eq!(store.part_count().unwrap(), 1, "{name}");
        assert_eq!(store.part_get(1).unwrap().unwrap().name, "", "{name}");
    }
}

#[test]
fn test_fulltext_search_and_drop() {
    for (name, store) in stores() {
        store
            .part_insert(&PartEquivalence::new("3001", "3001", "3001.dat").with_name("Brick 2 x 4"))
            .unwrap();
        store
            .part_insert(&PartEquivalence::new("3003", "3003", "3003.dat").with_name("Brick 2 x 2"))
            .unwrap();
        store.create_fulltext(Table::PartMapping, &PART_TEXT_COLUMNS).unwrap();
        assert!(store.fulltext_exists(Table::PartMapping).unwrap(), "{name}");

        let hits = store.fulltext_search(Table::PartMapping, "brick").unwrap();
        assert_eq!(hits.len(), 2, "{name}");
        let hits = store.fulltext_search(Table::PartMapping, "3003.dat").unwrap();
        assert_eq!(hits.len(), 1, "{name}");
        assert_eq!(hits[0].0, 2, "{name}");
        assert!(store
            .fulltext_search(Table::PartMapping, "technic")
            .unwrap()
            .is_empty());

        store.drop_fulltext(Table::PartMapping).unwrap();
        assert!(!store.fulltext_exists(Table::PartMapping).unwrap(), "{name}");
        assert!(store.fulltext_search(Table::PartMapping, "brick").is_err(), "{name}");
    }
}

#[test]
fn test_trim_counts_changed_rows() {
    for (name, store) in stores() {
        store
            .part_insert(&PartEquivalence::new("3001 ", "3001", "").with_master(" 3001"))
            .unwrap();
        store.part_insert(&PartEquivalence::new("3002", "3002", "")).unwrap();
        assert_eq!(store.part_trim_text_fields().unwrap(), 1, "{name}");
        assert_eq!(store.part_trim_text_fields().unwrap(), 0, "{name}");
        assert_eq!(store.part_get(1).unwrap().unwrap().master_id, "3001", "{name}");
    }
}

#[test]
fn test_modified_since_and_dates() {
    let first_day = Utc.with_ymd_and_hms(2017, 4, 10, 9, 30, 0).unwrap();
    let mock = with_tables(MockStore::new());
    let sqlite = with_tables(SqliteStore::open_in_memory().unwrap());
    mock.freeze_clock(first_day);
    sqlite.freeze_clock(first_day);

    let stores: Vec<(&str, &dyn MappingStore)> = vec![
        ("mock", &mock as &dyn MappingStore),
        ("sqlite", &sqlite as &dyn MappingStore),
    ];
    for (_, store) in &stores {
        store.part_insert(&PartEquivalence::new("3001", "", "")).unwrap();
    }
    mock.advance_clock(chrono::Duration::days(1));
    sqlite.advance_clock(chrono::Duration::days(1));
    for (_, store) in &stores {
        store.part_insert(&PartEquivalence::new("3002", "", "")).unwrap();
    }

    for (name, store) in stores {
        let since = first_day + chrono::Duration::hours(1);
        let recent = store.part_modified_since(since).unwrap();
        assert_eq!(recent.len(), 1, "{name}");
        assert_eq!(recent[0].design_id, "3002", "{name}");
        assert_eq!(store.part_modified_since(first_day).unwrap().len(), 2, "{name}");

        assert_eq!(
            store.part_modified_dates(20).unwrap(),
            vec![
                NaiveDate::from_ymd_opt(2017, 4, 11).unwrap(),
                NaiveDate::from_ymd_opt(2017, 4, 10).unwrap(),
            ],
            "{name}"
        );
        assert_eq!(
            store.part_latest_modified().unwrap(),
            Some(first_day + chrono::Duration::days(1)),
            "{name}"
        );
    }
}

#[test]
fn test_schema_ledger_overwrites() {
    for (name, store) in stores() {
        assert_eq!(store.schema_version("MPPMVERSION").unwrap(), None, "{name}");
        store.set_schema_version("MPPMVERSION", 0).unwrap();
        store.set_schema_version("MPPMVERSION", 1).unwrap();
        assert_eq!(store.schema_version("MPPMVERSION").unwrap(), Some(1), "{name}");
    }
}
