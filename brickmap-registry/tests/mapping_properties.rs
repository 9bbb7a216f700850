//! End-to-end behavior of the mapping service, run against every store.

use brickmap_core::{
    BrickmapConfig, BrickmapError, Catalog, ColorEquivalence, Direction, DirectionSet,
    PartEquivalence, PartFilter, Table, ValidationError,
};
use brickmap_registry::{ImportPolicy, MappingService};
use brickmap_storage::{MappingStore, SqliteStore};
use brickmap_test_utils::assertions::{
    assert_integrity_error, assert_same_colors, assert_same_parts, assert_validation_conflict,
};
use brickmap_test_utils::fixtures;
use std::sync::Arc;

type Service = MappingService<dyn MappingStore>;

fn services() -> Vec<(&'static str, Arc<dyn MappingStore>, Service)> {
    fixtures::all_stores()
        .into_iter()
        .map(|(name, store)| {
            let service = MappingService::init(Arc::clone(&store), BrickmapConfig::default())
                .unwrap_or_else(|e| panic!("{name}: init failed: {e}"));
            (name, store, service)
        })
        .collect()
}

fn load_fixtures(service: &Service) {
    for color in fixtures::standard_colors() {
        service.colors().upsert(&color).unwrap();
    }
    service
        .parts()
        .with_bulk_session(|parts| {
            for part in fixtures::standard_parts() {
                parts.upsert(&part)?;
            }
            Ok(())
        })
        .unwrap();
}

#[test]
fn test_unknown_color_before_any_import() {
    for (name, _store, service) in services() {
        let unknown = service.colors().lookup(0);
        assert_eq!(unknown.name, "Unknown", "{name}");
        assert_eq!(unknown.map_id, 0, "{name}");
        assert_eq!(service.colors().count().unwrap(), 0, "{name}");
    }
}

#[test]
fn test_duplicate_color_code_rejected() {
    for (name, _store, service) in services() {
        let first = service
            .colors()
            .upsert(&ColorEquivalence::new(Some(21), None, None).with_name("Bright Red"))
            .unwrap();
        let result = service
            .colors()
            .upsert(&ColorEquivalence::new(Some(21), Some(5), None).with_name("Copy"));
        assert_validation_conflict(&result, first);
        assert_eq!(service.colors().count().unwrap(), 1, "{name}");
    }
}

#[test]
fn test_open_format_black_is_a_real_code() {
    for (name, _store, service) in services() {
        let black = service.colors().upsert(&fixtures::black()).unwrap();
        let found = service
            .colors()
            .lookup_by_code(Catalog::OpenFormat, 0)
            .unwrap();
        assert_eq!(found.map(|c| c.map_id), Some(black), "{name}");

        // Absent open-format codes never collide with each other
        service
            .colors()
            .upsert(&ColorEquivalence::new(Some(500), None, None))
            .unwrap();
        service
            .colors()
            .upsert(&ColorEquivalence::new(Some(501), None, None))
            .unwrap();
        assert_eq!(service.colors().count().unwrap(), 3, "{name}");
    }
}

#[test]
fn test_second_primary_to_marketplace_mapping_names_first() {
    for (name, _store, service) in services() {
        let first = service
            .parts()
            .upsert(
                &PartEquivalence::new("3001", "3001", "3001.dat")
                    .with_directions(DirectionSet::PRIMARY_TO_MARKETPLACE),
            )
            .unwrap();
        let result = service.parts().upsert(
            &PartEquivalence::new("3001", "3001a", "")
                .with_directions(DirectionSet::PRIMARY_TO_MARKETPLACE),
        );
        assert_validation_conflict(&result, first);
        match result {
            Err(BrickmapError::Validation(ValidationError::DuplicatePartMapping {
                direction,
                ..
            })) => assert_eq!(direction, Direction::PrimaryToMarketplace, "{name}"),
            other => panic!("{name}: unexpected {other:?}"),
        }
    }
}

#[test]
fn test_translate_none_one_two() {
    for (name, store, service) in services() {
        let parts = service.parts();
        assert!(
            parts
                .translate(Direction::MarketplaceToOpenFormat, "3020", None)
                .unwrap()
                .is_none(),
            "{name}"
        );

        let id = parts.upsert(&fixtures::plate_2x4()).unwrap();
        let found = parts
            .translate(Direction::MarketplaceToOpenFormat, "3020", None)
            .unwrap();
        assert_eq!(found.map(|p| p.map_id), Some(id), "{name}");

        // Corrupt the table behind the registry's back
        store.part_insert(&fixtures::plate_2x4()).unwrap();
        let result = parts.translate(Direction::MarketplaceToOpenFormat, "3020", None);
        assert_integrity_error(&result);
    }
}

#[test]
fn test_cleanup_idempotent() {
    for (name, _store, service) in services() {
        service
            .parts()
            .upsert(
                &PartEquivalence::new("3001 ", " 3001", "3001.dat")
                    .with_master(" 3001 ")
                    .with_name("Brick 2 x 4  "),
            )
            .unwrap();
        service.parts().upsert(&fixtures::plate_2x4()).unwrap();
        let before = service.parts().export_all().unwrap();

        assert_eq!(service.parts().cleanup().unwrap(), 1, "{name}");
        let once = service.parts().export_all().unwrap();
        assert_eq!(service.parts().cleanup().unwrap(), 0, "{name}");
        assert_eq!(service.parts().export_all().unwrap(), once, "{name}");

        assert_eq!(once[0].design_id, "3001", "{name}");
        assert_eq!(once[0].marketplace_id, "3001", "{name}");
        assert_eq!(once[0].name, "Brick 2 x 4", "{name}");
        assert_eq!(once[0].last_modified, before[0].last_modified, "{name}");
    }
}

#[test]
fn test_export_modified_since_is_stable() {
    for (name, _store, service) in services() {
        load_fixtures(&service);
        let since = service.part_modified_buckets().unwrap()[0];
        let first = service.export_modified_since(since).unwrap();
        let second = service.export_modified_since(since).unwrap();
        assert_eq!(first, second, "{name}");
        assert_eq!(first.parts.len(), 4, "{name}");
        assert_eq!(first.colors.len(), 4, "{name}");
        assert!(service
            .export_modified_since(since + chrono::Duration::days(1))
            .unwrap()
            .is_empty());
    }
}

#[test]
fn test_export_then_import_reproduces_content() {
    for (name, _store, source) in services() {
        load_fixtures(&source);
        let mut colors = Vec::new();
        source.write_color_snapshot(&mut colors, None).unwrap();
        let mut parts = Vec::new();
        source.write_part_snapshot(&mut parts, None).unwrap();

        let target = MappingService::init(
            Arc::new(SqliteStore::open_in_memory().unwrap()) as Arc<dyn MappingStore>,
            BrickmapConfig::default(),
        )
        .unwrap();
        let color_report = target
            .import_colors(colors.as_slice(), ImportPolicy::AbortOnError)
            .unwrap();
        let part_report = target
            .import_parts(parts.as_slice(), ImportPolicy::AbortOnError)
            .unwrap();
        assert_eq!(color_report.inserted, 4, "{name}");
        assert_eq!(part_report.inserted, 4, "{name}");

        let exported = source.export_all().unwrap();
        let imported = target.export_all().unwrap();
        assert_same_colors(&exported.colors, &imported.colors);
        assert_same_parts(&exported.parts, &imported.parts);
    }
}

#[test]
fn test_abort_restores_identical_state() {
    for (name, _store, service) in services() {
        load_fixtures(&service);
        let digest = service.state_digest().unwrap();

        service.parts().begin_bulk_session().unwrap();
        service
            .parts()
            .upsert(&PartEquivalence::new("3003", "3003", "3003.dat").with_name("Brick 2 x 2"))
            .unwrap();
        let renamed = service
            .parts()
            .translate(Direction::PrimaryToMarketplace, "3001", None)
            .unwrap()
            .unwrap()
            .with_name("Renamed");
        service.parts().upsert(&renamed).unwrap();
        service.parts().abort_bulk_session().unwrap();

        assert_eq!(service.state_digest().unwrap(), digest, "{name}");
        let hits = service.parts().search("brick", &PartFilter::new()).unwrap();
        assert_eq!(hits.len(), 2, "{name}");
        assert!(hits.iter().all(|p| p.name != "Renamed"), "{name}");
    }
}

#[test]
fn test_failed_import_leaves_store_untouched() {
    for (name, store, service) in services() {
        load_fixtures(&service);
        let digest = service.state_digest().unwrap();
        let doc = r#"<?xml version="1.0" encoding="UTF-8"?>
<partmaps>
  <partmap id="0" masterid="3010" designid="3010" decorid="" name="Brick 1 x 4" blid="3010" ldrawid="3010.dat"
           ldd2bl="1" bl2ldd="1" ldd2dat="1" dat2ldd="1" bl2dat="1" dat2bl="1" lastmod=""/>
  <partmap id="0" masterid="3001" designid="3001" decorid="" name="Brick 2 x 4 again" blid="3001x" ldrawid=""
           ldd2bl="1" bl2ldd="0" ldd2dat="0" dat2ldd="0" bl2dat="0" dat2bl="0" lastmod=""/>
</partmaps>"#;
        let err = service
            .import_parts(doc.as_bytes(), ImportPolicy::SkipMalformed)
            .unwrap_err();
        assert!(err.is_validation(), "{name}");
        assert_eq!(service.state_digest().unwrap(), digest, "{name}");
        assert!(store.is_autocommit().unwrap(), "{name}");
        assert!(store.fulltext_exists(Table::PartMapping).unwrap(), "{name}");
        assert!(!service.parts().in_bulk_session(), "{name}");
    }
}

#[test]
fn test_search_and_buckets_after_import() {
    for (name, _store, service) in services() {
        load_fixtures(&service);
        let printed = service
            .parts()
            .search("print", &PartFilter::new())
            .unwrap();
        assert_eq!(printed.len(), 1, "{name}");
        let rules = service
            .parts()
            .search("2", &PartFilter::new().rules_only())
            .unwrap();
        assert_eq!(rules.len(), 3, "{name}");
        assert_eq!(service.parts().count_rules().unwrap(), 3, "{name}");
        assert_eq!(service.color_modified_buckets().unwrap().len(), 1, "{name}");
        assert_eq!(service.part_modified_buckets().unwrap().len(), 1, "{name}");
        assert_eq!(service.parts().recent_changes().unwrap().len(), 4, "{name}");
    }
}

#[test]
fn test_sqlite_file_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = BrickmapConfig::default().with_database_path(dir.path().join("mappings.db"));

    let service = MappingService::open(config.clone()).unwrap();
    service.colors().upsert(&fixtures::bright_red()).unwrap();
    service.parts().upsert(&fixtures::brick_2x4()).unwrap();
    let digest = service.state_digest().unwrap();
    service.shutdown().unwrap();

    let reopened = MappingService::open(config).unwrap();
    assert_eq!(reopened.schema_version().unwrap(), 1);
    assert_eq!(reopened.state_digest().unwrap(), digest);
    assert_eq!(reopened.colors().cached_ids().len(), 2);
    let ldraw = reopened
        .parts()
        .translate_id(Direction::PrimaryToOpenFormat, "3001", None)
        .unwrap();
    assert_eq!(ldraw.as_deref(), Some("3001.dat"));
    reopened.shutdown().unwrap();
}
