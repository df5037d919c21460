use std::fs;
use std::path::{Path, PathBuf};

use f1_warehouse::config::{Config, PipelineConfig, RaceKeyPolicy, SourcesConfig, WarehouseConfig};
use f1_warehouse::error::PipelineError;
use f1_warehouse::pipeline;
use tempfile::TempDir;

const RESULTS_CSV: &str = "\
year,race_number,grand_prix,team,grid_position,race_position,event
2005,1,Australian Grand Prix,Renault,13,3,
2005,2,Malaysian Grand Prix,Renault,1,1,
2005,3,Bahrain Grand Prix,Renault,1,ab,
2006,1,Bahrain Grand Prix,Renault,4,1,
2006,2,Phantom Grand Prix,Renault,5,2,
";

// The winners table carries the race calendar. One row has an unparsable
// date and one winner name needs trimming/title-casing; the phantom race can
// never join the calendar.
const WINNERS_CSV: &str = "\
year,grand_prix,date,circuit,continent,winner_name,team,laps,time
2005,Australian Grand Prix,2005-03-06,Albert Park,Oceania,giancarlo fisichella,Renault,57,1:24:17.336
2005,Malaysian Grand Prix,2005-03-20,Sepang,Asia,  Fernando Alonso ,Renault,56,1:31:33.736
2005,Bahrain Grand Prix,2005-04-03,Sakhir,Asia,Fernando Alonso,Renault\u{a0},57,1:29:18.531
2006,Bahrain Grand Prix,2006-03-12,Sakhir,Asia,Fernando Alonso,Renault,57,1:29:46.205
2006,Phantom Grand Prix,not-a-date,Nowhere,Asia,Fernando Alonso,Renault,57,1:30:00.000
";

struct Fixture {
    _dir: TempDir,
    config: Config,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let results = dir.path().join("results.csv");
    let winners = dir.path().join("winners.csv");
    fs::write(&results, RESULTS_CSV).unwrap();
    fs::write(&winners, WINNERS_CSV).unwrap();

    let config = Config {
        sources: SourcesConfig { results, winners },
        warehouse: WarehouseConfig {
            path: dir.path().join("warehouse").join("f1.db"),
            schema: PathBuf::from("sql/create_tables.sql"),
        },
        pipeline: PipelineConfig {
            subject_driver: "Fernando Alonso".to_string(),
            race_key: RaceKeyPolicy::Calendar,
            expected_driver_facts: Some(4),
        },
    };
    Fixture { _dir: dir, config }
}

fn dump_table(db: &Path, table: &str) -> Vec<String> {
    let conn = rusqlite::Connection::open(db).unwrap();
    let mut stmt = conn.prepare(&format!("SELECT * FROM {table} ORDER BY 1")).unwrap();
    let columns = stmt.column_count();
    let rows = stmt
        .query_map([], |row| {
            let mut cells = Vec::with_capacity(columns);
            for i in 0..columns {
                cells.push(format!("{:?}", row.get::<_, rusqlite::types::Value>(i)?));
            }
            Ok(cells.join("|"))
        })
        .unwrap();
    rows.collect::<Result<Vec<_>, _>>().unwrap()
}

#[test]
fn full_load_builds_the_expected_star_schema() {
    let fixture = fixture();
    let summary = pipeline::run_load(&fixture.config).unwrap();

    assert_eq!(summary.seasons, 2);
    // The phantom race has no parsable date and never enters the calendar.
    assert_eq!(summary.races, 4);
    assert_eq!(summary.drivers, 2);
    assert_eq!(summary.teams, 1);
    assert_eq!(summary.winner_facts, 4);
    assert_eq!(summary.driver_facts, 4);
    assert_eq!(summary.warnings, 0);

    let db = &fixture.config.warehouse.path;
    assert!(db.exists());
    assert!(!db.with_extension("db.loading").exists());

    // Dense surrogate keys in natural-key order; the trimmed winner name
    // deduplicated against the subject driver.
    let drivers = dump_table(db, "dim_driver");
    assert_eq!(drivers.len(), 2);
    assert!(drivers[0].contains("Fernando Alonso"));
    assert!(drivers[1].contains("Giancarlo Fisichella"));

    // The abandoned race keeps its fact with a null position.
    let conn = rusqlite::Connection::open(db).unwrap();
    let (position, finished): (Option<i64>, i64) = conn
        .query_row(
            "SELECT race_position, did_finish FROM fact_driver_results \
             WHERE season_id = (SELECT season_id FROM dim_season WHERE year = 2005) \
               AND race_number = 3",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(position, None);
    assert_eq!(finished, 0);
}

#[test]
fn reload_into_a_fresh_warehouse_is_byte_identical() {
    let fixture = fixture();

    pipeline::run_load(&fixture.config).unwrap();
    let first: Vec<Vec<String>> = TABLES
        .iter()
        .map(|t| dump_table(&fixture.config.warehouse.path, t))
        .collect();

    pipeline::run_load(&fixture.config).unwrap();
    let second: Vec<Vec<String>> = TABLES
        .iter()
        .map(|t| dump_table(&fixture.config.warehouse.path, t))
        .collect();

    assert_eq!(first, second);
}

const TABLES: [&str; 6] = [
    "dim_season",
    "dim_race",
    "dim_driver",
    "dim_team",
    "fact_race_winners",
    "fact_driver_results",
];

#[test]
fn surrogate_keys_are_dense_and_facts_have_no_orphans() {
    let fixture = fixture();
    pipeline::run_load(&fixture.config).unwrap();
    let conn = rusqlite::Connection::open(&fixture.config.warehouse.path).unwrap();

    for (table, key) in [
        ("dim_season", "season_id"),
        ("dim_race", "race_id"),
        ("dim_driver", "driver_id"),
        ("dim_team", "team_id"),
    ] {
        let (min, max, count): (i64, i64, i64) = conn
            .query_row(
                &format!("SELECT MIN({key}), MAX({key}), COUNT(*) FROM {table}"),
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();
        assert_eq!((min, max), (1, count), "{table} keys are not dense");
    }

    for fact in ["fact_race_winners", "fact_driver_results"] {
        for (key, dimension) in [
            ("race_id", "dim_race"),
            ("season_id", "dim_season"),
            ("driver_id", "dim_driver"),
            ("team_id", "dim_team"),
        ] {
            let orphans: i64 = conn
                .query_row(
                    &format!(
                        "SELECT COUNT(*) FROM {fact} f \
                         LEFT JOIN {dimension} d ON f.{key} = d.{key} \
                         WHERE d.{key} IS NULL"
                    ),
                    [],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(orphans, 0, "{fact}.{key} has orphans");
        }
    }
}

#[test]
fn verify_flags_a_hand_corrupted_foreign_key() {
    let fixture = fixture();
    pipeline::run_load(&fixture.config).unwrap();

    let conn = rusqlite::Connection::open(&fixture.config.warehouse.path).unwrap();
    conn.execute(
        "UPDATE fact_driver_results SET team_id = 9999 WHERE fact_id = 1",
        [],
    )
    .unwrap();
    drop(conn);

    let err = pipeline::run_verify(&fixture.config).unwrap_err();
    match err {
        PipelineError::Integrity(report) => {
            assert_eq!(report.violations.len(), 1);
            assert_eq!(report.violations[0].table, "fact_driver_results");
            assert_eq!(report.violations[0].count, 1);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn missing_source_fails_before_any_transformation() {
    let mut fixture = fixture();
    fixture.config.sources.winners = PathBuf::from("/nonexistent/winners.csv");

    let err = pipeline::run_load(&fixture.config).unwrap_err();
    assert!(matches!(err, PipelineError::SourceNotFound(_)));
    assert!(!fixture.config.warehouse.path.exists());
}

#[test]
fn quality_gate_aborts_the_run_before_any_build() {
    let fixture = fixture();
    let bad = fixture.config.sources.results.clone();
    fs::write(
        &bad,
        "year,race_number,grand_prix,team,grid_position,race_position\n1850,1,Australian Grand Prix,Renault,1,1\n",
    )
    .unwrap();

    let err = pipeline::run_load(&fixture.config).unwrap_err();
    assert!(matches!(err, PipelineError::DataQuality { .. }));
    assert!(!fixture.config.warehouse.path.exists());
}

#[test]
fn event_name_policy_joins_without_a_calendar() {
    let mut fixture = fixture();
    fixture.config.pipeline.race_key = RaceKeyPolicy::EventName;
    // Under the event-name key the phantom race identifies itself by name,
    // so both its winner row and its results row survive.
    fixture.config.pipeline.expected_driver_facts = Some(5);

    let summary = pipeline::run_load(&fixture.config).unwrap();
    assert_eq!(summary.races, 5);
    assert_eq!(summary.winner_facts, 5);
    assert_eq!(summary.driver_facts, 5);
}
