use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tracing::info;

use crate::config::{PipelineConfig, RaceKeyPolicy};
use crate::error::Result;
use crate::pipeline::normalize::canonical_name;
use crate::table::{col, ColumnDef, ColumnType, KeyValue, Table, Value};

/// Declarative description of one dimension: natural-key columns plus
/// descriptive extras carried along.
#[derive(Debug, Clone)]
pub struct DimensionSpec {
    pub name: &'static str,
    pub surrogate: &'static str,
    pub key_columns: Vec<(&'static str, ColumnType)>,
    pub extra_columns: Vec<(&'static str, ColumnType)>,
}

/// The four dimension tables of the warehouse.
#[derive(Debug, Clone, PartialEq)]
pub struct Dimensions {
    pub season: Table,
    pub race: Table,
    pub driver: Table,
    pub team: Table,
}

/// Build a dimension from one or more contributing sources:
/// project the key and extra columns, concatenate, drop rows with a null
/// natural key, deduplicate (keeping the row with the most complete
/// descriptive metadata), sort ascending by natural key, and assign dense
/// surrogate keys 1..N in that order. Output is identical for identical
/// inputs regardless of source row order.
pub fn build_dimension(sources: &[&Table], spec: &DimensionSpec) -> Result<Table> {
    let key_len = spec.key_columns.len();

    // Project and concatenate; a source missing a column contributes nulls.
    let mut candidates: Vec<(Vec<KeyValue>, Vec<Value>)> = Vec::new();
    for source in sources {
        let projection: Vec<(&str, &str, ColumnType)> = spec
            .key_columns
            .iter()
            .chain(spec.extra_columns.iter())
            .map(|(name, ty)| (*name, *name, *ty))
            .collect();
        let projected = source.project(spec.name, &projection);

        for row in projected.rows() {
            let key: Option<Vec<KeyValue>> = row[..key_len].iter().map(Value::as_key).collect();
            // Rows with a null natural key cannot identify an entity.
            if let Some(key) = key {
                candidates.push((key, row.clone()));
            }
        }
    }

    // Deduplicate on the natural key. Tie-break: prefer the candidate with
    // the most non-null descriptive columns, then the row that sorts first.
    let mut best: HashMap<Vec<KeyValue>, Vec<Value>> = HashMap::new();
    for (key, row) in candidates {
        match best.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(row);
            }
            Entry::Occupied(mut slot) => {
                if beats(&row, slot.get(), key_len) {
                    slot.insert(row);
                }
            }
        }
    }

    let mut rows: Vec<(Vec<KeyValue>, Vec<Value>)> = best.into_iter().collect();
    rows.sort_by(|a, b| a.0.cmp(&b.0));

    let mut defs: Vec<ColumnDef> = vec![col(spec.surrogate, ColumnType::Int)];
    defs.extend(
        spec.key_columns
            .iter()
            .chain(spec.extra_columns.iter())
            .map(|(name, ty)| col(name, *ty)),
    );

    let mut table = Table::new(spec.name, defs);
    for (i, (_, row)) in rows.into_iter().enumerate() {
        let mut values = Vec::with_capacity(row.len() + 1);
        values.push(Value::Int(i as i64 + 1));
        values.extend(row);
        table.push_row(values)?;
    }

    info!(dimension = spec.name, rows = table.row_count(), "built dimension");
    Ok(table)
}

/// True when `challenger` should replace `current` for the same natural key.
fn beats(challenger: &[Value], current: &[Value], key_len: usize) -> bool {
    let completeness =
        |row: &[Value]| row[key_len..].iter().filter(|v| !v.is_null()).count();
    let (c, b) = (completeness(challenger), completeness(current));
    if c != b {
        return c > b;
    }
    // Equal completeness: keep the row that sorts first so the winner does
    // not depend on source ordering.
    crate::table::cmp_rows_at(
        challenger,
        current,
        &(0..challenger.len()).collect::<Vec<_>>(),
    )
    .is_lt()
}

/// Build all four dimensions from the two normalized sources.
pub fn build_dimensions(
    results: &Table,
    winners: &Table,
    cfg: &PipelineConfig,
) -> Result<Dimensions> {
    let season = build_dimension(
        &[results, winners],
        &DimensionSpec {
            name: "dim_season",
            surrogate: "season_id",
            key_columns: vec![("year", ColumnType::Int)],
            extra_columns: vec![],
        },
    )?;

    let race_spec = match cfg.race_key {
        RaceKeyPolicy::Calendar => DimensionSpec {
            name: "dim_race",
            surrogate: "race_id",
            key_columns: vec![
                ("year", ColumnType::Int),
                ("date", ColumnType::Date),
                ("circuit", ColumnType::Text),
            ],
            extra_columns: vec![
                ("grand_prix", ColumnType::Text),
                ("continent", ColumnType::Text),
            ],
        },
        RaceKeyPolicy::EventName => DimensionSpec {
            name: "dim_race",
            surrogate: "race_id",
            key_columns: vec![
                ("year", ColumnType::Int),
                ("grand_prix", ColumnType::Text),
            ],
            extra_columns: vec![
                ("date", ColumnType::Date),
                ("circuit", ColumnType::Text),
                ("continent", ColumnType::Text),
            ],
        },
    };
    let race = finish_race_dimension(build_dimension(&[results, winners], &race_spec)?)?;

    let winners_drivers = winners.project(
        "winning_drivers",
        &[("winner_name", "driver_name", ColumnType::Text)],
    );
    let mut subject = Table::new(
        "subject_driver",
        vec![col("driver_name", ColumnType::Text)],
    );
    subject.push_row(vec![Value::Text(canonical_name(&cfg.subject_driver))])?;
    let driver = build_dimension(
        &[&winners_drivers, &subject],
        &DimensionSpec {
            name: "dim_driver",
            surrogate: "driver_id",
            key_columns: vec![("driver_name", ColumnType::Text)],
            extra_columns: vec![],
        },
    )?;

    let result_teams = results.project("result_teams", &[("team", "team_name", ColumnType::Text)]);
    let winner_teams = winners.project("winner_teams", &[("team", "team_name", ColumnType::Text)]);
    let team = build_dimension(
        &[&result_teams, &winner_teams],
        &DimensionSpec {
            name: "dim_team",
            surrogate: "team_id",
            key_columns: vec![("team_name", ColumnType::Text)],
            extra_columns: vec![],
        },
    )?;

    Ok(Dimensions {
        season,
        race,
        driver,
        team,
    })
}

/// Derive `race_number` (the round within each season, numbered in
/// chronological order) and lay the columns out in warehouse order.
fn finish_race_dimension(dim: Table) -> Result<Table> {
    let id_i = dim.column_index("race_id")?;
    let year_i = dim.column_index("year")?;
    let date_i = dim.column_index("date")?;
    let gp_i = dim.column_index("grand_prix")?;
    let circuit_i = dim.column_index("circuit")?;
    let continent_i = dim.column_index("continent")?;

    let mut order: Vec<usize> = (0..dim.row_count()).collect();
    order.sort_by(|&a, &b| {
        let (ra, rb) = (&dim.rows()[a], &dim.rows()[b]);
        ra[year_i]
            .key_cmp(&rb[year_i])
            .then(ra[date_i].key_cmp(&rb[date_i]))
            .then(a.cmp(&b))
    });

    let mut rounds = vec![0i64; dim.row_count()];
    let mut current_year: Option<i64> = None;
    let mut round = 0;
    for idx in order {
        let year = dim.rows()[idx][year_i].as_int();
        if year != current_year {
            current_year = year;
            round = 0;
        }
        round += 1;
        rounds[idx] = round;
    }

    let mut out = Table::new(
        "dim_race",
        vec![
            col("race_id", ColumnType::Int),
            col("year", ColumnType::Int),
            col("race_number", ColumnType::Int),
            col("grand_prix", ColumnType::Text),
            col("date", ColumnType::Date),
            col("circuit", ColumnType::Text),
            col("continent", ColumnType::Text),
        ],
    );
    for (i, row) in dim.rows().iter().enumerate() {
        out.push_row(vec![
            row[id_i].clone(),
            row[year_i].clone(),
            Value::Int(rounds[i]),
            row[gp_i].clone(),
            row[date_i].clone(),
            row[circuit_i].clone(),
            row[continent_i].clone(),
        ])?;
    }
    Ok(out)
}
