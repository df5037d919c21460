use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

use crate::config::{PipelineConfig, RaceKeyPolicy};
use crate::error::{PipelineError, Result};
use crate::pipeline::dimensions::Dimensions;
use crate::pipeline::normalize::canonical_name;
use crate::table::{cmp_rows_at, col, ColumnType, KeyValue, Table, Value};

/// The two fact tables of the warehouse.
#[derive(Debug, Clone, PartialEq)]
pub struct Facts {
    pub winners: Table,
    pub driver_results: Table,
}

/// Natural key → surrogate key index over one dimension table.
pub struct DimIndex {
    surrogates: HashMap<Vec<KeyValue>, i64>,
}

impl DimIndex {
    pub fn build(dim: &Table, surrogate: &str, key_columns: &[&str]) -> Result<Self> {
        let surrogate_i = dim.column_index(surrogate)?;
        let key_indices: Vec<usize> = key_columns
            .iter()
            .map(|c| dim.column_index(c))
            .collect::<Result<_>>()?;

        let mut surrogates = HashMap::with_capacity(dim.row_count());
        for row in dim.rows() {
            let key: Option<Vec<KeyValue>> =
                key_indices.iter().map(|&i| row[i].as_key()).collect();
            let key = key.ok_or_else(|| {
                PipelineError::InvariantViolation(format!(
                    "dimension {} contains a null natural key",
                    dim.name()
                ))
            })?;
            let id = row[surrogate_i].as_int().ok_or_else(|| {
                PipelineError::InvariantViolation(format!(
                    "dimension {} contains a non-integer surrogate key",
                    dim.name()
                ))
            })?;
            if surrogates.insert(key, id).is_some() {
                return Err(PipelineError::InvariantViolation(format!(
                    "dimension {} contains a duplicate natural key",
                    dim.name()
                )));
            }
        }

        Ok(Self { surrogates })
    }

    /// Resolve a natural key to its surrogate. A null component or an
    /// unknown key is simply an unmatched join, not an error.
    pub fn lookup(&self, values: &[&Value]) -> Option<i64> {
        let key: Option<Vec<KeyValue>> = values.iter().map(|v| v.as_key()).collect();
        self.surrogates.get(&key?).copied()
    }
}

struct DimIndexes {
    race: DimIndex,
    season: DimIndex,
    driver: DimIndex,
    team: DimIndex,
}

fn build_indexes(dims: &Dimensions, policy: RaceKeyPolicy) -> Result<DimIndexes> {
    let race_keys: &[&str] = match policy {
        RaceKeyPolicy::Calendar => &["year", "date", "circuit"],
        RaceKeyPolicy::EventName => &["year", "grand_prix"],
    };
    Ok(DimIndexes {
        race: DimIndex::build(&dims.race, "race_id", race_keys)?,
        season: DimIndex::build(&dims.season, "season_id", &["year"])?,
        driver: DimIndex::build(&dims.driver, "driver_id", &["driver_name"])?,
        team: DimIndex::build(&dims.team, "team_id", &["team_name"])?,
    })
}

pub fn build_facts(
    results: &Table,
    winners: &Table,
    dims: &Dimensions,
    cfg: &PipelineConfig,
) -> Result<Facts> {
    let indexes = build_indexes(dims, cfg.race_key)?;
    let winner_facts = build_winner_facts(winners, &indexes, cfg.race_key)?;
    let driver_facts = build_driver_result_facts(results, dims, &indexes, cfg)?;
    Ok(Facts {
        winners: winner_facts,
        driver_results: driver_facts,
    })
}

/// One fact per winners row that resolves against every dimension. Fact ids
/// are dense, assigned ascending by (year, date, circuit, winner_name).
fn build_winner_facts(
    winners: &Table,
    indexes: &DimIndexes,
    policy: RaceKeyPolicy,
) -> Result<Table> {
    let order_indices: Vec<usize> = ["year", "date", "circuit", "winner_name"]
        .iter()
        .map(|c| winners.column_index(c))
        .collect::<Result<_>>()?;
    let mut rows: Vec<&Vec<Value>> = winners.rows().iter().collect();
    rows.sort_by(|a, b| cmp_rows_at(a, b, &order_indices));

    let year_i = winners.column_index("year")?;
    let date_i = winners.column_index("date")?;
    let circuit_i = winners.column_index("circuit")?;
    let gp_i = winners.column_index("grand_prix")?;
    let name_i = winners.column_index("winner_name")?;
    let team_i = winners.column_index("team")?;
    let laps_i = winners.column_index("laps")?;
    let time_i = winners.column_index("time")?;

    let mut table = Table::new(
        "fact_race_winners",
        vec![
            col("fact_id", ColumnType::Int),
            col("race_id", ColumnType::Int),
            col("season_id", ColumnType::Int),
            col("driver_id", ColumnType::Int),
            col("team_id", ColumnType::Int),
            col("laps", ColumnType::Int),
            col("time", ColumnType::Text),
        ],
    );

    let mut dropped = 0usize;
    for row in rows {
        let race_key: Vec<&Value> = match policy {
            RaceKeyPolicy::Calendar => vec![&row[year_i], &row[date_i], &row[circuit_i]],
            RaceKeyPolicy::EventName => vec![&row[year_i], &row[gp_i]],
        };
        let resolved = (
            indexes.race.lookup(&race_key),
            indexes.season.lookup(&[&row[year_i]]),
            indexes.driver.lookup(&[&row[name_i]]),
            indexes.team.lookup(&[&row[team_i]]),
        );
        let (Some(race_id), Some(season_id), Some(driver_id), Some(team_id)) = resolved else {
            dropped += 1;
            debug!(year = ?row[year_i], "winners row did not resolve against all dimensions");
            continue;
        };

        let fact_id = table.row_count() as i64 + 1;
        table.push_row(vec![
            Value::Int(fact_id),
            Value::Int(race_id),
            Value::Int(season_id),
            Value::Int(driver_id),
            Value::Int(team_id),
            row[laps_i].clone(),
            row[time_i].clone(),
        ])?;
    }

    info!(
        facts = table.row_count(),
        dropped, "built fact_race_winners"
    );
    Ok(table)
}

/// One fact per results row that resolves against every dimension, at most
/// one per (driver, race). Fact ids are dense, assigned ascending by
/// (year, season round).
fn build_driver_result_facts(
    results: &Table,
    dims: &Dimensions,
    indexes: &DimIndexes,
    cfg: &PipelineConfig,
) -> Result<Table> {
    let order_indices: Vec<usize> = ["year", "race_number"]
        .iter()
        .map(|c| results.column_index(c))
        .collect::<Result<_>>()?;
    let mut rows: Vec<&Vec<Value>> = results.rows().iter().collect();
    rows.sort_by(|a, b| cmp_rows_at(a, b, &order_indices));

    let year_i = results.column_index("year")?;
    let gp_i = results.column_index("grand_prix")?;
    let team_i = results.column_index("team")?;
    let grid_i = results.column_index("grid_position")?;
    let position_i = results.column_index("race_position")?;
    let finish_i = results.column_index("did_finish")?;
    let event_i = results.column_index("event")?;

    let subject = Value::Text(canonical_name(&cfg.subject_driver));
    let driver_id = indexes.driver.lookup(&[&subject]).ok_or_else(|| {
        PipelineError::InvariantViolation(format!(
            "subject driver '{}' missing from {}",
            cfg.subject_driver,
            dims.driver.name()
        ))
    })?;

    // Results rows address races by (year, round); the shared race index is
    // keyed by the configured natural key, so the calendar policy needs its
    // own view of dim_race.
    let race_by_round = match cfg.race_key {
        RaceKeyPolicy::Calendar => {
            Some(DimIndex::build(&dims.race, "race_id", &["year", "race_number"])?)
        }
        RaceKeyPolicy::EventName => None,
    };

    let mut table = Table::new(
        "fact_driver_results",
        vec![
            col("fact_id", ColumnType::Int),
            col("race_id", ColumnType::Int),
            col("season_id", ColumnType::Int),
            col("driver_id", ColumnType::Int),
            col("team_id", ColumnType::Int),
            col("race_number", ColumnType::Int),
            col("grid_position", ColumnType::Int),
            col("race_position", ColumnType::Int),
            col("did_finish", ColumnType::Bool),
            col("event", ColumnType::Text),
        ],
    );

    let mut seen: HashSet<(i64, i64)> = HashSet::new();
    let mut dropped = 0usize;
    let mut current_year: Option<i64> = None;
    let mut season_round = 0i64;

    for row in rows {
        // Round within the season, in the source's own ordering.
        let year = row[year_i].as_int();
        if year != current_year {
            current_year = year;
            season_round = 0;
        }
        season_round += 1;

        let round = Value::Int(season_round);
        let race_id = match &race_by_round {
            Some(index) => index.lookup(&[&row[year_i], &round]),
            None => indexes.race.lookup(&[&row[year_i], &row[gp_i]]),
        };

        let resolved = (
            race_id,
            indexes.season.lookup(&[&row[year_i]]),
            indexes.team.lookup(&[&row[team_i]]),
        );
        let (Some(race_id), Some(season_id), Some(team_id)) = resolved else {
            dropped += 1;
            debug!(year = ?row[year_i], round = season_round, "results row did not resolve against all dimensions");
            continue;
        };

        if !seen.insert((driver_id, race_id)) {
            return Err(PipelineError::InvariantViolation(format!(
                "duplicate (driver, race) fact: driver_id={driver_id} race_id={race_id}"
            )));
        }

        let fact_id = table.row_count() as i64 + 1;
        table.push_row(vec![
            Value::Int(fact_id),
            Value::Int(race_id),
            Value::Int(season_id),
            Value::Int(driver_id),
            Value::Int(team_id),
            round,
            row[grid_i].clone(),
            row[position_i].clone(),
            row[finish_i].clone(),
            row[event_i].clone(),
        ])?;
    }

    info!(
        facts = table.row_count(),
        dropped, "built fact_driver_results"
    );
    Ok(table)
}
