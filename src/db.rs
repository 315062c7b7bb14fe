use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;

use crate::orchestrator::SourceReport;
use crate::record::PlayerRecord;

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS players (
            id                 INTEGER PRIMARY KEY,
            full_name          TEXT NOT NULL,
            club               TEXT NOT NULL,
            nationality        TEXT,
            position           TEXT,
            league             TEXT,
            date_of_birth      TEXT,
            market_value       TEXT,
            goals              INTEGER,
            assists            INTEGER,
            yellow_cards       INTEGER,
            red_cards          INTEGER,
            minutes_played     INTEGER,
            appearances        INTEGER,
            shots_on_target    INTEGER,
            tackles            INTEGER,
            interceptions      INTEGER,
            dribbles_completed INTEGER,
            saves              INTEGER,
            pass_accuracy      REAL,
            rating             REAL,
            height_cm          INTEGER,
            weight_kg          INTEGER,
            injured            BOOLEAN,
            source             TEXT NOT NULL,
            updated_at         TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(full_name, club)
        );
        CREATE INDEX IF NOT EXISTS idx_players_league ON players(league);
        CREATE INDEX IF NOT EXISTS idx_players_source ON players(source);

        CREATE TABLE IF NOT EXISTS runs (
            id          INTEGER PRIMARY KEY,
            source      TEXT NOT NULL,
            records     INTEGER NOT NULL,
            units       INTEGER NOT NULL,
            failed      INTEGER NOT NULL,
            skipped     INTEGER NOT NULL,
            finished_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        ",
    )?;
    Ok(())
}

/// Upsert the merged set; a player already stored under the same
/// `(full_name, club)` is replaced.
pub fn save_players(conn: &Connection, players: &[PlayerRecord]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT OR REPLACE INTO players
             (full_name, club, nationality, position, league, date_of_birth, market_value,
              goals, assists, yellow_cards, red_cards, minutes_played, appearances,
              shots_on_target, tackles, interceptions, dribbles_completed, saves,
              pass_accuracy, rating, height_cm, weight_kg, injured, source)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                     ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24)",
        )?;
        for p in players {
            count += stmt.execute(rusqlite::params![
                p.full_name,
                p.club,
                p.nationality,
                p.position,
                p.league,
                p.date_of_birth,
                p.market_value,
                p.goals,
                p.assists,
                p.yellow_cards,
                p.red_cards,
                p.minutes_played,
                p.appearances,
                p.shots_on_target,
                p.tackles,
                p.interceptions,
                p.dribbles_completed,
                p.saves,
                p.pass_accuracy,
                p.rating,
                p.height_cm,
                p.weight_kg,
                p.injured,
                p.source.as_str(),
            ])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

pub fn record_run(conn: &Connection, reports: &[SourceReport]) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO runs (source, records, units, failed, skipped) VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for r in reports {
            stmt.execute(rusqlite::params![
                r.source.as_str(),
                r.records.len(),
                r.units,
                r.failed_units,
                r.skipped_rows,
            ])?;
        }
    }
    tx.commit()?;
    Ok(())
}

// ── Top players ──

pub struct TopRow {
    pub full_name: String,
    pub club: String,
    pub league: String,
    pub position: String,
    pub goals: Option<u32>,
    pub assists: Option<u32>,
    pub appearances: Option<u32>,
    pub market_value: String,
}

pub fn fetch_top(
    conn: &Connection,
    league: Option<&str>,
    club: Option<&str>,
    limit: usize,
) -> Result<Vec<TopRow>> {
    let mut conditions = Vec::new();
    let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    if let Some(l) = league {
        conditions.push(format!("league = ?{}", params.len() + 1));
        params.push(Box::new(l.to_string()));
    }
    if let Some(c) = club {
        conditions.push(format!("club = ?{}", params.len() + 1));
        params.push(Box::new(c.to_string()));
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    };

    // unreported goals sort after a reported zero
    let sql = format!(
        "SELECT full_name, club, COALESCE(league,''), COALESCE(position,''),
                goals, assists, appearances, COALESCE(market_value,'')
         FROM players{}
         ORDER BY goals IS NULL, goals DESC, full_name
         LIMIT {}",
        where_clause, limit
    );

    let mut stmt = conn.prepare(&sql)?;
    let param_refs: Vec<&dyn rusqlite::types::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let rows = stmt
        .query_map(param_refs.as_slice(), |row| {
            Ok(TopRow {
                full_name: row.get(0)?,
                club: row.get(1)?,
                league: row.get(2)?,
                position: row.get(3)?,
                goals: row.get(4)?,
                assists: row.get(5)?,
                appearances: row.get(6)?,
                market_value: row.get(7)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Stats ──

pub struct Stats {
    pub total: usize,
    pub by_source: Vec<(String, usize)>,
    pub by_league: Vec<(String, usize)>,
    pub last_run: Option<String>,
}

fn grouped(conn: &Connection, column: &str) -> Result<Vec<(String, usize)>> {
    let sql = format!(
        "SELECT COALESCE({col}, '(none)'), COUNT(*) FROM players GROUP BY 1 ORDER BY 2 DESC, 1",
        col = column
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let total: usize = conn.query_row("SELECT COUNT(*) FROM players", [], |r| r.get(0))?;
    let last_run: Option<String> =
        conn.query_row("SELECT MAX(finished_at) FROM runs", [], |r| r.get(0))?;
    Ok(Stats {
        total,
        by_source: grouped(conn, "source")?,
        by_league: grouped(conn, "league")?,
        last_run,
    })
}
