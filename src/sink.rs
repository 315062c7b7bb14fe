use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::record::{PlayerRecord, COLUMNS};

fn needs_quotes(field: &str) -> bool {
    field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r')
}

fn write_row<W: Write, S: AsRef<str>>(w: &mut W, row: &[S]) -> io::Result<()> {
    for (i, cell) in row.iter().enumerate() {
        if i > 0 {
            w.write_all(b",")?;
        }
        let cell = cell.as_ref();
        if needs_quotes(cell) {
            write!(w, "\"{}\"", cell.replace('"', "\"\""))?;
        } else {
            w.write_all(cell.as_bytes())?;
        }
    }
    w.write_all(b"\n")
}

/// Header plus one line per record.
pub fn write_players<W: Write>(w: &mut W, players: &[PlayerRecord]) -> io::Result<()> {
    write_row(w, COLUMNS)?;
    for p in players {
        write_row(w, &p.to_row())?;
    }
    Ok(())
}

/// Writes the CSV once. An empty set writes nothing and returns 0.
pub fn save_csv(path: &Path, players: &[PlayerRecord]) -> Result<usize> {
    if players.is_empty() {
        warn!("No players to save.");
        return Ok(0);
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
    }

    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut w = BufWriter::new(file);
    write_players(&mut w, players)?;
    w.flush()?;

    info!("Saved {} players to {}", players.len(), path.display());
    Ok(players.len())
}
