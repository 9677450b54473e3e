use csv::{Reader, ReaderBuilder};
use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use tracing::{debug, warn};

use crate::error::{Result, TeeSheetError};
use crate::roster::{ExtractedPlayer, Guest, TimePreference};

/// Splits a `;`-separated guest column. Blank entries are dropped.
fn parse_guests(value: &str) -> Vec<Guest> {
    value
        .split(';')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(Guest::parse)
        .collect()
}

/// Reads an extracted roster from CSV with `name`, `guests` and
/// `preference` columns, in signup order.
///
/// Rows without a name are skipped; a repeated name keeps its first row.
pub fn parse_roster<R: Read>(reader: R) -> Result<Vec<ExtractedPlayer>> {
    let mut reader = ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);
    read_players(&mut reader)
}

/// Loads an extracted roster from a CSV file
pub fn load_roster<P: AsRef<Path>>(csv_path: P) -> Result<Vec<ExtractedPlayer>> {
    let mut reader = ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(csv_path)?;
    read_players(&mut reader)
}

fn read_players<R: Read>(reader: &mut Reader<R>) -> Result<Vec<ExtractedPlayer>> {
    let headers = reader.headers()?.clone();
    let column = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));
    let name_col = column("name").unwrap_or(0);
    let guests_col = column("guests");
    let preference_col = column("preference");

    let mut seen = HashSet::new();
    let mut players = Vec::new();

    for (row, result) in reader.records().enumerate() {
        let record = result?;
        // header is line 1
        let line = row + 2;

        let name = record.get(name_col).unwrap_or("").trim();
        if name.is_empty() {
            debug!(line, "Skipping row without a name");
            continue;
        }
        if !seen.insert(name.to_lowercase()) {
            warn!(line, name, "Duplicate name in roster; keeping the first");
            continue;
        }

        let guests = guests_col
            .and_then(|c| record.get(c))
            .map(parse_guests)
            .unwrap_or_default();
        let preference = match preference_col.and_then(|c| record.get(c)) {
            Some(value) => TimePreference::parse(value).map_err(|_| {
                TeeSheetError::InvalidInput(format!(
                    "line {}: unknown time preference '{}' for {}",
                    line, value, name
                ))
            })?,
            None => None,
        };

        let mut player = ExtractedPlayer::new(name).with_guests(guests);
        if let Some(preference) = preference {
            player = player.with_preference(preference);
        }
        players.push(player);
    }

    debug!(players = players.len(), "Parsed roster");
    Ok(players)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_roster() {
        let csv = "\
name,guests,preference
Dave,Tom;+1,early
Ann,,
 Bob ,guest,Late
";
        let players = parse_roster(csv.as_bytes()).unwrap();
        assert_eq!(players.len(), 3);
        assert_eq!(players[0].name, "Dave");
        assert_eq!(players[0].guests, vec![Guest::named("Tom"), Guest::anonymous()]);
        assert_eq!(players[0].preference, Some(TimePreference::Early));
        assert!(players[1].guests.is_empty());
        assert_eq!(players[1].preference, None);
        assert_eq!(players[2].name, "Bob");
        assert_eq!(players[2].guests, vec![Guest::anonymous()]);
        assert_eq!(players[2].preference, Some(TimePreference::Late));
    }

    #[test]
    fn test_blank_and_duplicate_names_skipped() {
        let csv = "name,guests,preference\n,,\nAnn,,\nann,Tom,\nBob,,\n";
        let players = parse_roster(csv.as_bytes()).unwrap();
        let names: Vec<&str> = players.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Ann", "Bob"]);
        assert!(players[0].guests.is_empty());
    }

    #[test]
    fn test_bad_preference_names_the_row() {
        let csv = "name,guests,preference\nAnn,,\nBob,,noon\n";
        let err = parse_roster(csv.as_bytes()).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("line 3"), "{}", message);
        assert!(message.contains("Bob"));
    }

    #[test]
    fn test_name_only_file() {
        let players = parse_roster("name\nAnn\nBob\n".as_bytes()).unwrap();
        assert_eq!(players.len(), 2);
        assert!(players.iter().all(|p| p.guests.is_empty() && p.preference.is_none()));
    }

    #[test]
    fn test_load_roster_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roster.csv");
        std::fs::write(&path, "name,guests,preference\nAnn,,early\n").unwrap();
        let players = load_roster(&path).unwrap();
        assert_eq!(players[0].preference, Some(TimePreference::Early));
    }
}
