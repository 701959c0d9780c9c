use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use log::info;
use serde_json::Value;

use super::flatten::{cell_text, flatten_rows};
use super::{EventDataset, StatsError};
use crate::core::table::write_table;

/// `<base>/<event>` when refreshing an earlier export in place, otherwise a
/// fresh `<base>/<event>_<YYYYmmdd_HHMMSS>`.
pub fn event_output_dir(base: &Path, event_key: &str, update_existing: bool) -> PathBuf {
    if update_existing {
        base.join(event_key)
    } else {
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        base.join(format!("{}_{}", event_key, stamp))
    }
}

/// 把事件数据集的每个非空分区写成 `<section>.csv`
pub fn convert_to_csv(
    dataset: &EventDataset,
    output_dir: &Path,
) -> Result<Vec<PathBuf>, StatsError> {
    fs::create_dir_all(output_dir)?;

    let mut written = Vec::new();
    for (name, value) in dataset.sections() {
        let Some(value) = value.filter(|v| !is_blank(v)) else {
            continue;
        };

        let path = output_dir.join(format!("{}.csv", name));
        match value {
            Value::Object(map) if name == "rankings" && map.contains_key("rankings") => {
                rankings_to_csv(value, &path)?
            }
            Value::Array(items) => array_to_csv(items, &path)?,
            Value::Object(_) => single_object_to_csv(value, &path)?,
            other => array_to_csv(std::slice::from_ref(other), &path)?,
        }
        info!("📄 Wrote {}", path.display());
        written.push(path);
    }

    Ok(written)
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Keys as the header row, values as the only data row.
pub fn single_object_to_csv(value: &Value, path: &Path) -> Result<(), StatsError> {
    let (header, row): (Vec<String>, Vec<String>) = match value.as_object() {
        Some(map) => map.iter().map(|(k, v)| (k.clone(), cell_text(v))).unzip(),
        None => (vec!["value".to_string()], vec![cell_text(value)]),
    };
    write_table(path, &header, &[row])?;
    Ok(())
}

/// Flattened rows under the sorted union of every row's columns.
pub fn array_to_csv(items: &[Value], path: &Path) -> Result<(), StatsError> {
    let (header, rows) = flatten_rows(items);
    write_table(path, &header, &rows)?;
    Ok(())
}

/// TBA rankings: positional `extra_stats` / `sort_orders` arrays become named
/// `extra_<name>` / `sort_<name>` columns.
pub fn rankings_to_csv(value: &Value, path: &Path) -> Result<(), StatsError> {
    let empty = Vec::new();
    let rankings = value
        .get("rankings")
        .and_then(Value::as_array)
        .unwrap_or(&empty);
    let extra_names = info_names(value.get("extra_stats_info"));
    let sort_names = info_names(value.get("sort_order_info"));

    let mut rows: Vec<BTreeMap<String, String>> = Vec::with_capacity(rankings.len());
    for ranking in rankings {
        let Some(map) = ranking.as_object() else {
            continue;
        };
        let mut row = BTreeMap::new();
        for (key, v) in map {
            match key.as_str() {
                "extra_stats" => expand_named(&mut row, "extra", &extra_names, v),
                "sort_orders" => expand_named(&mut row, "sort", &sort_names, v),
                _ => {
                    row.insert(key.clone(), cell_text(v));
                }
            }
        }
        rows.push(row);
    }

    let mut header: Vec<String> = rows
        .iter()
        .flat_map(|r| r.keys().cloned())
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .collect();
    // named columns exist even when every value is missing
    if rankings.first().is_some_and(|r| r.get("extra_stats").is_some()) {
        header.extend(extra_names.iter().map(|n| format!("extra_{}", n)));
    }
    if rankings.first().is_some_and(|r| r.get("sort_orders").is_some()) {
        header.extend(sort_names.iter().map(|n| format!("sort_{}", n)));
    }
    header.sort();
    header.dedup();

    let table: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            header
                .iter()
                .map(|col| row.get(col).cloned().unwrap_or_default())
                .collect()
        })
        .collect();

    write_table(path, &header, &table)?;
    Ok(())
}

fn info_names(info: Option<&Value>) -> Vec<String> {
    info.and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|i| i.get("name").and_then(Value::as_str))
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

fn expand_named(
    row: &mut BTreeMap<String, String>,
    prefix: &str,
    names: &[String],
    values: &Value,
) {
    let Some(values) = values.as_array() else {
        return;
    };
    for (name, v) in names.iter().zip(values) {
        row.insert(format!("{}_{}", prefix, name), cell_text(v));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn read_lines(path: &Path) -> Vec<String> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_convert_writes_one_file_per_non_empty_section() {
        let dir = tempdir().unwrap();
        let mut data = EventDataset::new("2025mimil");
        data.push("event_info", Some(json!({"key": "2025mimil", "year": 2025})));
        let teams = json!([{"team_number": 33}, {"team_number": 67, "nickname": "HOT"}]);
        data.push("teams", Some(teams));
        data.push("alliances", None);
        data.push("match_details", Some(json!([])));

        let files = convert_to_csv(&data, dir.path()).unwrap();
        assert_eq!(files.len(), 2);

        let info = read_lines(&dir.path().join("event_info.csv"));
        assert_eq!(info, vec!["key,year", "2025mimil,2025"]);

        let teams = read_lines(&dir.path().join("teams.csv"));
        assert_eq!(teams, vec!["nickname,team_number", ",33", "HOT,67"]);
        assert!(!dir.path().join("alliances.csv").exists());
    }

    #[test]
    fn test_event_output_dir() {
        let base = Path::new("exports");
        assert_eq!(event_output_dir(base, "2025mimil", true), base.join("2025mimil"));

        let fresh = event_output_dir(base, "2025mimil", false);
        let name = fresh.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("2025mimil_"));
        assert_eq!(name.len(), "2025mimil_".len() + "20250101_120000".len());
        assert_eq!(fresh.parent(), Some(base));
    }

    #[test]
    fn test_rankings_named_columns() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rankings.csv");
        let rankings = json!({
            "extra_stats_info": [{"name": "Total Ranking Points", "precision": 0}],
            "sort_order_info": [
                {"name": "Ranking Score", "precision": 2},
                {"name": "Avg Coop", "precision": 2},
            ],
            "rankings": [
                {"rank": 1, "team_key": "frc33", "extra_stats": [42], "sort_orders": [3.5, 1.0]},
                {"rank": 2, "team_key": "frc67", "extra_stats": [40], "sort_orders": [3.2]},
            ],
        });

        rankings_to_csv(&rankings, &path).unwrap();
        let lines = read_lines(&path);
        assert_eq!(
            lines[0],
            "extra_Total Ranking Points,rank,sort_Avg Coop,sort_Ranking Score,team_key"
        );
        assert_eq!(lines[1], "42,1,1.0,3.5,frc33");
        assert_eq!(lines[2], "40,2,,3.2,frc67");
    }
}
