//! Retype map construction from command-line assignments and YAML files.
//!
//! A map file lists target types per column:
//!
//! ```yaml
//! columns:
//!   Opened: datetime
//!   Profit/Loss: float
//! ```
//!
//! Labels are passed through [`normalize_label`] so either the raw or the
//! cleaned spelling may be used.

use std::{fs::File, io::BufReader, path::Path, str::FromStr};

use anyhow::{Context, Result, anyhow};
use itertools::Itertools;
use serde::Deserialize;

use crate::{
    dataset::Table,
    normalize::{ColumnKind, classify_column, normalize_label},
};

/// Ordered column → target assignments for one retype pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetypeMap {
    entries: Vec<(String, ColumnKind)>,
}

#[derive(Debug, Deserialize)]
struct RetypeMapFile {
    // Mapping keeps the file's order.
    #[serde(default)]
    columns: serde_yaml::Mapping,
}

impl RetypeMap {
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, ColumnKind)>,
        S: Into<String>,
    {
        let mut map = RetypeMap::default();
        for (label, kind) in pairs {
            map.set(label, kind);
        }
        map
    }

    /// Every column of `table` mapped to its current classification.
    /// Labels shared by several columns are left out, since one entry
    /// cannot carry each column's own kind.
    pub fn with_current_kinds(table: &Table) -> Self {
        let counts = table.columns().iter().map(|c| c.label.as_str()).counts();
        RetypeMap::from_pairs(
            table
                .columns()
                .iter()
                .filter(|c| counts.get(c.label.as_str()) == Some(&1))
                .map(|c| (c.label.clone(), classify_column(&c.values))),
        )
    }

    pub fn set(&mut self, label: impl Into<String>, kind: ColumnKind) {
        let label = label.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == label) {
            Some(entry) => entry.1 = kind,
            None => self.entries.push((label, kind)),
        }
    }

    pub fn get(&self, label: &str) -> Option<ColumnKind> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == label)
            .map(|(_, kind)| *kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, ColumnKind)> {
        self.entries.iter().map(|(label, kind)| (label.as_str(), *kind))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Overlays `other` on top of `self`; later assignments win.
    pub fn merge(&mut self, other: &RetypeMap) {
        for (label, kind) in other.iter() {
            self.set(label, kind);
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening retype map {path:?}"))?;
        let parsed: RetypeMapFile = serde_yaml::from_reader(BufReader::new(file))
            .with_context(|| format!("Parsing retype map YAML {path:?}"))?;
        let mut map = RetypeMap::default();
        for (key, value) in &parsed.columns {
            let label = key
                .as_str()
                .ok_or_else(|| anyhow!("Column labels in {path:?} must be strings"))?;
            let token = value
                .as_str()
                .ok_or_else(|| anyhow!("Column '{label}' in {path:?} must name a type"))?;
            let kind = ColumnKind::from_str(token)
                .with_context(|| format!("Column '{label}' in {path:?}"))?;
            map.set(normalize_label(label.trim()), kind);
        }
        Ok(map)
    }

    /// Parses `Label=kind` assignments; each argument may hold a
    /// comma-separated list.
    pub fn parse_assignments(specs: &[String]) -> Result<Self> {
        let mut map = RetypeMap::default();
        for spec in specs
            .iter()
            .flat_map(|s| s.split(','))
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            let (label, token) = spec
                .rsplit_once('=')
                .ok_or_else(|| anyhow!("Type assignment '{spec}' must look like column=type"))?;
            let label = label.trim();
            if label.is_empty() {
                return Err(anyhow!("Type assignment '{spec}' is missing a column"));
            }
            let kind = ColumnKind::from_str(token)
                .with_context(|| format!("Type assignment '{spec}'"))?;
            map.set(normalize_label(label), kind);
        }
        Ok(map)
    }

    /// Loads the optional map file and overlays command-line assignments.
    pub fn resolve(map_path: Option<&Path>, assignments: &[String]) -> Result<Self> {
        let mut map = match map_path {
            Some(path) => RetypeMap::load(path)?,
            None => RetypeMap::default(),
        };
        map.merge(&RetypeMap::parse_assignments(assignments)?);
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;
    use crate::{data::Value, dataset::Column};

    #[test]
    fn parse_assignments_normalizes_labels_and_accepts_lists() {
        let map = RetypeMap::parse_assignments(&[
            "Profit/Loss=float,Opened=datetime64".to_string(),
            "Qty (Shares)=int".to_string(),
        ])
        .unwrap();
        assert_eq!(map.get("Profit_Loss"), Some(ColumnKind::Float));
        assert_eq!(map.get("Opened"), Some(ColumnKind::DateTime));
        assert_eq!(map.get("Qty_Shares"), Some(ColumnKind::Integer));
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn parse_assignments_rejects_malformed_input() {
        assert!(RetypeMap::parse_assignments(&["Opened".to_string()]).is_err());
        assert!(RetypeMap::parse_assignments(&["=float".to_string()]).is_err());
        assert!(RetypeMap::parse_assignments(&["Opened=bool".to_string()]).is_err());
    }

    #[test]
    fn set_replaces_in_place_and_keeps_order() {
        let mut map = RetypeMap::from_pairs([
            ("a", ColumnKind::Integer),
            ("b", ColumnKind::Float),
        ]);
        map.set("a", ColumnKind::Text);
        let entries = map.iter().collect::<Vec<_>>();
        assert_eq!(
            entries,
            vec![("a", ColumnKind::Text), ("b", ColumnKind::Float)]
        );
    }

    #[test]
    fn resolve_lets_flags_override_file() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("types.yml");
        fs::write(
            &path,
            "columns:\n  Opened: datetime\n  Profit/Loss: string\n",
        )
        .expect("write map");
        let map = RetypeMap::resolve(Some(&path), &["Profit_Loss=float".to_string()]).unwrap();
        assert_eq!(map.get("Opened"), Some(ColumnKind::DateTime));
        assert_eq!(map.get("Profit_Loss"), Some(ColumnKind::Float));
    }

    #[test]
    fn load_reports_bad_type_with_column_context() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("types.yml");
        fs::write(&path, "columns:\n  Opened: sometimes\n").expect("write map");
        let err = RetypeMap::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("Column 'Opened'"));
    }

    #[test]
    fn with_current_kinds_preselects_classification() {
        let table = Table::new(vec![
            Column::new("Qty", vec![Value::Integer(1)]),
            Column::new("Symbol", vec![Value::Text("MSFT".into())]),
        ])
        .unwrap();
        let map = RetypeMap::with_current_kinds(&table);
        assert_eq!(map.get("Qty"), Some(ColumnKind::Integer));
        assert_eq!(map.get("Symbol"), Some(ColumnKind::Text));
    }

    #[test]
    fn load_keeps_file_order() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("types.yml");
        fs::write(
            &path,
            "columns:\n  Symbol: string\n  Opened: datetime\n  Amount: float\n",
        )
        .expect("write map");
        let map = RetypeMap::load(&path).unwrap();
        let labels = map.iter().map(|(label, _)| label).collect::<Vec<_>>();
        assert_eq!(labels, vec!["Symbol", "Opened", "Amount"]);
    }

    #[test]
    fn load_rejects_non_string_types() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("types.yml");
        fs::write(&path, "columns:\n  Opened: 3\n").expect("write map");
        let err = RetypeMap::load(&path).unwrap_err();
        assert!(err.to_string().contains("must name a type"));
    }

    #[test]
    fn with_current_kinds_skips_colliding_labels() {
        let table = Table::new(vec![
            Column::new("a_b", vec![Value::Integer(1)]),
            Column::new("a_b", vec![Value::Text("x".into())]),
            Column::new("Qty", vec![Value::Integer(2)]),
        ])
        .unwrap();
        let map = RetypeMap::with_current_kinds(&table);
        assert_eq!(map.get("a_b"), None);
        assert_eq!(map.get("Qty"), Some(ColumnKind::Integer));
        assert_eq!(map.len(), 1);
    }
}
