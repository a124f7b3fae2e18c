//! The molecule read-count table.
//!
//! Each row is a unique molecule identified by (library, cell barcode, UMI,
//! candidate sequence) with the number of raw reads collapsing to that key.
//! Tables are read from and written to plain TSV; grouped re-aggregation sums
//! reads over a configurable set of keys.

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result, anyhow};
use itertools::Itertools;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

/// One unique molecule and its read count.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadRecord {
    pub library: String,
    pub cell_bc: String,
    pub umi: String,
    pub clone_id: String,
    pub read: u64,
}

impl ReadRecord {
    /// Cell id: the cell barcode qualified by its library, so that barcode
    /// collisions across libraries stay distinct cells.
    pub fn cell_id(&self) -> String {
        format!("{}_{}", self.library, self.cell_bc)
    }

    pub fn field(&self, key: GroupKey) -> String {
        match key {
            GroupKey::Library => self.library.clone(),
            GroupKey::CellId => self.cell_id(),
            GroupKey::CellBc => self.cell_bc.clone(),
            GroupKey::CloneId => self.clone_id.clone(),
            GroupKey::Umi => self.umi.clone(),
        }
    }

    pub fn target(&self, target: TargetField) -> &str {
        match target {
            TargetField::CloneId => &self.clone_id,
            TargetField::CellBc => &self.cell_bc,
        }
    }

    pub fn set_target(&mut self, target: TargetField, value: String) {
        match target {
            TargetField::CloneId => self.clone_id = value,
            TargetField::CellBc => self.cell_bc = value,
        }
    }
}

/// Field that sequence denoising corrects.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetField {
    #[default]
    CloneId,
    CellBc,
}

impl TargetField {
    pub fn name(&self) -> &'static str {
        match self {
            TargetField::CloneId => "clone_id",
            TargetField::CellBc => "cell_bc",
        }
    }

    pub fn as_group_key(&self) -> GroupKey {
        match self {
            TargetField::CloneId => GroupKey::CloneId,
            TargetField::CellBc => GroupKey::CellBc,
        }
    }
}

impl fmt::Display for TargetField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TargetField {
    type Err = String;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "clone_id" => Ok(TargetField::CloneId),
            "cell_bc" => Ok(TargetField::CellBc),
            _ => Err(format!("`{name}` is not a denoising target (clone_id, cell_bc)")),
        }
    }
}

/// Grouping key for table aggregation and per-partition denoising.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupKey {
    Library,
    CellId,
    CellBc,
    CloneId,
    Umi,
}

impl GroupKey {
    pub fn name(&self) -> &'static str {
        match self {
            GroupKey::Library => "library",
            GroupKey::CellId => "cell_id",
            GroupKey::CellBc => "cell_bc",
            GroupKey::CloneId => "clone_id",
            GroupKey::Umi => "umi",
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for GroupKey {
    type Err = String;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "library" => Ok(GroupKey::Library),
            "cell_id" => Ok(GroupKey::CellId),
            "cell_bc" => Ok(GroupKey::CellBc),
            "clone_id" => Ok(GroupKey::CloneId),
            "umi" => Ok(GroupKey::Umi),
            _ => Err(format!(
                "`{name}` is not a grouping key (library, cell_id, cell_bc, clone_id, umi)"
            )),
        }
    }
}

/// One row of an aggregated table: the grouping-key values (aligned with the
/// key list used to build it), the summed read count, and optionally the
/// number of distinct UMIs in the group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupedRow {
    pub keys: Vec<String>,
    pub read: u64,
    pub umi_count: Option<u64>,
}

/// Aggregate records over the given keys, summing read counts.
///
/// When `count_umi` is set and `umi` is not itself a grouping key, each row
/// additionally reports the number of distinct UMIs in its group. Rows are
/// returned sorted by their key values.
pub fn group_reads(records: &[ReadRecord], group_keys: &[GroupKey], count_umi: bool) -> Vec<GroupedRow> {
    let with_umi_count = count_umi && !group_keys.contains(&GroupKey::Umi);

    let mut groups: FxHashMap<Vec<String>, (u64, FxHashSet<&str>)> = FxHashMap::default();
    for record in records {
        let keys: Vec<String> = group_keys.iter().map(|&key| record.field(key)).collect();
        let entry = groups.entry(keys).or_default();
        entry.0 += record.read;
        if with_umi_count {
            entry.1.insert(record.umi.as_str());
        }
    }

    groups
        .into_iter()
        .map(|(keys, (read, umis))| GroupedRow {
            keys,
            read,
            umi_count: with_umi_count.then(|| umis.len() as u64),
        })
        .sorted_by(|a, b| a.keys.cmp(&b.keys))
        .collect()
}

/// Parse a TSV read-count table.
///
/// The header names the columns; `read` and at least one sequence column are
/// required, while absent grouping columns default to empty values. Comment
/// lines starting with `#` are skipped. A derived `cell_id` column is ignored
/// on input since it is recomputed from library and cell barcode.
pub fn read_reads_table(file_path: &Path) -> Result<Vec<ReadRecord>> {
    let file = File::open(file_path)
        .context(format!("Failed to open {}", file_path.display()))?;
    let reader = BufReader::new(file);

    let mut lines = reader.lines();
    let header = loop {
        match lines.next() {
            Some(line) => {
                let line = line?;
                if line.starts_with('#') || line.trim().is_empty() {
                    continue;
                }
                break line;
            }
            None => return Ok(Vec::new()),
        }
    };

    let columns: Vec<&str> = header.trim().split('\t').collect();
    let column = |name: &str| columns.iter().position(|&c| c == name);

    let read_col = column("read")
        .ok_or_else(|| anyhow!("Read table is missing the required `read` column"))?;
    let library_col = column("library");
    let cell_bc_col = column("cell_bc");
    let umi_col = column("umi");
    let clone_id_col = column("clone_id");

    if cell_bc_col.is_none() && clone_id_col.is_none() {
        return Err(anyhow!(
            "Read table must have at least one sequence column (cell_bc or clone_id)"
        ));
    }

    let mut records = Vec::new();
    for line in lines {
        let line = line?;
        if line.starts_with('#') || line.trim().is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.trim_end_matches('\n').split('\t').collect();
        if fields.len() != columns.len() {
            return Err(anyhow!(
                "Invalid TSV row: expected {} columns, found {}",
                columns.len(),
                fields.len()
            ));
        }

        let get = |col: Option<usize>| col.map_or(String::new(), |i| fields[i].to_string());
        let read: u64 = fields[read_col]
            .parse()
            .context(format!("Invalid read count `{}`", fields[read_col]))?;

        records.push(ReadRecord {
            library: get(library_col),
            cell_bc: get(cell_bc_col),
            umi: get(umi_col),
            clone_id: get(clone_id_col),
            read,
        });
    }

    Ok(records)
}

/// Write an aggregated table as TSV, one column per grouping key.
pub fn write_grouped_table(
    file_path: &Path,
    group_keys: &[GroupKey],
    rows: &[GroupedRow],
) -> Result<()> {
    let file = File::create(file_path)
        .context(format!("Failed to create {}", file_path.display()))?;
    let mut writer = BufWriter::new(file);

    let with_umi_count = rows.iter().any(|row| row.umi_count.is_some());
    let header = group_keys.iter().map(|key| key.name()).join("\t");
    if with_umi_count {
        writeln!(writer, "{header}\tread\tumi_count")?;
    } else {
        writeln!(writer, "{header}\tread")?;
    }

    for row in rows {
        write!(writer, "{}\t{}", row.keys.join("\t"), row.read)?;
        match row.umi_count {
            Some(count) => writeln!(writer, "\t{count}")?,
            None if with_umi_count => writeln!(writer, "\t0")?,
            None => writeln!(writer)?,
        }
    }

    Ok(())
}
