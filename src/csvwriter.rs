//! Appends assembled feature tables to CSV files. Weeks are merged by
//! appending in week order; the header is written once, when the file is
//! still empty.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::tables::FeatureTable;

#[derive(Debug)]
pub struct CsvWriter {
    path: PathBuf,
    separator: String,
}

impl CsvWriter {
    pub fn from_path(path: &Path) -> CsvWriter {
        CsvWriter {
            path: PathBuf::from(path),
            separator: String::from(","),
        }
    }

    /// Appends every row of `table`. An empty table writes nothing, not even
    /// a header.
    pub fn write_table(&mut self, table: &FeatureTable) -> Result<(), std::io::Error> {
        if table.is_empty() {
            return Ok(());
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        if file.metadata()?.len() == 0 {
            let header = self.vec_to_string_sep(&table.names).unwrap_or_default() + "\n";
            file.write_all(header.as_bytes())?;
        }
        let mut body = String::new();
        for row in &table.rows {
            if let Some(line) = self.vec_to_string_sep(row) {
                body += &line;
                body += "\n";
            }
        }
        file.write_all(body.as_bytes())?;
        Ok(())
    }

    fn vec_to_string_sep<T: std::fmt::Display>(&self, v: &[T]) -> Option<String> {
        let vlen = v.len();
        if vlen == 0 {
            None
        } else {
            let mut res = String::new();
            for vi in v.iter().take(vlen - 1) {
                res += &*(vi.to_string() + &self.separator);
            }
            res += &*v[vlen - 1].to_string();
            Some(res)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FeatureTable {
        let mut t = FeatureTable::new(vec!["a".to_string(), "b".to_string()]);
        t.push_values(vec![1.0, 2.5]).unwrap();
        t
    }

    #[test]
    fn header_written_once() {
        let path = std::env::temp_dir().join("certgrid_csvwriter_test.csv");
        let _ = fs::remove_file(&path);
        let mut w = CsvWriter::from_path(&path);
        w.write_table(&sample()).unwrap();
        w.write_table(&sample()).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "a,b\n1,2.5\n1,2.5\n");
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn empty_table_writes_nothing() {
        let path = std::env::temp_dir().join("certgrid_csvwriter_empty.csv");
        let _ = fs::remove_file(&path);
        let mut w = CsvWriter::from_path(&path);
        w.write_table(&FeatureTable::new(Vec::new())).unwrap();
        assert!(!path.exists());
    }
}
