//! Corpus reader: parses the five raw activity CSVs with the column layout the
//! selected release fixes, merges them chronologically and slices the merged
//! stream into per-week tables.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use chrono::NaiveDateTime;
use log::warn;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

use crate::merge::KwayMerge;
use crate::schema::{ActivityKind, SchemaVersion};
use crate::timeutil::{self, FormatError, TimeAnchors};

/// One raw audit event, as read from its source CSV. Fields a layout does not
/// carry stay empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: String,
    pub date: NaiveDateTime,
    pub user: String,
    pub pc: String,
    pub kind: ActivityKind,
    pub activity: String,
    pub url_fname: String,
    pub content: String,
    pub to: String,
    pub cc: String,
    pub bcc: String,
    pub from: String,
    pub size: i64,
    pub n_att: i64,
    pub att: String,
}

impl ActivityRecord {
    pub fn epoch(&self) -> i64 {
        timeutil::epoch(self.date)
    }
}

#[derive(Debug)]
pub enum IngestError {
    Io(std::io::Error),
    Format(FormatError),
    SchemaMismatch {
        file: String,
        expected: usize,
        got: usize,
    },
}

impl Display for IngestError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestError::Io(e) => write!(f, "io error: {e}"),
            IngestError::Format(e) => write!(f, "{e}"),
            IngestError::SchemaMismatch {
                file,
                expected,
                got,
            } => write!(
                f,
                "schema mismatch in {file}: expected {expected} columns, got {got} (wrong dataset version?)"
            ),
        }
    }
}

impl Error for IngestError {}

impl From<std::io::Error> for IngestError {
    fn from(e: std::io::Error) -> Self {
        IngestError::Io(e)
    }
}

impl From<FormatError> for IngestError {
    fn from(e: FormatError) -> Self {
        IngestError::Format(e)
    }
}

/// Split one CSV line into fields, honouring double-quoted fields (the r6
/// email/file/http content column may contain commas and newlines).
pub fn split_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    for c in line.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    fields.push(field);
    fields
}

fn parse_record(
    line: &str,
    kind: ActivityKind,
    version: SchemaVersion,
    file: &str,
) -> Result<ActivityRecord, IngestError> {
    let layout = kind.raw_columns(version);
    let mut fields = split_fields(line.trim_end_matches(['\r', '\n']));
    if fields.len() < layout.len() {
        return Err(IngestError::SchemaMismatch {
            file: file.to_string(),
            expected: layout.len(),
            got: fields.len(),
        });
    }
    // An unquoted trailing content field may itself contain commas; the
    // content column is last in every layout.
    if fields.len() > layout.len() {
        let tail = fields.split_off(layout.len() - 1).join(",");
        fields.push(tail);
    }

    let mut rec = ActivityRecord {
        id: String::new(),
        date: NaiveDateTime::default(),
        user: String::new(),
        pc: String::new(),
        kind,
        activity: String::new(),
        url_fname: String::new(),
        content: String::new(),
        to: String::new(),
        cc: String::new(),
        bcc: String::new(),
        from: String::new(),
        size: 0,
        n_att: 0,
        att: String::new(),
    };
    for (col, value) in layout.iter().zip(fields) {
        match *col {
            "id" => rec.id = value,
            "date" => rec.date = timeutil::parse_datetime(&value)?,
            "user" => rec.user = value,
            "pc" => rec.pc = value,
            "activity" => rec.activity = value,
            "url/fname" => rec.url_fname = value,
            "content" => rec.content = value,
            "to" => rec.to = value,
            "cc" => rec.cc = value,
            "bcc" => rec.bcc = value,
            "from" => rec.from = value,
            "size" => {
                rec.size = value.trim().parse().map_err(|_| {
                    IngestError::Format(FormatError { input: value.clone() })
                })?
            }
            "#att" => {
                rec.n_att = value.trim().parse().map_err(|_| {
                    IngestError::Format(FormatError { input: value.clone() })
                })?
            }
            "att" => rec.att = value,
            _ => {}
        }
    }
    Ok(rec)
}

/// Read one activity CSV in full. Records that fail to parse are skipped with
/// a warning; a column-count mismatch aborts the read, since it means the
/// wrong dataset version was selected.
pub fn read_activity_file(
    path: &Path,
    kind: ActivityKind,
    version: SchemaVersion,
) -> Result<Vec<ActivityRecord>, IngestError> {
    let fname = path.display().to_string();
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut records = Vec::new();
    let mut skipped = 0usize;
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if lineno == 0 || line.is_empty() {
            continue;
        }
        match parse_record(&line, kind, version, &fname) {
            Ok(rec) => records.push(rec),
            Err(e @ IngestError::SchemaMismatch { .. }) => return Err(e),
            Err(e) => {
                warn!("{fname}:{}: skipping record: {e}", lineno + 1);
                skipped += 1;
            }
        }
    }
    if skipped > 0 {
        warn!("{fname}: skipped {skipped} unparseable records");
    }
    Ok(records)
}

/// The corpus merged chronologically and grouped by week number.
pub struct WeekStream {
    pub anchors: TimeAnchors,
    merged: std::vec::IntoIter<ActivityRecord>,
    pending: Option<ActivityRecord>,
}

impl WeekStream {
    /// Opens the five per-type CSVs under `dir`. Each file is expected to be
    /// timestamp-sorted; the merge keys on epoch seconds and breaks ties in
    /// file order.
    pub fn open(dir: &Path, version: SchemaVersion) -> Result<WeekStream, IngestError> {
        let mut sources = Vec::new();
        for kind in ActivityKind::iter() {
            let records = read_activity_file(&dir.join(kind.csv_name()), kind, version)?;
            sources.push(records.into_iter());
        }
        let merged: Vec<ActivityRecord> =
            KwayMerge::new(sources, |r: &ActivityRecord| r.epoch()).collect();
        let first = merged
            .first()
            .map(|r| r.date)
            .unwrap_or_default();
        Ok(WeekStream {
            anchors: TimeAnchors::from_first(first),
            merged: merged.into_iter(),
            pending: None,
        })
    }
}

impl Iterator for WeekStream {
    type Item = (i64, Vec<ActivityRecord>);

    fn next(&mut self) -> Option<Self::Item> {
        let first = self.pending.take().or_else(|| self.merged.next())?;
        let week = self.anchors.week_of(first.date);
        let mut week_records = vec![first];
        for rec in self.merged.by_ref() {
            if self.anchors.week_of(rec.date) == week {
                week_records.push(rec);
            } else {
                self.pending = Some(rec);
                break;
            }
        }
        Some((week, week_records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoted_content_keeps_commas() {
        let fields = split_fields("{X1-A},01/04/2010 08:00:00,AAA0001,PC-1,\"hello, world\"");
        assert_eq!(fields.len(), 5);
        assert_eq!(fields[4], "hello, world");
    }

    #[test]
    fn logon_line_parses() {
        let rec = parse_record(
            "{L1},01/04/2010 08:17:00,AAA0001,PC-3812,Logon",
            ActivityKind::Logon,
            SchemaVersion::R4_2,
            "logon.csv",
        )
        .unwrap();
        assert_eq!(rec.id, "{L1}");
        assert_eq!(rec.user, "AAA0001");
        assert_eq!(rec.activity, "Logon");
    }

    #[test]
    fn email_layout_enforced() {
        // An r5-shape email row read under r4 rules has too few columns once
        // the r4 layout expects #att where r5 put the activity.
        let short = parse_record(
            "{E1},01/04/2010 08:17:00,AAA0001,PC-1,b@dtaa.com",
            ActivityKind::Email,
            SchemaVersion::R4_2,
            "email.csv",
        );
        assert!(matches!(short, Err(IngestError::SchemaMismatch { .. })));
    }

    #[test]
    fn bad_date_is_a_format_error() {
        let bad = parse_record(
            "{L1},2010-01-04 08:17,AAA0001,PC-1,Logon",
            ActivityKind::Logon,
            SchemaVersion::R4_2,
            "logon.csv",
        );
        assert!(matches!(bad, Err(IngestError::Format(_))));
    }

    #[test]
    fn week_stream_groups_by_week() {
        let mk = |date: &str| ActivityRecord {
            id: String::from("{X}"),
            date: timeutil::parse_datetime(date).unwrap(),
            user: String::from("AAA0001"),
            pc: String::from("PC-1"),
            kind: ActivityKind::Logon,
            activity: String::from("Logon"),
            url_fname: String::new(),
            content: String::new(),
            to: String::new(),
            cc: String::new(),
            bcc: String::new(),
            from: String::new(),
            size: 0,
            n_att: 0,
            att: String::new(),
        };
        let records = vec![
            mk("01/02/2010 08:00:00"),
            mk("01/05/2010 08:00:00"),
            mk("01/09/2010 08:00:00"),
            mk("01/20/2010 08:00:00"),
        ];
        let stream = WeekStream {
            anchors: TimeAnchors::from_first(records[0].date),
            merged: records.into_iter(),
            pending: None,
        };
        let weeks: Vec<(i64, usize)> = stream.map(|(w, rs)| (w, rs.len())).collect();
        assert_eq!(weeks, vec![(0, 2), (1, 1), (2, 1)]);
    }

    #[test]
    fn unquoted_comma_tail_folds_into_content() {
        let rec = parse_record(
            "{H1},01/04/2010 09:00:00,AAA0001,PC-1,http://example.org/a,one two,three",
            ActivityKind::Http,
            SchemaVersion::R4_2,
            "http.csv",
        )
        .unwrap();
        assert_eq!(rec.content, "one two,three");
    }
}
