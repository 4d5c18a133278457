//! Turns one week of merged activity records into the fixed-width numeric
//! table every downstream stage consumes. Rows are grouped per user, in user
//! directory order, and each row carries the malicious labels for that week.

use log::warn;
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::ToPrimitive;
use std::collections::HashMap;

use crate::directory::UserDirectory;
use crate::encoders::EventEncoder;
use crate::ingest::ActivityRecord;
use crate::schema::{ActivityKind, SchemaVersion};
use crate::tables::{NumTable, RowMeta, TableError};
use crate::timeutil::{self, TimeAnchors};

/// Numeric code of the `act` column. Logon and device rows take their code
/// from the activity text, the rest from the source file the record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum ActivityCode {
    Logon = 1,
    Logoff = 2,
    Connect = 3,
    Disconnect = 4,
    Http = 5,
    Email = 6,
    File = 7,
}

impl ActivityCode {
    pub fn of(rec: &ActivityRecord) -> ActivityCode {
        match rec.activity.trim() {
            "Logon" => ActivityCode::Logon,
            "Logoff" => ActivityCode::Logoff,
            "Connect" => ActivityCode::Connect,
            "Disconnect" => ActivityCode::Disconnect,
            _ => match rec.kind {
                ActivityKind::Logon => ActivityCode::Logon,
                ActivityKind::Device => ActivityCode::Connect,
                ActivityKind::Http => ActivityCode::Http,
                ActivityKind::Email => ActivityCode::Email,
                ActivityKind::File => ActivityCode::File,
            },
        }
    }

    pub fn code(&self) -> i64 {
        self.to_i64().unwrap_or(0)
    }
}

/// Numericizes one week. `records` must be time-sorted; the output keeps each
/// user's rows contiguous, users in directory index order. Records from users
/// the directory does not know are skipped with a warning.
pub fn numericize_week(
    records: &[ActivityRecord],
    dir: &UserDirectory,
    anchors: &TimeAnchors,
    version: SchemaVersion,
) -> Result<NumTable, TableError> {
    let columns: Vec<String> = version
        .numeric_columns()
        .into_iter()
        .map(String::from)
        .collect();
    let mut table = NumTable::new(columns);
    if records.is_empty() {
        return Ok(table);
    }

    let week_start = records.iter().map(|r| r.date).min().unwrap_or_default();
    let week_end = records.iter().map(|r| r.date).max().unwrap_or_default();

    let mut per_user: HashMap<&str, Vec<&ActivityRecord>> = HashMap::new();
    let mut unknown = 0usize;
    for rec in records {
        if dir.index_of(&rec.user).is_some() {
            per_user.entry(&rec.user).or_default().push(rec);
        } else {
            unknown += 1;
        }
    }
    if unknown > 0 {
        warn!("skipped {unknown} records from users absent from the directory");
    }

    let mut encoder = EventEncoder::new(version);
    for (uidx, profile) in dir.users.iter().enumerate() {
        let Some(stream) = per_user.get(profile.user_id.as_str()) else {
            continue;
        };

        // Scenario label applies to the whole week when the user's malicious
        // window overlaps it.
        let insider = match (profile.mal_start, profile.mal_end) {
            (Some(mstart), Some(mend))
                if profile.scenario > 0 && week_start <= mend && mstart <= week_end =>
            {
                profile.scenario
            }
            _ => 0,
        };

        for (i, rec) in stream.iter().enumerate() {
            let act = ActivityCode::of(rec);

            let mut device_f = vec![0; version.device_width()];
            let mut file_f = vec![0; version.file_width()];
            let mut http_f = vec![0; version.http_width()];
            let mut email_f = vec![0; version.email_width()];
            match act {
                ActivityCode::File => file_f = encoder.file_features(rec),
                ActivityCode::Email => email_f = encoder.email_features(rec),
                ActivityCode::Http => http_f = encoder.http_features(rec),
                ActivityCode::Connect => {
                    let rest: Vec<ActivityRecord> =
                        stream[i + 1..].iter().map(|r| (*r).clone()).collect();
                    device_f = encoder.device_features(rec, &rest);
                }
                _ => {}
            }

            let mal_act = (insider > 0 && profile.mal_acts.contains(&rec.id)) as i64;

            let mut row = vec![
                uidx as i64,
                anchors.day_of(rec.date),
                act.code(),
                dir.pc_relationship(uidx, &rec.pc),
                timeutil::time_bucket(rec.date),
            ];
            row.append(&mut device_f);
            row.append(&mut file_f);
            row.append(&mut http_f);
            row.append(&mut email_f);
            row.push(mal_act);
            row.push(insider);
            table.push_row(
                row,
                RowMeta {
                    act_id: rec.id.clone(),
                    pc: rec.pc.clone(),
                    epoch: rec.epoch(),
                },
            )?;
        }
    }
    Ok(table)
}
