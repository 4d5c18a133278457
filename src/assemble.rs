//! Builds the per-unit feature tables for one week: one row per (user, week),
//! (user, day) or (user, session), each row carrying identity fields, static
//! user attributes, the aggregated activity features and the scenario label.
//! Session mode can additionally split every session into time- or
//! activity-count subsessions.

use chrono::{Datelike, NaiveTime, Timelike};
use log::warn;

use crate::aggregate::{f_calc, Granularity, UnitFeatures};
use crate::directory::{OrgCatalog, UserDirectory};
use crate::schema::SchemaVersion;
use crate::sessions::{self, Session};
use crate::tables::{FeatureRow, FeatureTable, NumTable, TableError};
use crate::timeutil;

const SESSION_ID_STRIDE: i64 = 100_000;

/// How to carve sessions into subsessions: consecutive `Time` chunks of N
/// minutes, or `Nact` chunks of N activities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubsessionMode {
    Time,
    Nact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubsessionSpec {
    pub mode: SubsessionMode,
    pub param: i64,
}

impl SubsessionSpec {
    /// File-name label, e.g. `time120` or `nact25`.
    pub fn label(&self) -> String {
        match self.mode {
            SubsessionMode::Time => format!("time{}", self.param),
            SubsessionMode::Nact => format!("nact{}", self.param),
        }
    }
}

pub struct Assembler<'a> {
    table: &'a NumTable,
    dir: &'a UserDirectory,
    org: &'a OrgCatalog,
    version: SchemaVersion,
    week: i64,
}

impl<'a> Assembler<'a> {
    pub fn new(
        table: &'a NumTable,
        dir: &'a UserDirectory,
        org: &'a OrgCatalog,
        version: SchemaVersion,
        week: i64,
    ) -> Assembler<'a> {
        Assembler {
            table,
            dir,
            org,
            version,
            week,
        }
    }

    /// Contiguous per-user row ranges, in storage order.
    fn user_blocks(&self) -> Vec<(usize, Vec<usize>)> {
        let mut blocks: Vec<(usize, Vec<usize>)> = Vec::new();
        for row in 0..self.table.len() {
            let user = self.table.value(row, "user") as usize;
            match blocks.last_mut() {
                Some((u, rows)) if *u == user => rows.push(row),
                _ => blocks.push((user, vec![row])),
            }
        }
        blocks
    }

    /// Org-attribute indices, ITAdmin flag and O,C,E,A,N for one user.
    fn user_attributes(&self, user: usize) -> FeatureRow {
        let profile = &self.dir.users[user];
        let mut out = FeatureRow::new();
        for (field, code) in self
            .org
            .fields
            .iter()
            .zip(self.org.user_codes(profile))
        {
            out.push(*field, code as f64);
        }
        out.push("ITAdmin", i64::from(profile.is_it_admin()) as f64);
        for (name, value) in ["O", "C", "E", "A", "N"].iter().zip(profile.ocean) {
            out.push(*name, value);
        }
        out
    }

    fn aggregate(&self, rows: &[usize], mode: Granularity) -> Option<UnitFeatures> {
        match f_calc(self.table, rows, mode, self.version) {
            Ok(unit) => Some(unit),
            Err(e) => {
                warn!("week {}: skipping unit: {e}", self.week);
                None
            }
        }
    }

    /// One row per active user covering the whole week. The window opens at
    /// midnight of the Sunday on or before the user's first activity.
    pub fn week_units(&self) -> Result<FeatureTable, TableError> {
        let mut out = FeatureTable::new(Vec::new());
        for (user, rows) in self.user_blocks() {
            let Some(unit) = self.aggregate(&rows, Granularity::Week) else {
                continue;
            };
            let first = timeutil::from_epoch(self.table.meta[rows[0]].epoch);
            let sunday = first.date()
                - chrono::Duration::days(first.date().weekday().num_days_from_sunday() as i64);
            let start = timeutil::epoch(sunday.and_time(NaiveTime::MIN));
            let end = start + 7 * 24 * 3600;

            let mut row = FeatureRow::new();
            row.push("starttime", start as f64);
            row.push("endtime", end as f64);
            row.push("user", user as f64);
            row.push("week", self.week as f64);
            row.append(self.user_attributes(user));
            row.append(unit.features);
            row.push("insider", unit.label as f64);
            out.push(row)?;
        }
        Ok(out)
    }

    /// One row per (user, day number).
    pub fn day_units(&self) -> Result<FeatureTable, TableError> {
        let mut out = FeatureTable::new(Vec::new());
        for (user, rows) in self.user_blocks() {
            let mut days: Vec<i64> = rows.iter().map(|&r| self.table.value(r, "day")).collect();
            days.sort_unstable();
            days.dedup();
            for day in days {
                let day_rows: Vec<usize> = rows
                    .iter()
                    .copied()
                    .filter(|&r| self.table.value(r, "day") == day)
                    .collect();
                let Some(unit) = self.aggregate(&day_rows, Granularity::Day) else {
                    continue;
                };
                let weekend = day_rows
                    .iter()
                    .any(|&r| self.table.value(r, "time") >= 3) as i64;
                let first = timeutil::from_epoch(self.table.meta[day_rows[0]].epoch);
                let start = timeutil::epoch(first.date().and_time(NaiveTime::MIN));
                let end = start + 24 * 3600;

                let mut row = FeatureRow::new();
                row.push("starttime", start as f64);
                row.push("endtime", end as f64);
                row.push("user", user as f64);
                row.push("day", day as f64);
                row.push("week", self.week as f64);
                row.push("isweekday", (1 - weekend) as f64);
                row.push("isweekend", weekend as f64);
                row.append(self.user_attributes(user));
                row.append(unit.features);
                row.push("insider", unit.label as f64);
                out.push(row)?;
            }
        }
        Ok(out)
    }

    /// Session rows plus, per requested subsession spec, the chunked variants
    /// with their leading `subs_ind` column.
    pub fn session_units(
        &self,
        subsessions: &[SubsessionSpec],
    ) -> Result<(FeatureTable, Vec<(SubsessionSpec, FeatureTable)>), TableError> {
        let mut out = FeatureTable::new(Vec::new());
        let mut subs: Vec<(SubsessionSpec, FeatureTable)> = subsessions
            .iter()
            .map(|spec| (*spec, FeatureTable::new(Vec::new())))
            .collect();

        let mut first_sid = self.week * SESSION_ID_STRIDE;
        for (user, rows) in self.user_blocks() {
            let user_sessions = sessions::reconstruct(self.table, &rows, first_sid);
            first_sid += user_sessions.len() as i64;
            for session in &user_sessions {
                let Some(parent) =
                    self.session_row(user, session, &session.members, session.end_reason.code())
                else {
                    continue;
                };

                for (spec, table) in &mut subs {
                    let chunks = self.chunk_members(session, *spec);
                    if chunks.len() == 1 {
                        let mut row = FeatureRow::new();
                        row.push("subs_ind", 0.0);
                        row.append(parent.clone());
                        table.push(row)?;
                        continue;
                    }
                    let last = chunks.len() - 1;
                    for (i, chunk) in chunks.into_iter().enumerate() {
                        if chunk.is_empty() {
                            continue;
                        }
                        // Interior chunks end mid-session.
                        let end_with = if i < last {
                            0
                        } else {
                            session.end_reason.code()
                        };
                        let Some(unit) = self.session_row(user, session, &chunk, end_with) else {
                            continue;
                        };
                        let mut row = FeatureRow::new();
                        row.push("subs_ind", i as f64);
                        row.append(unit);
                        table.push(row)?;
                    }
                }

                out.push(parent)?;
            }
        }
        Ok((out, subs))
    }

    /// One assembled session (or subsession) row over `members`.
    fn session_row(
        &self,
        user: usize,
        session: &Session,
        members: &[usize],
        end_with: i64,
    ) -> Option<FeatureRow> {
        let unit = self.aggregate(members, Granularity::Session)?;
        let n = members.len() as f64;
        let share = |code: i64| {
            members
                .iter()
                .filter(|&&r| self.table.value(r, "time") == code)
                .count() as f64
                / n
        };
        let start = members
            .iter()
            .map(|&r| self.table.meta[r].epoch)
            .min()
            .unwrap_or(session.start_time);
        let end = members
            .iter()
            .map(|&r| self.table.meta[r].epoch)
            .max()
            .unwrap_or(session.end_time);
        let start_dt = timeutil::from_epoch(start);
        let end_dt = timeutil::from_epoch(end);
        let mut days: Vec<i64> = members
            .iter()
            .map(|&r| self.table.value(r, "day"))
            .collect();
        days.sort_unstable();
        days.dedup();

        let mut row = FeatureRow::new();
        row.push("starttime", start as f64);
        row.push("endtime", end as f64);
        row.push("user", user as f64);
        row.push("sessionid", session.id as f64);
        row.push("day", self.table.value(members[0], "day") as f64);
        row.push("week", self.week as f64);
        row.push("pc", self.table.value(members[0], "pc") as f64);
        row.push("isworkhour", share(1));
        row.push("isafterhour", share(2));
        row.push("isweekend", share(3));
        row.push("isweekendafterhour", share(4));
        row.push("n_days", days.len() as f64);
        row.push("duration", (end - start) as f64 / 60.0);
        row.push("n_concurrent_sessions", session.concurrent as f64);
        row.push("start_with", session.start_reason.code() as f64);
        row.push("end_with", end_with as f64);
        row.push(
            "ses_start",
            start_dt.hour() as f64 + start_dt.minute() as f64 / 60.0,
        );
        row.push(
            "ses_end",
            end_dt.hour() as f64 + end_dt.minute() as f64 / 60.0,
        );
        row.append(self.user_attributes(user));
        row.append(unit.features);
        row.push("insider", unit.label as f64);
        Some(row)
    }
}

impl Assembler<'_> {
    /// Splits a session's members into subsession chunks. Time chunks may
    /// come back empty; activity-count chunks never do.
    fn chunk_members(&self, session: &Session, spec: SubsessionSpec) -> Vec<Vec<usize>> {
        match spec.mode {
            SubsessionMode::Nact => session
                .members
                .chunks(spec.param.max(1) as usize)
                .map(|c| c.to_vec())
                .collect(),
            SubsessionMode::Time => {
                let minutes = (session.end_time - session.start_time) as f64 / 60.0;
                let n = (minutes / spec.param as f64).ceil().max(1.0) as usize;
                (0..n)
                    .map(|i| {
                        let lo = session.start_time + (i as i64) * spec.param * 60;
                        let hi = lo + spec.param * 60;
                        session
                            .members
                            .iter()
                            .copied()
                            .filter(|&m| {
                                let t = self.table.meta[m].epoch;
                                t >= lo && t < hi
                            })
                            .collect()
                    })
                    .collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::directory::UserProfile;
    use crate::tables::RowMeta;

    fn profile(user_id: &str) -> UserProfile {
        UserProfile {
            user_id: user_id.to_string(),
            name: format!("Name {user_id}"),
            email: format!("{user_id}@dtaa.com"),
            role: "Salesman".to_string(),
            project: String::new(),
            b_unit: "1".to_string(),
            f_unit: "2".to_string(),
            dept: "3".to_string(),
            team: "4".to_string(),
            supervisor_name: String::new(),
            supervisor: None,
            tenure_start: "2009-12".to_string(),
            tenure_end: None,
            ocean: [0.1, 0.2, 0.3, 0.4, 0.5],
            pc: Some("PC-1".to_string()),
            shared_pcs: Vec::new(),
            scenario: 0,
            mal_start: None,
            mal_end: None,
            mal_acts: HashSet::new(),
        }
    }

    // (act, day, time, epoch) rows for one r4 user.
    fn num_table(events: &[(i64, i64, i64, i64)]) -> NumTable {
        let columns = SchemaVersion::R4_2
            .numeric_columns()
            .into_iter()
            .map(String::from)
            .collect();
        let mut t = NumTable::new(columns);
        for (act, day, time, epoch) in events {
            let mut row = vec![0; SchemaVersion::R4_2.row_width()];
            row[1] = *day;
            row[2] = *act;
            row[4] = *time;
            t.push_row(
                row,
                RowMeta {
                    act_id: format!("{{A{epoch}}}"),
                    pc: "PC-1".to_string(),
                    epoch: *epoch,
                },
            )
            .unwrap();
        }
        t
    }

    fn setup(events: &[(i64, i64, i64, i64)]) -> (NumTable, UserDirectory) {
        let t = num_table(events);
        let dir = UserDirectory::from_profiles(vec![profile("AAA0001")]);
        (t, dir)
    }

    const MONDAY_8AM: i64 = 1262592000; // 01/04/2010 08:00:00 UTC

    #[test]
    fn week_row_shape() {
        let (t, dir) = setup(&[(1, 8, 1, MONDAY_8AM), (2, 8, 1, MONDAY_8AM + 3600)]);
        let org = OrgCatalog::build(&dir, SchemaVersion::R4_2);
        let asm = Assembler::new(&t, &dir, &org, SchemaVersion::R4_2, 1);
        let out = asm.week_units().unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(&out.names[..4], ["starttime", "endtime", "user", "week"]);
        assert_eq!(out.names[4], "role");
        assert_eq!(*out.names.last().unwrap(), "insider");
        let st = out.rows[0][0] as i64;
        // Sunday midnight on or before Monday 01/04.
        assert_eq!(timeutil::from_epoch(st).to_string(), "2010-01-03 00:00:00");
        assert_eq!(out.rows[0][1] as i64, st + 7 * 24 * 3600);
    }

    #[test]
    fn day_rows_split_by_day_number() {
        let (t, dir) = setup(&[
            (1, 8, 1, MONDAY_8AM),
            (2, 8, 1, MONDAY_8AM + 3600),
            (1, 9, 1, MONDAY_8AM + 86_400),
        ]);
        let org = OrgCatalog::build(&dir, SchemaVersion::R4_2);
        let asm = Assembler::new(&t, &dir, &org, SchemaVersion::R4_2, 1);
        let out = asm.day_units().unwrap();
        assert_eq!(out.len(), 2);
        let day_col = out.col("day").unwrap();
        assert_eq!(out.rows[0][day_col], 8.0);
        assert_eq!(out.rows[1][day_col], 9.0);
        let weekday_col = out.col("isweekday").unwrap();
        assert_eq!(out.rows[0][weekday_col], 1.0);
    }

    #[test]
    fn session_ids_carry_week_prefix() {
        let (t, dir) = setup(&[(1, 8, 1, MONDAY_8AM), (2, 8, 1, MONDAY_8AM + 3600)]);
        let org = OrgCatalog::build(&dir, SchemaVersion::R4_2);
        let asm = Assembler::new(&t, &dir, &org, SchemaVersion::R4_2, 13);
        let (out, _) = asm.session_units(&[]).unwrap();
        assert_eq!(out.len(), 1);
        let sid_col = out.col("sessionid").unwrap();
        assert_eq!(out.rows[0][sid_col], 1_300_000.0);
        let dur_col = out.col("duration").unwrap();
        assert_eq!(out.rows[0][dur_col], 60.0);
    }

    #[test]
    fn short_session_yields_single_tagged_subsession() {
        let (t, dir) = setup(&[(1, 8, 1, MONDAY_8AM), (2, 8, 1, MONDAY_8AM + 600)]);
        let org = OrgCatalog::build(&dir, SchemaVersion::R4_2);
        let asm = Assembler::new(&t, &dir, &org, SchemaVersion::R4_2, 0);
        let spec = SubsessionSpec {
            mode: SubsessionMode::Time,
            param: 120,
        };
        let (_, subs) = asm.session_units(&[spec]).unwrap();
        let table = &subs[0].1;
        assert_eq!(table.len(), 1);
        assert_eq!(table.names[0], "subs_ind");
        assert_eq!(table.rows[0][0], 0.0);
    }

    #[test]
    fn time_chunks_mark_interior_end() {
        // Three hours of activity, 120-minute chunks -> 2 subsessions.
        let (t, dir) = setup(&[
            (1, 8, 1, MONDAY_8AM),
            (5, 8, 1, MONDAY_8AM + 60 * 60),
            (5, 8, 1, MONDAY_8AM + 150 * 60),
            (2, 8, 1, MONDAY_8AM + 180 * 60),
        ]);
        let org = OrgCatalog::build(&dir, SchemaVersion::R4_2);
        let asm = Assembler::new(&t, &dir, &org, SchemaVersion::R4_2, 0);
        let spec = SubsessionSpec {
            mode: SubsessionMode::Time,
            param: 120,
        };
        let (_, subs) = asm.session_units(&[spec]).unwrap();
        let table = &subs[0].1;
        assert_eq!(table.len(), 2);
        let end_col = table.col("end_with").unwrap();
        assert_eq!(table.rows[0][end_col], 0.0); // interior
        assert_eq!(table.rows[1][end_col], 1.0); // logoff
    }

    #[test]
    fn nact_chunks_split_by_count() {
        let mut events = Vec::new();
        events.push((1, 8, 1, MONDAY_8AM));
        for i in 1..5 {
            events.push((5, 8, 1, MONDAY_8AM + i * 60));
        }
        events.push((2, 8, 1, MONDAY_8AM + 300));
        let (t, dir) = setup(&events);
        let org = OrgCatalog::build(&dir, SchemaVersion::R4_2);
        let asm = Assembler::new(&t, &dir, &org, SchemaVersion::R4_2, 0);
        let spec = SubsessionSpec {
            mode: SubsessionMode::Nact,
            param: 4,
        };
        let (_, subs) = asm.session_units(&[spec]).unwrap();
        // 6 members -> chunks of 4 and 2.
        assert_eq!(subs[0].1.len(), 2);
    }
}
