//! The user directory: employee profiles built from the monthly LDAP
//! snapshots, psychometric scores, insider ground truth, and the own/shared PC
//! assignment derived from the first two observed weeks.

use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::Path;

use chrono::NaiveDateTime;
use log::{info, warn};

use crate::ingest::{split_fields, ActivityRecord};
use crate::schema::SchemaVersion;
use crate::timeutil;

/// One employee. `supervisor` is an index into the same directory; it may be
/// absent (top of the org chart, or a name the snapshots never resolve).
#[derive(Debug, Clone)]
pub struct UserProfile {
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub role: String,
    pub project: String,
    pub b_unit: String,
    pub f_unit: String,
    pub dept: String,
    pub team: String,
    pub supervisor_name: String,
    pub supervisor: Option<usize>,
    pub tenure_start: String,
    pub tenure_end: Option<String>,
    pub ocean: [f64; 5],
    pub pc: Option<String>,
    pub shared_pcs: Vec<String>,
    pub scenario: i64,
    pub mal_start: Option<NaiveDateTime>,
    pub mal_end: Option<NaiveDateTime>,
    pub mal_acts: HashSet<String>,
}

impl UserProfile {
    pub fn is_it_admin(&self) -> bool {
        self.role == "ITAdmin"
    }
}

#[derive(Debug)]
pub enum DirectoryError {
    Io(std::io::Error),
    SchemaMismatch {
        file: String,
        expected: usize,
        got: usize,
    },
    Format(timeutil::FormatError),
    NoSnapshots(String),
}

impl Display for DirectoryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DirectoryError::Io(e) => write!(f, "io error: {e}"),
            DirectoryError::SchemaMismatch {
                file,
                expected,
                got,
            } => write!(
                f,
                "schema mismatch in {file}: expected {expected} columns, got {got}"
            ),
            DirectoryError::Format(e) => write!(f, "{e}"),
            DirectoryError::NoSnapshots(dir) => write!(f, "no LDAP snapshots under {dir}"),
        }
    }
}

impl Error for DirectoryError {}

impl From<std::io::Error> for DirectoryError {
    fn from(e: std::io::Error) -> Self {
        DirectoryError::Io(e)
    }
}

impl From<timeutil::FormatError> for DirectoryError {
    fn from(e: timeutil::FormatError) -> Self {
        DirectoryError::Format(e)
    }
}

/// PC relationship codes stored in the `pc` feature column.
pub const PC_OWN: i64 = 0;
pub const PC_SHARED: i64 = 1;
pub const PC_OTHER: i64 = 2;
pub const PC_SUPERVISOR: i64 = 3;

pub struct UserDirectory {
    pub users: Vec<UserProfile>,
    index: HashMap<String, usize>,
}

impl UserDirectory {
    pub fn from_profiles(users: Vec<UserProfile>) -> UserDirectory {
        let index = users
            .iter()
            .enumerate()
            .map(|(i, u)| (u.user_id.clone(), i))
            .collect();
        UserDirectory { users, index }
    }

    /// Builds profiles from the `LDAP/` snapshot CSVs, indexed in order of
    /// first appearance across snapshots sorted by filename. Fields update
    /// month over month; a user absent from a later snapshot gets a tenure
    /// end.
    pub fn from_ldap(corpus_dir: &Path, version: SchemaVersion) -> Result<UserDirectory, DirectoryError> {
        let ldap_dir = corpus_dir.join("LDAP");
        let mut snapshots: Vec<_> = fs::read_dir(&ldap_dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .collect();
        if snapshots.is_empty() {
            return Err(DirectoryError::NoSnapshots(ldap_dir.display().to_string()));
        }
        snapshots.sort();

        // employee_name, user_id, email, role, [project], b_unit, f_unit,
        // dept, team, supervisor
        let expected = if version.extended() { 10 } else { 9 };
        let mut dir = UserDirectory {
            users: Vec::new(),
            index: HashMap::new(),
        };
        let mut gone: HashSet<String> = HashSet::new();

        for snapshot in &snapshots {
            let month = snapshot
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let mut present: HashSet<String> = HashSet::new();
            for (lineno, line) in fs::read_to_string(snapshot)?.lines().enumerate() {
                if lineno == 0 || line.is_empty() {
                    continue;
                }
                let f = split_fields(line);
                if f.len() != expected {
                    return Err(DirectoryError::SchemaMismatch {
                        file: snapshot.display().to_string(),
                        expected,
                        got: f.len(),
                    });
                }
                let (project, rest) = if version.extended() {
                    (f[4].clone(), 5)
                } else {
                    (String::new(), 4)
                };
                present.insert(f[1].clone());
                match dir.index.get(&f[1]) {
                    Some(&i) => {
                        // Attributes can change between snapshots; keep the
                        // latest.
                        let u = &mut dir.users[i];
                        u.role = f[3].clone();
                        u.project = project;
                        u.b_unit = f[rest].clone();
                        u.f_unit = f[rest + 1].clone();
                        u.dept = f[rest + 2].clone();
                        u.team = f[rest + 3].clone();
                        u.supervisor_name = f[rest + 4].clone();
                    }
                    None => {
                        dir.index.insert(f[1].clone(), dir.users.len());
                        dir.users.push(UserProfile {
                            user_id: f[1].clone(),
                            name: f[0].clone(),
                            email: f[2].clone(),
                            role: f[3].clone(),
                            project,
                            b_unit: f[rest].clone(),
                            f_unit: f[rest + 1].clone(),
                            dept: f[rest + 2].clone(),
                            team: f[rest + 3].clone(),
                            supervisor_name: f[rest + 4].clone(),
                            supervisor: None,
                            tenure_start: month.clone(),
                            tenure_end: None,
                            ocean: [0.0; 5],
                            pc: None,
                            shared_pcs: Vec::new(),
                            scenario: 0,
                            mal_start: None,
                            mal_end: None,
                            mal_acts: HashSet::new(),
                        });
                    }
                }
            }
            for u in &mut dir.users {
                if !present.contains(&u.user_id) && !gone.contains(&u.user_id) {
                    u.tenure_end = Some(month.clone());
                    gone.insert(u.user_id.clone());
                }
            }
        }

        dir.resolve_supervisors();
        info!("user directory: {} profiles from {} snapshots", dir.users.len(), snapshots.len());
        Ok(dir)
    }

    fn resolve_supervisors(&mut self) {
        let by_name: HashMap<String, usize> = self
            .users
            .iter()
            .enumerate()
            .map(|(i, u)| (u.name.clone(), i))
            .collect();
        for u in &mut self.users {
            u.supervisor = by_name.get(&u.supervisor_name).copied();
        }
    }

    /// Loads `psychometric.csv` (user_id, O, C, E, A, N) when present.
    pub fn load_psychometric(&mut self, corpus_dir: &Path) -> Result<(), DirectoryError> {
        let path = corpus_dir.join("psychometric.csv");
        if !path.is_file() {
            info!("no psychometric.csv; personality scores stay zero");
            return Ok(());
        }
        for (lineno, line) in fs::read_to_string(&path)?.lines().enumerate() {
            if lineno == 0 || line.is_empty() {
                continue;
            }
            let f = split_fields(line);
            if f.len() < 7 {
                return Err(DirectoryError::SchemaMismatch {
                    file: path.display().to_string(),
                    expected: 7,
                    got: f.len(),
                });
            }
            if let Some(&i) = self.index.get(&f[1]) {
                for (slot, value) in f[2..7].iter().enumerate() {
                    self.users[i].ocean[slot] = value.trim().parse().unwrap_or(0.0);
                }
            } else {
                warn!("psychometric.csv: unknown user {}", f[1]);
            }
        }
        Ok(())
    }

    /// Loads `answers/insiders.csv` filtered to this release, plus each
    /// insider's malicious-activity id set from the per-scenario details file.
    pub fn load_ground_truth(
        &mut self,
        corpus_dir: &Path,
        version: SchemaVersion,
    ) -> Result<(), DirectoryError> {
        let answers = corpus_dir.join("answers");
        let path = answers.join("insiders.csv");
        for (lineno, line) in fs::read_to_string(&path)?.lines().enumerate() {
            if lineno == 0 || line.is_empty() {
                continue;
            }
            let f = split_fields(line);
            if f.len() < 6 {
                return Err(DirectoryError::SchemaMismatch {
                    file: path.display().to_string(),
                    expected: 6,
                    got: f.len(),
                });
            }
            // dataset, scenario, details file, user, start, end
            if f[0] != version.answer_tag() {
                continue;
            }
            let scenario: i64 = f[1].trim().parse().unwrap_or(0);
            let mut start = f[4].clone();
            // The r6.2 scenario-4 answer drops the month's leading zero.
            if version == SchemaVersion::R6_2 && scenario == 4 {
                start = format!("02{start}");
            }
            let Some(&i) = self.index.get(&f[3]) else {
                warn!("insiders.csv: unknown user {}", f[3]);
                continue;
            };
            self.users[i].scenario = scenario;
            self.users[i].mal_start = Some(timeutil::parse_datetime(&start)?);
            self.users[i].mal_end = Some(timeutil::parse_datetime(&f[5])?);

            // r4.2/r5.2 keep per-scenario answer folders; the single-insider
            // releases keep the details file at the answers root.
            let details = if matches!(version, SchemaVersion::R4_2 | SchemaVersion::R5_2) {
                answers.join(format!("r{}-{}", f[0], scenario)).join(&f[2])
            } else {
                answers.join(&f[2])
            };
            let mut mal_acts = HashSet::new();
            for dline in fs::read_to_string(&details)?.lines() {
                if dline.is_empty() {
                    continue;
                }
                let df = split_fields(dline);
                if df.len() > 3 && df[3].trim_matches('"') == f[3] {
                    mal_acts.insert(df[1].trim_matches('"').to_string());
                }
            }
            self.users[i].mal_acts = mal_acts;
        }
        Ok(())
    }

    /// Assigns each user's own and shared PCs from the PCs they logged onto in
    /// both of the first two observed weeks. Users with one candidate own it.
    /// For multi-candidate users, each candidate is scored by how many
    /// multi-candidate users list it; the least-contended candidate is claimed
    /// as own and the rest become the shared list.
    pub fn assign_pcs(&mut self, week0: &[ActivityRecord], week1: &[ActivityRecord]) {
        let mut pcs0: HashMap<&str, HashSet<&str>> = HashMap::new();
        let mut pcs1: HashMap<&str, HashSet<&str>> = HashMap::new();
        for rec in week0 {
            pcs0.entry(&rec.user).or_default().insert(&rec.pc);
        }
        for rec in week1 {
            pcs1.entry(&rec.user).or_default().insert(&rec.pc);
        }

        let empty = HashSet::new();
        let mut candidates: Vec<Vec<String>> = Vec::with_capacity(self.users.len());
        for u in &self.users {
            let a = pcs0.get(u.user_id.as_str()).unwrap_or(&empty);
            let b = pcs1.get(u.user_id.as_str()).unwrap_or(&empty);
            let mut both: Vec<String> = a.intersection(b).map(|s| s.to_string()).collect();
            both.sort();
            candidates.push(both);
        }

        // Contention counts over multi-candidate users only.
        let mut contention: HashMap<&str, usize> = HashMap::new();
        for cands in candidates.iter().filter(|c| c.len() > 1) {
            for pc in cands {
                *contention.entry(pc).or_insert(0) += 1;
            }
        }

        for (i, cands) in candidates.iter().enumerate() {
            match cands.len() {
                0 => warn!("no PC candidate for user {}", self.users[i].user_id),
                1 => self.users[i].pc = Some(cands[0].clone()),
                _ => {
                    let own = cands
                        .iter()
                        .min_by_key(|pc| contention.get(pc.as_str()).copied().unwrap_or(0))
                        .cloned();
                    self.users[i].shared_pcs = cands
                        .iter()
                        .filter(|pc| Some(*pc) != own.as_ref())
                        .cloned()
                        .collect();
                    self.users[i].pc = own;
                }
            }
        }
    }

    /// Relationship between an activity's PC and the acting user's
    /// assignments: own (0), shared (1), supervisor's own (3), other (2).
    pub fn pc_relationship(&self, user: usize, pc: &str) -> i64 {
        let u = &self.users[user];
        if u.pc.as_deref() == Some(pc) {
            return PC_OWN;
        }
        if u.shared_pcs.iter().any(|p| p == pc) {
            return PC_SHARED;
        }
        if let Some(sup) = u.supervisor {
            if self.users[sup].pc.as_deref() == Some(pc) {
                return PC_SUPERVISOR;
            }
        }
        PC_OTHER
    }

    pub fn index_of(&self, user_id: &str) -> Option<usize> {
        self.index.get(user_id).copied()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

/// Index maps for the categorical org attributes: per field, the sorted
/// distinct values across the directory mapped to 0-based codes.
pub struct OrgCatalog {
    pub fields: Vec<&'static str>,
    maps: Vec<HashMap<String, i64>>,
}

impl OrgCatalog {
    pub fn build(dir: &UserDirectory, version: SchemaVersion) -> OrgCatalog {
        let fields = version.org_fields();
        let mut maps = Vec::with_capacity(fields.len());
        for field in &fields {
            let mut values: Vec<&str> = dir
                .users
                .iter()
                .map(|u| Self::field_of(u, field))
                .collect::<HashSet<&str>>()
                .into_iter()
                .collect();
            values.sort_unstable();
            maps.push(
                values
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| (v.to_string(), i as i64))
                    .collect(),
            );
        }
        OrgCatalog { fields, maps }
    }

    fn field_of<'a>(u: &'a UserProfile, field: &str) -> &'a str {
        match field {
            "project" => &u.project,
            "role" => &u.role,
            "b_unit" => &u.b_unit,
            "f_unit" => &u.f_unit,
            "dept" => &u.dept,
            "team" => &u.team,
            _ => "",
        }
    }

    /// The user's org-attribute codes, in `fields` order.
    pub fn user_codes(&self, u: &UserProfile) -> Vec<i64> {
        self.fields
            .iter()
            .zip(&self.maps)
            .map(|(field, map)| map[Self::field_of(u, field)])
            .collect()
    }

    /// Value lists per field, for the run manifest.
    pub fn value_maps(&self) -> HashMap<String, Vec<String>> {
        self.fields
            .iter()
            .zip(&self.maps)
            .map(|(field, map)| {
                let mut values: Vec<(&String, &i64)> = map.iter().collect();
                values.sort_by_key(|(_, i)| **i);
                (
                    field.to_string(),
                    values.into_iter().map(|(v, _)| v.clone()).collect(),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(user_id: &str, role: &str) -> UserProfile {
        UserProfile {
            user_id: user_id.to_string(),
            name: format!("Name {user_id}"),
            email: format!("{user_id}@dtaa.com"),
            role: role.to_string(),
            project: String::new(),
            b_unit: "1".to_string(),
            f_unit: "2".to_string(),
            dept: "3".to_string(),
            team: "4".to_string(),
            supervisor_name: String::new(),
            supervisor: None,
            tenure_start: "2009-12".to_string(),
            tenure_end: None,
            ocean: [0.0; 5],
            pc: None,
            shared_pcs: Vec::new(),
            scenario: 0,
            mal_start: None,
            mal_end: None,
            mal_acts: HashSet::new(),
        }
    }

    fn dir_of(users: Vec<UserProfile>) -> UserDirectory {
        UserDirectory::from_profiles(users)
    }

    fn logon(user: &str, pc: &str) -> ActivityRecord {
        ActivityRecord {
            id: "{L}".to_string(),
            date: timeutil::parse_datetime("01/04/2010 08:00:00").unwrap(),
            user: user.to_string(),
            pc: pc.to_string(),
            kind: crate::schema::ActivityKind::Logon,
            activity: "Logon".to_string(),
            url_fname: String::new(),
            content: String::new(),
            to: String::new(),
            cc: String::new(),
            bcc: String::new(),
            from: String::new(),
            size: 0,
            n_att: 0,
            att: String::new(),
        }
    }

    #[test]
    fn contention_assigns_least_shared_pc() {
        let mut dir = dir_of(vec![profile("U1", "Salesman"), profile("U2", "Salesman")]);
        // U1 uses PC-A and PC-B in both weeks; U2 uses only PC-A in both.
        // PC-A is single-candidate-owned by U2; among multi-candidate users
        // PC-A and PC-B each score 1, so U1 claims the first by sort order,
        // PC-A having equal contention.
        let w = vec![
            logon("U1", "PC-A"),
            logon("U1", "PC-B"),
            logon("U2", "PC-A"),
        ];
        dir.assign_pcs(&w, &w);
        assert_eq!(dir.users[1].pc.as_deref(), Some("PC-A"));
        assert_eq!(dir.users[0].pc.as_deref(), Some("PC-A"));
        assert_eq!(dir.users[0].shared_pcs, vec!["PC-B".to_string()]);
    }

    #[test]
    fn shared_pc_requires_both_weeks() {
        let mut dir = dir_of(vec![profile("U1", "Salesman")]);
        let w0 = vec![logon("U1", "PC-A"), logon("U1", "PC-B")];
        let w1 = vec![logon("U1", "PC-A")];
        dir.assign_pcs(&w0, &w1);
        assert_eq!(dir.users[0].pc.as_deref(), Some("PC-A"));
        assert!(dir.users[0].shared_pcs.is_empty());
    }

    #[test]
    fn relationship_codes() {
        let mut users = vec![profile("U1", "Salesman"), profile("U2", "Manager")];
        users[0].pc = Some("PC-A".to_string());
        users[0].shared_pcs = vec!["PC-B".to_string()];
        users[0].supervisor = Some(1);
        users[1].pc = Some("PC-C".to_string());
        let dir = dir_of(users);
        assert_eq!(dir.pc_relationship(0, "PC-A"), PC_OWN);
        assert_eq!(dir.pc_relationship(0, "PC-B"), PC_SHARED);
        assert_eq!(dir.pc_relationship(0, "PC-C"), PC_SUPERVISOR);
        assert_eq!(dir.pc_relationship(0, "PC-Z"), PC_OTHER);
    }

    #[test]
    fn org_codes_are_sorted_distinct() {
        let mut users = vec![profile("U1", "Salesman"), profile("U2", "Manager")];
        users[1].team = "9".to_string();
        let dir = dir_of(users);
        let org = OrgCatalog::build(&dir, SchemaVersion::R4_2);
        assert_eq!(org.fields, vec!["role", "b_unit", "f_unit", "dept", "team"]);
        // "Manager" < "Salesman" lexicographically.
        assert_eq!(org.user_codes(&dir.users[0])[0], 1);
        assert_eq!(org.user_codes(&dir.users[1])[0], 0);
        assert_eq!(org.user_codes(&dir.users[1])[4], 1);
    }
}
