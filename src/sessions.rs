//! Rebuilds discrete login sessions from one user's numeric rows. One open
//! slot per PC; a Logon on an already-open PC closes the current session and
//! starts the next, and concurrency counts rise on every open session
//! whenever another one opens beside it.

use std::collections::HashMap;

use crate::numericize::ActivityCode;
use crate::tables::NumTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartReason {
    Logon,
    Other,
}

impl StartReason {
    pub fn code(&self) -> i64 {
        match self {
            StartReason::Logon => 1,
            StartReason::Other => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    Logoff,
    NextLogon,
}

impl EndReason {
    pub fn code(&self) -> i64 {
        match self {
            EndReason::Logoff => 1,
            EndReason::NextLogon => 2,
        }
    }
}

/// One closed session. `members` are row indices into the week's numeric
/// table, in time order; times are epoch seconds.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: i64,
    pub pc: String,
    pub start_reason: StartReason,
    pub end_reason: EndReason,
    pub start_time: i64,
    pub end_time: i64,
    pub concurrent: i64,
    pub members: Vec<usize>,
}

struct OpenSession {
    start_reason: StartReason,
    start_time: i64,
    end_time: i64,
    concurrent: i64,
    members: Vec<usize>,
}

/// Reconstructs the closed sessions of one user from their time-ordered row
/// indices. Ids run sequentially from `first_sid`; sessions still open when
/// the rows run out are dropped.
pub fn reconstruct(table: &NumTable, rows: &[usize], first_sid: i64) -> Vec<Session> {
    let mut sessions: Vec<Session> = Vec::new();
    let mut open: HashMap<String, OpenSession> = HashMap::new();

    for &row in rows {
        let pc = table.meta[row].pc.clone();
        let time = table.meta[row].epoch;
        let act = table.value(row, "act");

        match open.get_mut(&pc) {
            Some(session) => {
                if act == ActivityCode::Logoff.code() {
                    session.end_time = time;
                    session.members.push(row);
                    let closed = open.remove(&pc).unwrap();
                    sessions.push(close(closed, pc, EndReason::Logoff, first_sid, sessions.len()));
                } else if act == ActivityCode::Logon.code() {
                    let closed = open.remove(&pc).unwrap();
                    sessions.push(close(closed, pc.clone(), EndReason::NextLogon, first_sid, sessions.len()));
                    open_session(&mut open, pc, StartReason::Logon, time, row);
                } else {
                    session.end_time = time;
                    session.members.push(row);
                }
            }
            None => {
                let reason = if act == ActivityCode::Logon.code() {
                    StartReason::Logon
                } else {
                    StartReason::Other
                };
                open_session(&mut open, pc, reason, time, row);
            }
        }
    }
    sessions
}

fn open_session(
    open: &mut HashMap<String, OpenSession>,
    pc: String,
    start_reason: StartReason,
    time: i64,
    row: usize,
) {
    open.insert(
        pc,
        OpenSession {
            start_reason,
            start_time: time,
            end_time: time,
            concurrent: 1,
            members: vec![row],
        },
    );
    if open.len() > 1 {
        for session in open.values_mut() {
            session.concurrent += 1;
        }
    }
}

fn close(s: OpenSession, pc: String, end_reason: EndReason, first_sid: i64, seq: usize) -> Session {
    Session {
        id: first_sid + seq as i64,
        pc,
        start_reason: s.start_reason,
        end_reason,
        start_time: s.start_time,
        end_time: s.end_time,
        concurrent: s.concurrent,
        members: s.members,
    }
}
