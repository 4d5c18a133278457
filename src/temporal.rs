//! Causal per-user temporal representations over an assembled feature table:
//! lag-concatenation, rolling mean/median difference, and rolling percentile
//! rank. A user's window never sees another user's rows, and a row with no
//! history in its window is dropped rather than padded.

use strum_macros::{Display, EnumIter, EnumString};

use crate::tables::{FeatureRow, FeatureTable, TableError};

/// Identity and label columns excluded from every transform and copied
/// through unchanged.
pub const INFO_COLS: [&str; 20] = [
    "sessionid",
    "day",
    "week",
    "starttime",
    "endtime",
    "user",
    "project",
    "role",
    "b_unit",
    "f_unit",
    "dept",
    "team",
    "ITAdmin",
    "O",
    "C",
    "E",
    "A",
    "N",
    "insider",
    "subs_ind",
];

/// Session-shape columns the difference/percentile transforms also keep in
/// raw form, under an `org_` prefix.
pub const KEEP_ORG_COLS: [&str; 13] = [
    "pc",
    "isworkhour",
    "isafterhour",
    "isweekday",
    "isweekend",
    "isweekendafterhour",
    "n_days",
    "duration",
    "n_concurrent_sessions",
    "start_with",
    "end_with",
    "ses_start",
    "ses_end",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum TemporalRep {
    Concat,
    MeanDiff,
    MedDiff,
    Percentile,
}

/// Which column carries the row's time index, and how a day-denominated
/// window translates onto it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeAxis {
    Week,
    Day,
}

impl TimeAxis {
    fn column(&self) -> &'static str {
        match self {
            TimeAxis::Week => "week",
            TimeAxis::Day => "day",
        }
    }

    fn window_units(&self, window_days: i64) -> i64 {
        match self {
            TimeAxis::Week => window_days / 7,
            TimeAxis::Day => window_days,
        }
    }
}

fn split_columns(names: &[String]) -> (Vec<usize>, Vec<usize>) {
    let features = names
        .iter()
        .enumerate()
        .filter(|(_, n)| !INFO_COLS.contains(&n.as_str()))
        .map(|(i, _)| i)
        .collect();
    let info = names
        .iter()
        .enumerate()
        .filter(|(_, n)| INFO_COLS.contains(&n.as_str()))
        .map(|(i, _)| i)
        .collect();
    (features, info)
}

/// Per-user row groups in first-appearance order, each sorted by the given
/// index column (stable, so equal indices keep input order).
fn user_groups(data: &FeatureTable, sort_col: Option<usize>) -> Result<Vec<Vec<usize>>, TableError> {
    let user_col = data.col("user")?;
    let mut order: Vec<f64> = Vec::new();
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for (i, row) in data.rows.iter().enumerate() {
        let u = row[user_col];
        match order.iter().position(|&x| x == u) {
            Some(g) => groups[g].push(i),
            None => {
                order.push(u);
                groups.push(vec![i]);
            }
        }
    }
    if let Some(col) = sort_col {
        for g in &mut groups {
            g.sort_by(|&a, &b| data.rows[a][col].total_cmp(&data.rows[b][col]));
        }
    }
    Ok(groups)
}

/// Lag-concatenation: row t becomes the features of rows t-(W-1)..t stacked
/// oldest first, lagged copies named `-k_{f}`, info columns from row t. The
/// first W-1 rows of each user's stream are dropped.
pub fn concat_lags(data: &FeatureTable, window: usize) -> Result<FeatureTable, TableError> {
    let (features, info) = split_columns(&data.names);
    let mut names: Vec<String> = Vec::new();
    for k in (1..window).rev() {
        names.extend(features.iter().map(|&c| format!("-{k}_{}", data.names[c])));
    }
    names.extend(features.iter().map(|&c| data.names[c].clone()));
    names.extend(info.iter().map(|&c| data.names[c].clone()));

    let mut out = FeatureTable::new(names);
    for group in user_groups(data, None)? {
        for t in (window - 1)..group.len() {
            let mut row = Vec::with_capacity(out.names.len());
            for back in (1..window).rev() {
                let src = &data.rows[group[t - back]];
                row.extend(features.iter().map(|&c| src[c]));
            }
            let current = &data.rows[group[t]];
            row.extend(features.iter().map(|&c| current[c]));
            row.extend(info.iter().map(|&c| current[c]));
            out.push_values(row)?;
        }
    }
    Ok(out)
}

fn median_of(mut values: Vec<f64>) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    }
}

/// Percentile-of-score with mean tie handling, centered on 0.
fn centered_percentile(window: &[f64], value: f64) -> f64 {
    let below = window.iter().filter(|&&v| v < value).count() as f64;
    let equal = window.iter().filter(|&&v| v == value).count() as f64;
    (below + 0.5 * equal) / window.len() as f64 * 100.0 - 50.0
}

/// Rolling history transform: for each row with time index `t`, the window is
/// the user's rows with index in `(t-1-w, t-1]`; rows with an empty window
/// are dropped. Output columns: transformed features, the kept raw columns
/// prefixed `org_`, then the info columns.
pub fn window_transform(
    data: &FeatureTable,
    axis: TimeAxis,
    rep: TemporalRep,
    window_days: i64,
) -> Result<FeatureTable, TableError> {
    let (features, info) = split_columns(&data.names);
    let org: Vec<usize> = data
        .names
        .iter()
        .enumerate()
        .filter(|(_, n)| KEEP_ORG_COLS.contains(&n.as_str()))
        .map(|(i, _)| i)
        .collect();
    let idx_col = data.col(axis.column())?;
    let w = axis.window_units(window_days);

    let mut names: Vec<String> = features.iter().map(|&c| data.names[c].clone()).collect();
    names.extend(org.iter().map(|&c| format!("org_{}", data.names[c])));
    names.extend(info.iter().map(|&c| data.names[c].clone()));
    let mut out = FeatureTable::new(names);

    for group in user_groups(data, Some(idx_col))? {
        for &r in &group {
            let t = data.rows[r][idx_col];
            let window: Vec<usize> = group
                .iter()
                .copied()
                .filter(|&p| {
                    let i = data.rows[p][idx_col];
                    i > t - 1.0 - w as f64 && i <= t - 1.0
                })
                .collect();
            if window.is_empty() {
                continue;
            }

            let mut row = Vec::with_capacity(out.names.len());
            for &c in &features {
                let history: Vec<f64> = window.iter().map(|&p| data.rows[p][c]).collect();
                let value = data.rows[r][c];
                row.push(match rep {
                    TemporalRep::MeanDiff => {
                        value - history.iter().sum::<f64>() / history.len() as f64
                    }
                    TemporalRep::MedDiff => value - median_of(history),
                    TemporalRep::Percentile => centered_percentile(&history, value),
                    TemporalRep::Concat => value,
                });
            }
            row.extend(org.iter().map(|&c| data.rows[r][c]));
            row.extend(info.iter().map(|&c| data.rows[r][c]));
            out.push_values(row)?;
        }
    }
    Ok(out)
}

/// Splits a table into at most `parts` user-disjoint tables, users kept whole
/// and in first-appearance order. Transforms run per user, so the parts can
/// be processed on separate workers and re-appended in order.
pub fn partition_users(data: &FeatureTable, parts: usize) -> Result<Vec<FeatureTable>, TableError> {
    let groups = user_groups(data, None)?;
    if groups.is_empty() {
        return Ok(Vec::new());
    }
    let parts = parts.clamp(1, groups.len());
    let per = groups.len().div_ceil(parts);
    let mut out = Vec::new();
    for chunk in groups.chunks(per) {
        let mut t = FeatureTable::new(data.names.clone());
        for group in chunk {
            for &r in group {
                t.push_values(data.rows[r].clone())?;
            }
        }
        out.push(t);
    }
    Ok(out)
}
