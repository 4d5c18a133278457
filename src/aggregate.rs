//! Statistical feature aggregation over numeric activity rows. One plan entry
//! per activity family; every family is re-evaluated under each time-bucket
//! variant of the granularity, and filter dimensions (file type, http type,
//! send/receive) split a family into named sub-partitions that run through the
//! same core.

use std::error::Error;
use std::fmt::{Display, Formatter};

use strum_macros::{Display as StrumDisplay, EnumIter, EnumString};

use crate::schema::SchemaVersion;
use crate::tables::{FeatureRow, NumTable};

/// Unit granularity of one aggregation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, StrumDisplay, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum Granularity {
    Week,
    Day,
    Session,
}

/// A unit whose rows disagree on which malicious scenario they belong to.
#[derive(Debug)]
pub struct AmbiguousLabel {
    pub scenarios: Vec<i64>,
}

impl Display for AmbiguousLabel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "unit mixes malicious scenarios {:?}", self.scenarios)
    }
}

impl Error for AmbiguousLabel {}

/// Aggregated unit: activity count, weekend flag, the ordered feature block
/// and the scenario label.
pub struct UnitFeatures {
    pub n_acts: usize,
    pub weekend: i64,
    pub features: FeatureRow,
    pub label: i64,
}

struct FamilySpec {
    base: &'static str,
    act: Option<i64>,
    filter: Option<(&'static str, Vec<i64>, Vec<&'static str>)>,
    stats: Vec<&'static str>,
    countonly: Vec<(&'static str, Vec<i64>)>,
}

const FILE_TYPE_NAMES: [&str; 6] = ["otherf", "compf", "phof", "docf", "txtf", "exef"];
const HTTP_TYPE_NAMES: [&str; 6] = ["otherf", "socnetf", "cloudf", "jobf", "leakf", "hackf"];

fn family_plan(mode: Granularity, version: SchemaVersion) -> Vec<FamilySpec> {
    let session = mode == Granularity::Session;
    let pc = ("pc", vec![0, 1, 2, 3]);
    let pc_filter: Vec<(&'static str, Vec<i64>)> = if session { vec![] } else { vec![pc.clone()] };

    let mut file_countonly: Vec<(&'static str, Vec<i64>)> = Vec::new();
    if version.extended() {
        file_countonly.push(("to_usb", vec![1]));
        file_countonly.push(("from_usb", vec![1]));
        file_countonly.push(("file_act", vec![1, 2, 3, 4]));
    }
    if session {
        file_countonly.push(("disk", vec![0, 1, 2]));
    } else {
        file_countonly.push(("disk", vec![0, 1]));
        file_countonly.push(pc.clone());
    }

    let mut email_stats = vec![
        "n_des",
        "n_atts",
        "n_exdes",
        "n_bccdes",
        "email_size",
        "email_text_slen",
        "email_text_nwords",
    ];
    if version.extended() {
        email_stats.extend([
            "e_att_other",
            "e_att_comp",
            "e_att_pho",
            "e_att_doc",
            "e_att_txt",
            "e_att_exe",
            "e_att_sother",
            "e_att_scomp",
            "e_att_spho",
            "e_att_sdoc",
            "e_att_stxt",
            "e_att_sexe",
        ]);
    }
    let mut email_countonly = vec![("Xemail", vec![1]), ("exbccmail", vec![1])];
    if !session {
        email_countonly.push(pc.clone());
    }

    let mut http_countonly: Vec<(&'static str, Vec<i64>)> =
        if session { vec![] } else { vec![pc] };
    if version.has_http_action() {
        http_countonly.push(("http_act", vec![1, 2, 3]));
    }

    let mut device_stats = vec!["usb_dur"];
    if version.extended() {
        device_stats.push("file_tree_len");
    }

    vec![
        FamilySpec {
            base: "allact",
            act: None,
            filter: None,
            stats: vec![],
            countonly: pc_filter.clone(),
        },
        FamilySpec {
            base: "logon",
            act: Some(1),
            filter: None,
            stats: vec![],
            countonly: pc_filter.clone(),
        },
        FamilySpec {
            base: "usb",
            act: Some(3),
            filter: None,
            stats: device_stats,
            countonly: pc_filter,
        },
        FamilySpec {
            base: "file",
            act: Some(7),
            filter: Some(("file_type", (1..=6).collect(), FILE_TYPE_NAMES.to_vec())),
            stats: vec!["file_len", "file_depth", "file_nwords"],
            countonly: file_countonly,
        },
        FamilySpec {
            base: "email",
            act: Some(6),
            filter: if version.extended() {
                Some(("send_mail", vec![0, 1], vec!["recvmail", "send_mail"]))
            } else {
                None
            },
            stats: email_stats,
            countonly: email_countonly,
        },
        FamilySpec {
            base: "http",
            act: Some(5),
            filter: Some(("http_type", (1..=6).collect(), HTTP_TYPE_NAMES.to_vec())),
            stats: vec!["url_len", "url_depth", "http_c_len", "http_c_nwords"],
            countonly: http_countonly,
        },
    ]
}

/// Time-bucket variants of a granularity, as (prefix, admitted `time` codes).
fn time_variants(mode: Granularity) -> Vec<(&'static str, Vec<i64>)> {
    match mode {
        Granularity::Week => vec![
            ("", vec![1, 2, 3, 4]),
            ("workhour", vec![1]),
            ("afterhour", vec![2]),
            ("weekend", vec![3, 4]),
        ],
        Granularity::Day => vec![
            ("", vec![1, 2, 3, 4]),
            ("workhour", vec![1, 3]),
            ("afterhour", vec![2, 4]),
        ],
        Granularity::Session => vec![("", vec![1, 2, 3, 4])],
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    }
}

/// Population standard deviation (ddof = 0).
fn std_dev(values: &[f64], m: f64) -> f64 {
    (values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64).sqrt()
}

/// Count + statistics + categorical counts over one row set. `full` switches
/// the per-feature output from a single mean to the min/max/med/mean/std
/// five-tuple. Empty row sets emit 0 everywhere.
fn stats_block(
    table: &NumTable,
    rows: &[usize],
    prefix: &str,
    stat_features: &[&str],
    countonly: &[(&str, Vec<i64>)],
    full: bool,
) -> (usize, FeatureRow) {
    let mut out = FeatureRow::new();
    for f in stat_features {
        if rows.is_empty() {
            if full {
                for stat in ["min", "max", "med", "mean", "std"] {
                    out.push(format!("{prefix}_{stat}_{f}"), 0.0);
                }
            } else {
                out.push(format!("{prefix}_mean_{f}"), 0.0);
            }
            continue;
        }
        let mut values: Vec<f64> = rows.iter().map(|&r| table.value(r, f) as f64).collect();
        let m = mean(&values);
        if full {
            let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let med = median(&mut values);
            out.push(format!("{prefix}_min_{f}"), min);
            out.push(format!("{prefix}_max_{f}"), max);
            out.push(format!("{prefix}_med_{f}"), med);
            out.push(format!("{prefix}_mean_{f}"), m);
            out.push(format!("{prefix}_std_{f}"), std_dev(&values, m));
        } else {
            out.push(format!("{prefix}_mean_{f}"), m);
        }
    }
    for (col, filter_values) in countonly {
        for v in filter_values {
            let n = rows.iter().filter(|&&r| table.value(r, col) == *v).count();
            out.push(format!("{prefix}_n-{col}{v}"), n as f64);
        }
    }
    (rows.len(), out)
}

/// One family under one variant: the `n_{prefix}` count, the family-level
/// stats, and one sub-block per filter-dimension value.
fn family_block(table: &NumTable, rows: &[usize], prefix: &str, spec: &FamilySpec) -> FeatureRow {
    let mut out = FeatureRow::new();
    let (n, stats) = stats_block(table, rows, prefix, &spec.stats, &spec.countonly, false);
    out.push(format!("n_{prefix}"), n as f64);
    out.append(stats);

    if let Some((filter_col, filter_values, filter_names)) = &spec.filter {
        for (v, name) in filter_values.iter().zip(filter_names) {
            let sub: Vec<usize> = rows
                .iter()
                .copied()
                .filter(|&r| table.value(r, filter_col) == *v)
                .collect();
            let (n_sf, sf) = stats_block(table, &sub, name, &spec.stats, &spec.countonly, false);
            out.push(format!("{prefix}_n_{name}"), n_sf as f64);
            for (sf_name, value) in sf.names().into_iter().zip(sf.values()) {
                out.push(format!("{prefix}_{sf_name}"), value);
            }
        }
    }
    out
}

/// Aggregates one unit's rows. Families run in a fixed order and each family
/// is repeated per time-bucket variant, so the emitted header is identical for
/// every unit of the same mode and version.
pub fn f_calc(
    table: &NumTable,
    rows: &[usize],
    mode: Granularity,
    version: SchemaVersion,
) -> Result<UnitFeatures, AmbiguousLabel> {
    let variants = time_variants(mode);
    let plan = family_plan(mode, version);
    let mut features = FeatureRow::new();

    for spec in &plan {
        let family_rows: Vec<usize> = match spec.act {
            Some(code) => rows
                .iter()
                .copied()
                .filter(|&r| table.value(r, "act") == code)
                .collect(),
            None => rows.to_vec(),
        };
        for (variant_prefix, times) in &variants {
            let unit_rows: Vec<usize> = if variant_prefix.is_empty() {
                family_rows.clone()
            } else {
                family_rows
                    .iter()
                    .copied()
                    .filter(|&r| times.contains(&table.value(r, "time")))
                    .collect()
            };
            let prefix = format!("{variant_prefix}{}", spec.base);
            features.append(family_block(table, &unit_rows, &prefix, spec));
        }
    }

    let weekend = rows
        .iter()
        .any(|&r| table.value(r, "time") >= 3) as i64;

    let mut label = 0;
    if rows.iter().any(|&r| table.value(r, "mal_act") > 0) {
        let mut scenarios: Vec<i64> = rows
            .iter()
            .map(|&r| table.value(r, "insider"))
            .filter(|&s| s > 0)
            .collect();
        scenarios.sort_unstable();
        scenarios.dedup();
        match scenarios.as_slice() {
            [one] => label = *one,
            [] => {}
            _ => return Err(AmbiguousLabel { scenarios }),
        }
    }

    Ok(UnitFeatures {
        n_acts: rows.len(),
        weekend,
        features,
        label,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::RowMeta;

    fn meta(epoch: i64) -> RowMeta {
        RowMeta {
            act_id: format!("{{A{epoch}}}"),
            pc: "PC-1".to_string(),
            epoch,
        }
    }

    fn r4_table(rows: Vec<Vec<i64>>) -> NumTable {
        let columns = SchemaVersion::R4_2
            .numeric_columns()
            .into_iter()
            .map(String::from)
            .collect();
        let mut t = NumTable::new(columns);
        for (i, row) in rows.into_iter().enumerate() {
            t.push_row(row, meta(i as i64)).unwrap();
        }
        t
    }

    fn r4_row(act: i64, time: i64) -> Vec<i64> {
        let mut row = vec![0; SchemaVersion::R4_2.row_width()];
        row[2] = act;
        row[4] = time;
        row
    }

    #[test]
    fn header_is_stable_across_units() {
        let t = r4_table(vec![r4_row(1, 1), r4_row(5, 2)]);
        let a = f_calc(&t, &[0], Granularity::Week, SchemaVersion::R4_2).unwrap();
        let b = f_calc(&t, &[0, 1], Granularity::Week, SchemaVersion::R4_2).unwrap();
        assert_eq!(a.features.names(), b.features.names());
        assert!(a.features.len() > 100);
    }

    #[test]
    fn empty_family_reports_zero() {
        let t = r4_table(vec![r4_row(1, 1)]);
        let out = f_calc(&t, &[0], Granularity::Week, SchemaVersion::R4_2).unwrap();
        assert_eq!(out.features.get("n_email"), Some(0.0));
        assert_eq!(out.features.get("email_mean_email_size"), Some(0.0));
        assert_eq!(out.features.get("n_allact"), Some(1.0));
        assert_eq!(out.features.get("allact_n-pc0"), Some(1.0));
    }

    #[test]
    fn session_mode_drops_pc_counts() {
        let t = r4_table(vec![r4_row(1, 1)]);
        let out = f_calc(&t, &[0], Granularity::Session, SchemaVersion::R4_2).unwrap();
        assert!(out.features.names().iter().all(|n| !n.contains("n-pc")));
        // and only the unfiltered variant runs
        assert_eq!(out.features.get("workhourallact_n-pc0"), None);
        assert!(out.features.get("n_allact").is_some());
    }

    #[test]
    fn week_mode_buckets_split_counts() {
        let t = r4_table(vec![r4_row(1, 1), r4_row(1, 2), r4_row(1, 3)]);
        let out = f_calc(&t, &[0, 1, 2], Granularity::Week, SchemaVersion::R4_2).unwrap();
        assert_eq!(out.features.get("n_logon"), Some(3.0));
        assert_eq!(out.features.get("n_workhourlogon"), Some(1.0));
        assert_eq!(out.features.get("n_afterhourlogon"), Some(1.0));
        assert_eq!(out.features.get("n_weekendlogon"), Some(1.0));
        assert_eq!(out.weekend, 1);
    }

    #[test]
    fn file_type_splits_have_their_own_stats() {
        let mut doc = r4_row(7, 1);
        let t4 = SchemaVersion::R4_2;
        let cols = t4.numeric_columns();
        let idx = |name: &str| cols.iter().position(|c| *c == name).unwrap();
        doc[idx("file_type")] = 4;
        doc[idx("file_len")] = 10;
        let t = r4_table(vec![doc]);
        let out = f_calc(&t, &[0], Granularity::Week, t4).unwrap();
        assert_eq!(out.features.get("file_n_docf"), Some(1.0));
        assert_eq!(out.features.get("file_docf_mean_file_len"), Some(10.0));
        assert_eq!(out.features.get("file_n_compf"), Some(0.0));
        assert_eq!(out.features.get("file_compf_mean_file_len"), Some(0.0));
    }

    #[test]
    fn five_tuple_stats() {
        let t = r4_table(vec![r4_row(1, 1), r4_row(1, 1)]);
        // act column has values 1 and 1; use "time" with values 1,1 -> std 0.
        let (n, out) = stats_block(&t, &[0, 1], "x", &["act"], &[], true);
        assert_eq!(n, 2);
        assert_eq!(out.get("x_min_act"), Some(1.0));
        assert_eq!(out.get("x_med_act"), Some(1.0));
        assert_eq!(out.get("x_std_act"), Some(0.0));
    }

    #[test]
    fn even_median_averages_middles() {
        let mut v = vec![4.0, 1.0, 3.0, 2.0];
        assert_eq!(median(&mut v), 2.5);
    }

    #[test]
    fn label_from_malicious_rows() {
        let mut rows = vec![r4_row(1, 1), r4_row(1, 1)];
        let w = SchemaVersion::R4_2.row_width();
        rows[1][w - 2] = 1; // mal_act
        rows[1][w - 1] = 3; // insider
        let t = r4_table(rows);
        let out = f_calc(&t, &[0, 1], Granularity::Week, SchemaVersion::R4_2).unwrap();
        assert_eq!(out.label, 3);
    }

    #[test]
    fn mixed_scenarios_are_ambiguous() {
        let w = SchemaVersion::R4_2.row_width();
        let mut a = r4_row(1, 1);
        a[w - 2] = 1;
        a[w - 1] = 2;
        let mut b = r4_row(1, 1);
        b[w - 2] = 1;
        b[w - 1] = 3;
        let t = r4_table(vec![a, b]);
        assert!(f_calc(&t, &[0, 1], Granularity::Week, SchemaVersion::R4_2).is_err());
    }
}
