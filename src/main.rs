//! Certgrid turns a raw CERT insider-threat corpus release into model-ready
//! feature CSVs: per-event numeric encoding, logon-session reconstruction,
//! week/day/session aggregation and causal temporal representations.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use log::{error, info};

use crate::aggregate::Granularity;
use crate::assemble::{Assembler, SubsessionSpec};
use crate::config::Config;
use crate::csvwriter::CsvWriter;
use crate::directory::{OrgCatalog, UserDirectory};
use crate::ingest::WeekStream;
use crate::logging::Logging;
use crate::tables::FeatureTable;
use crate::temporal::{TemporalRep, TimeAxis};
use crate::worker::{fan_out, ArtifactStore, PipelineError, RunManifest};

mod aggregate;
mod assemble;
mod config;
mod csvwriter;
mod directory;
mod domains;
mod encoders;
mod extensions;
mod ingest;
mod logging;
mod merge;
mod numericize;
mod schema;
mod sessions;
mod tables;
mod temporal;
mod timeutil;
mod worker;

fn main() {
    //https://patorjk.com/software/taag/#p=display&f=Bloody&t=Certgrid
    let banner = r#"

  ▄████▄  ▓█████  ██▀███  ▄▄▄█████▓  ▄████  ██▀███   ██▓▓█████▄
 ▒██▀ ▀█  ▓█   ▀ ▓██ ▒ ██▒▓  ██▒ ▓▒ ██▒ ▀█▒▓██ ▒ ██▒▓██▒▒██▀ ██▌
 ▒▓█    ▄ ▒███   ▓██ ░▄█ ▒▒ ▓██░ ▒░▒██░▄▄▄░▓██ ░▄█ ▒▒██▒░██   █▌
 ▒▓▓▄ ▄██▒▒▓█  ▄ ▒██▀▀█▄  ░ ▓██▓ ░ ░▓█  ██▓▒██▀▀█▄  ░██░░▓█▄   ▌
 ▒ ▓███▀ ░░▒████▒░██▓ ▒██▒  ▒██▒ ░ ░▒▓███▀▒░██▓ ▒██▒░██░░▒████▓
 ░ ░▒ ▒  ░░░ ▒░ ░░ ▒▓ ░▒▓░  ▒ ░░    ░▒   ▒ ░ ▒▓ ░▒▓░░▓   ▒▒▓  ▒
   ░  ▒    ░ ░  ░  ░▒ ░ ▒░    ░      ░   ░   ░▒ ░ ▒░ ▒ ░ ░ ▒  ▒
 ░           ░     ░░   ░   ░      ░ ░   ░   ░░   ░  ▒ ░ ░ ░  ░
 ░ ░         ░  ░   ░                    ░    ░      ░     ░
 ░                                                       ░

    "#;
    println!("{}", banner);

    if let Err(e) = run() {
        Logging::error(&e.to_string());
        error!("{e}");
        eprintln!("certgrid: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), PipelineError> {
    std::panic::set_hook(Box::new(|pi| {
        error!("Critical error: {}", pi);
        println!("{}", pi);
    }));
    env_logger::init();
    info!("Program started.");

    let config_path = env::args().nth(1).unwrap_or_else(|| String::from("config.ini"));
    let config = if Path::new(&config_path).exists() {
        Config::load(Path::new(&config_path))?
    } else {
        info!("{config_path} not found, running on defaults");
        Config::defaults()
    };
    let version = config.version()?;
    let cores = config.num_cores();
    let output_dir = config.output_dir();
    fs::create_dir_all(&output_dir)?;
    Logging::init(&PathBuf::from(&config[config::Param::LogDir]));
    Logging::start();
    info!("dataset {version}, {cores} workers");

    let store = ArtifactStore::open(config.work_dir())?;

    // Phase 1: merge the corpus chronologically and store one raw artifact
    // per week.
    let mut stream = WeekStream::open(&config.corpus_dir(), version)?;
    let anchors = stream.anchors;
    let mut weeks: Vec<i64> = Vec::new();
    for (week, records) in stream.by_ref() {
        if week >= version.max_weeks() {
            Logging::alert(&format!(
                "records past week {} ignored ({} in week {week})",
                version.max_weeks() - 1,
                records.len()
            ));
            break;
        }
        store.write_raw_week(week, &records)?;
        weeks.push(week);
    }
    info!("{} weeks ingested", weeks.len());

    // Phase 2: the user directory needs the first two weeks on disk before
    // any numericization starts, since PC ownership is mined from them.
    let mut dir = UserDirectory::from_ldap(&config.corpus_dir(), version)?;
    dir.load_psychometric(&config.corpus_dir())?;
    dir.load_ground_truth(&config.corpus_dir(), version)?;
    let week0 = read_week_or_empty(&store, &weeks, 0)?;
    let week1 = read_week_or_empty(&store, &weeks, 1)?;
    dir.assign_pcs(&week0, &week1);
    let org = OrgCatalog::build(&dir, version);
    info!("{} users in directory", dir.len());

    // Phase 3: numericize every week on the worker pool.
    let numericized = fan_out(weeks.clone(), cores, |week| -> Result<i64, PipelineError> {
        let records = store.read_raw_week(week)?;
        let table = numericize::numericize_week(&records, &dir, &anchors, version)?;
        store.write_num_week(week, &table)?;
        Ok(week)
    });
    for r in numericized {
        r?;
    }
    info!("numericization done");

    // Phase 4: granularity passes, weeks appended in order.
    let modes = config.modes()?;
    let subsessions = config.subsessions()?;
    let mut outputs: Vec<String> = Vec::new();
    let mut week_table: Option<FeatureTable> = None;
    let mut day_table: Option<FeatureTable> = None;
    for &mode in &modes {
        match mode {
            Granularity::Week | Granularity::Day => {
                // Week windows open at the first full week; week 0 is only
                // the ownership-scan prefix.
                let todo: Vec<i64> = weeks
                    .iter()
                    .copied()
                    .filter(|&w| mode == Granularity::Day || w >= 1)
                    .collect();
                let parts = fan_out(todo, cores, |week| -> Result<FeatureTable, PipelineError> {
                    let table = store.read_num_week(week)?;
                    let asm = Assembler::new(&table, &dir, &org, version, week);
                    Ok(match mode {
                        Granularity::Week => asm.week_units()?,
                        _ => asm.day_units()?,
                    })
                });
                let merged = merge_parts(parts)?;
                let name = format!("{mode}-{version}.csv");
                write_output(&output_dir, &name, &merged)?;
                outputs.push(name);
                match mode {
                    Granularity::Week => week_table = Some(merged),
                    _ => day_table = Some(merged),
                }
            }
            Granularity::Session => {
                let specs = subsessions.clone();
                let parts = fan_out(weeks.clone(), cores, |week| {
                    session_week(&store, &dir, &org, version, week, &specs)
                });
                let mut merged: Option<FeatureTable> = None;
                let mut sub_merged: Vec<Option<FeatureTable>> = vec![None; subsessions.len()];
                for part in parts {
                    let (table, subs) = part?;
                    append_part(&mut merged, table)?;
                    for (slot, (_, t)) in sub_merged.iter_mut().zip(subs) {
                        append_part(slot, t)?;
                    }
                }
                let name = format!("session-{version}.csv");
                write_output(&output_dir, &name, &unwrap_table(merged))?;
                outputs.push(name);
                for (spec, slot) in subsessions.iter().zip(sub_merged) {
                    let name = format!("session-{}-{version}.csv", spec.label());
                    write_output(&output_dir, &name, &unwrap_table(slot))?;
                    outputs.push(name);
                }
            }
        }
        info!("{mode} pass done");
    }

    // Phase 5: temporal representations over the week and day tables, users
    // partitioned across the pool.
    let temporal_modes = config.temporal_modes()?;
    let lag_window = config.lag_window()?;
    let window_days = config.diff_window_days()?;
    for (axis, data, mode_name) in [
        (TimeAxis::Week, &week_table, "week"),
        (TimeAxis::Day, &day_table, "day"),
    ] {
        let Some(data) = data else {
            continue;
        };
        for &rep in &temporal_modes {
            let parts = temporal::partition_users(data, cores)?;
            let transformed = fan_out(parts, cores, |part| -> Result<FeatureTable, PipelineError> {
                Ok(match rep {
                    TemporalRep::Concat => temporal::concat_lags(&part, lag_window)?,
                    _ => temporal::window_transform(&part, axis, rep, window_days)?,
                })
            });
            let merged = merge_parts(transformed)?;
            let param = match rep {
                TemporalRep::Concat => lag_window as i64,
                _ => window_days,
            };
            let name = format!("{mode_name}-{rep}{param}-{version}.csv");
            write_output(&output_dir, &name, &merged)?;
            outputs.push(name);
            info!("{mode_name} {rep} pass done");
        }
    }

    let manifest = RunManifest {
        version: version.to_string(),
        day_anchor: anchors.day_anchor.to_string(),
        week_anchor: anchors.week_anchor.to_string(),
        modes: modes.iter().map(|m| m.to_string()).collect(),
        temporal_modes: temporal_modes.iter().map(|m| m.to_string()).collect(),
        lag_window,
        diff_window_days: window_days,
        subsessions: subsessions.iter().map(SubsessionSpec::label).collect(),
        weeks,
        n_users: dir.len(),
        org_values: org.value_maps(),
        outputs,
    };
    store.write_manifest(&manifest)?;

    Logging::stop();
    info!("Program finished.");
    Ok(())
}

fn read_week_or_empty(
    store: &ArtifactStore,
    weeks: &[i64],
    week: i64,
) -> Result<Vec<crate::ingest::ActivityRecord>, PipelineError> {
    if weeks.contains(&week) {
        store.read_raw_week(week)
    } else {
        Ok(Vec::new())
    }
}

fn session_week(
    store: &ArtifactStore,
    dir: &UserDirectory,
    org: &OrgCatalog,
    version: crate::schema::SchemaVersion,
    week: i64,
    specs: &[SubsessionSpec],
) -> Result<(FeatureTable, Vec<(SubsessionSpec, FeatureTable)>), PipelineError> {
    let table = store.read_num_week(week)?;
    let asm = Assembler::new(&table, dir, org, version, week);
    Ok(asm.session_units(specs)?)
}

fn unwrap_table(t: Option<FeatureTable>) -> FeatureTable {
    t.unwrap_or_else(|| FeatureTable::new(Vec::new()))
}

/// Appends `part` onto `acc`, adopting its header on first use.
fn append_part(acc: &mut Option<FeatureTable>, part: FeatureTable) -> Result<(), PipelineError> {
    if part.is_empty() {
        return Ok(());
    }
    match acc {
        None => *acc = Some(part),
        Some(t) => {
            for row in part.rows {
                t.push_values(row)?;
            }
        }
    }
    Ok(())
}

fn merge_parts(
    parts: Vec<Result<FeatureTable, PipelineError>>,
) -> Result<FeatureTable, PipelineError> {
    let mut acc: Option<FeatureTable> = None;
    for part in parts {
        append_part(&mut acc, part?)?;
    }
    Ok(unwrap_table(acc))
}

/// Replaces any stale file from a previous run, then writes header and rows.
fn write_output(dir: &Path, name: &str, table: &FeatureTable) -> Result<(), PipelineError> {
    let path = dir.join(name);
    let _ = fs::remove_file(&path);
    let mut writer = CsvWriter::from_path(&path);
    writer.write_table(table)?;
    info!("{} rows written to {}", table.len(), path.display());
    Ok(())
}
