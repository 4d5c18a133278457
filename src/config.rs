//! Run configuration, loaded from an ini file. Every parameter has a default,
//! so a minimal file only names the corpus directory and dataset version.

use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::ops::Index;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use configparser::ini::Ini;
use strum::IntoEnumIterator;
use strum_macros::EnumIter;
use sysinfo::{System, SystemExt};

use crate::aggregate::Granularity;
use crate::assemble::{SubsessionMode, SubsessionSpec};
use crate::schema::SchemaVersion;
use crate::temporal::TemporalRep;

const SECTION: &str = "certgrid";

#[derive(Debug, EnumIter, PartialEq, Eq, Hash, Clone)]
pub enum Param {
    CorpusDir,
    WorkDir,
    OutputDir,
    LogDir,
    NumVersion,
    NumCores,
    Modes,
    TemporalModes,
    LagWindow,
    DiffWindowDays,
    SubsessionTime,
    SubsessionNact,
}

impl Param {
    fn convert_to_str(param: &Param) -> &'static str {
        match param {
            Param::CorpusDir => "corpus_dir",
            Param::WorkDir => "work_dir", // per-week artifacts + manifest
            Param::OutputDir => "output_dir",
            Param::LogDir => "log_dir",
            Param::NumVersion => "num_version", // r4.1 .. r6.2
            Param::NumCores => "num_cores",     // empty = all logical CPUs
            Param::Modes => "modes",
            Param::TemporalModes => "temporal_modes",
            Param::LagWindow => "lag_window",
            Param::DiffWindowDays => "diff_window_days",
            Param::SubsessionTime => "subsession_time", // minutes, comma list
            Param::SubsessionNact => "subsession_nact", // activity counts
        }
    }

    fn default(param: &Param) -> &str {
        match param {
            Param::CorpusDir => ".",
            Param::WorkDir => "work",
            Param::OutputDir => "output",
            Param::LogDir => ".",
            Param::NumVersion => "r4.2",
            Param::NumCores => "",
            Param::Modes => "week,day,session",
            Param::TemporalModes => "percentile",
            Param::LagWindow => "3",
            Param::DiffWindowDays => "30",
            Param::SubsessionTime => "120,240",
            Param::SubsessionNact => "25,50",
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Load(String),
    BadValue { key: &'static str, value: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Load(e) => write!(f, "cannot load configuration: {e}"),
            ConfigError::BadValue { key, value } => {
                write!(f, "bad value '{value}' for {key}")
            }
        }
    }
}

impl Error for ConfigError {}

#[derive(Debug)]
pub struct Config {
    params: HashMap<Param, String>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let mut ini = Ini::new();
        ini.load(path).map_err(ConfigError::Load)?;
        let mut params: HashMap<Param, String> = HashMap::new();
        for param in Param::iter() {
            let key = Param::convert_to_str(&param);
            let val = ini
                .get(SECTION, key)
                .unwrap_or_else(|| Param::default(&param).to_string());
            params.insert(param, val);
        }
        Ok(Config { params })
    }

    /// All defaults; corpus dir is the working directory.
    pub fn defaults() -> Config {
        let params = Param::iter()
            .map(|p| {
                let d = Param::default(&p).to_string();
                (p, d)
            })
            .collect();
        Config { params }
    }

    pub fn corpus_dir(&self) -> PathBuf {
        PathBuf::from(&self[Param::CorpusDir])
    }

    pub fn work_dir(&self) -> PathBuf {
        PathBuf::from(&self[Param::WorkDir])
    }

    pub fn output_dir(&self) -> PathBuf {
        PathBuf::from(&self[Param::OutputDir])
    }

    pub fn version(&self) -> Result<SchemaVersion, ConfigError> {
        SchemaVersion::from_str(&self[Param::NumVersion]).map_err(|_| ConfigError::BadValue {
            key: Param::convert_to_str(&Param::NumVersion),
            value: self[Param::NumVersion].clone(),
        })
    }

    pub fn num_cores(&self) -> usize {
        match self[Param::NumCores].parse::<usize>() {
            Ok(n) if n > 0 => n,
            _ => {
                let mut sys = System::new();
                sys.refresh_cpu();
                sys.cpus().len().max(1)
            }
        }
    }

    pub fn modes(&self) -> Result<Vec<Granularity>, ConfigError> {
        self.parse_list(Param::Modes, Granularity::from_str)
    }

    pub fn temporal_modes(&self) -> Result<Vec<TemporalRep>, ConfigError> {
        self.parse_list(Param::TemporalModes, TemporalRep::from_str)
    }

    pub fn lag_window(&self) -> Result<usize, ConfigError> {
        self.parse_num(Param::LagWindow)
    }

    pub fn diff_window_days(&self) -> Result<i64, ConfigError> {
        self.parse_num(Param::DiffWindowDays)
    }

    /// Subsession chunking specs, time chunks first.
    pub fn subsessions(&self) -> Result<Vec<SubsessionSpec>, ConfigError> {
        let mut specs = Vec::new();
        for param in self.parse_list::<i64, _>(Param::SubsessionTime, str::parse)? {
            specs.push(SubsessionSpec {
                mode: SubsessionMode::Time,
                param,
            });
        }
        for param in self.parse_list::<i64, _>(Param::SubsessionNact, str::parse)? {
            specs.push(SubsessionSpec {
                mode: SubsessionMode::Nact,
                param,
            });
        }
        Ok(specs)
    }

    fn parse_list<T, E>(
        &self,
        param: Param,
        parse: impl Fn(&str) -> Result<T, E>,
    ) -> Result<Vec<T>, ConfigError> {
        let key = Param::convert_to_str(&param);
        self[param.clone()]
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                parse(s).map_err(|_| ConfigError::BadValue {
                    key,
                    value: s.to_string(),
                })
            })
            .collect()
    }

    fn parse_num<T: FromStr>(&self, param: Param) -> Result<T, ConfigError> {
        let key = Param::convert_to_str(&param);
        self[param.clone()].trim().parse().map_err(|_| ConfigError::BadValue {
            key,
            value: self[param].clone(),
        })
    }
}

impl Index<Param> for Config {
    type Output = String;

    fn index(&self, index: Param) -> &Self::Output {
        &self.params[&index]
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn defaults_parse() {
        let c = Config::defaults();
        assert_eq!(c.version().unwrap(), SchemaVersion::R4_2);
        assert_eq!(
            c.modes().unwrap(),
            vec![Granularity::Week, Granularity::Day, Granularity::Session]
        );
        assert_eq!(c.lag_window().unwrap(), 3);
        assert_eq!(c.diff_window_days().unwrap(), 30);
        assert_eq!(c.subsessions().unwrap().len(), 4);
        assert!(c.num_cores() >= 1);
    }

    #[test]
    fn ini_overrides_defaults() {
        let path = std::env::temp_dir().join("certgrid_config_test.ini");
        fs::write(
            &path,
            "[certgrid]\nnum_version = r5.2\nmodes = session\ntemporal_modes = concat, meandiff\nsubsession_nact =\n",
        )
        .unwrap();
        let c = Config::load(&path).unwrap();
        assert_eq!(c.version().unwrap(), SchemaVersion::R5_2);
        assert_eq!(c.modes().unwrap(), vec![Granularity::Session]);
        assert_eq!(
            c.temporal_modes().unwrap(),
            vec![TemporalRep::Concat, TemporalRep::MeanDiff]
        );
        // nact cleared, time defaults stay
        assert_eq!(c.subsessions().unwrap().len(), 2);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn bad_version_is_an_error() {
        let path = std::env::temp_dir().join("certgrid_config_bad.ini");
        fs::write(&path, "[certgrid]\nnum_version = r9.9\n").unwrap();
        let c = Config::load(&path).unwrap();
        assert!(c.version().is_err());
        fs::remove_file(&path).unwrap();
    }
}
