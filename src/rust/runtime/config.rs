// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::fail::Fail;
use ::std::{
    fs::File,
    io::Read,
    ops::Index,
    str::FromStr,
};
use ::yaml_rust::{
    Yaml,
    YamlLoader,
};

//======================================================================================================================
// Constants
//======================================================================================================================

// Scheduler options.
mod scheduler_config {
    pub const SECTION_NAME: &str = "scheduler";
    // Cap on how many times a single handle may resume its bodies within one tick.
    pub const MAX_RESUMES_PER_TICK: &str = "max_resumes_per_tick";
    // Preallocated size of the active and pending sets.
    pub const INITIAL_CAPACITY: &str = "initial_capacity";
}

/// Default cap on same-tick resumptions of a single handle.
pub const DEFAULT_MAX_RESUMES_PER_TICK: usize = 1024;

/// Default preallocated size of the scheduler sets.
pub const DEFAULT_INITIAL_CAPACITY: usize = 64;

//======================================================================================================================
// Structures
//======================================================================================================================

/// Scheduler configuration file.
#[derive(Clone, Debug)]
pub struct Config(pub Yaml);

/// Typed view over the `scheduler` section.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// How many bodies a handle may resume within one tick before it is forcibly suspended until the next one.
    pub max_resumes_per_tick: usize,
    /// Preallocated size of the active and pending sets.
    pub initial_capacity: usize,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl Config {
    /// Reads a configuration file into a [Config] object.
    pub fn new(config_path: &str) -> Result<Self, Fail> {
        let mut config_s: String = String::new();
        File::open(config_path)?.read_to_string(&mut config_s)?;
        Self::from_yaml_str(&config_s)
    }

    /// Parses a configuration document.
    pub fn from_yaml_str(config_s: &str) -> Result<Self, Fail> {
        let config: Vec<Yaml> = YamlLoader::load_from_str(config_s)?;
        let config_obj: &Yaml = match &config[..] {
            &[ref c] => c,
            _ => return Err(Fail::new(libc::EINVAL, "Wrong number of config objects")),
        };
        Ok(Self(config_obj.clone()))
    }

    /// Reads the scheduler section. Missing options fall back to their defaults, environment variables named after
    /// the upper-cased option override the file.
    pub fn scheduler(&self) -> Result<SchedulerConfig, Fail> {
        let section: Option<&Yaml> = Self::get_optional_subsection(&self.0, scheduler_config::SECTION_NAME)?;
        let max_resumes_per_tick: usize = Self::get_int_or_default(
            section,
            scheduler_config::MAX_RESUMES_PER_TICK,
            DEFAULT_MAX_RESUMES_PER_TICK,
        )?;
        if max_resumes_per_tick == 0 {
            let cause: String = format!("{} must be positive", scheduler_config::MAX_RESUMES_PER_TICK);
            error!("scheduler(): {}", cause);
            return Err(Fail::new(libc::EINVAL, &cause));
        }
        let initial_capacity: usize =
            Self::get_int_or_default(section, scheduler_config::INITIAL_CAPACITY, DEFAULT_INITIAL_CAPACITY)?;
        Ok(SchedulerConfig {
            max_resumes_per_tick,
            initial_capacity,
        })
    }

    //======================================================================================================================
    // Static Functions
    //======================================================================================================================

    /// Looks up a subsection that is allowed to be absent.
    fn get_optional_subsection<'a>(yaml: &'a Yaml, index: &str) -> Result<Option<&'a Yaml>, Fail> {
        match yaml.index(index) {
            Yaml::BadValue | Yaml::Null => Ok(None),
            section @ Yaml::Hash(_) => Ok(Some(section)),
            _ => {
                let message: String = format!("parameter \"{}\" has unexpected type", index);
                Err(Fail::new(libc::EINVAL, message.as_str()))
            },
        }
    }

    /// Resolves an integer option from the environment, then the section, then the default.
    fn get_int_or_default<T: TryFrom<i64> + FromStr>(
        section: Option<&Yaml>,
        index: &str,
        default: T,
    ) -> Result<T, Fail> {
        if let Some(value) = Self::get_typed_env_option(index)? {
            return Ok(value);
        }
        let yaml: &Yaml = match section {
            Some(yaml) => yaml,
            None => return Ok(default),
        };
        match yaml.index(index) {
            Yaml::BadValue => Ok(default),
            Yaml::Integer(val) => match T::try_from(*val) {
                Ok(val) => Ok(val),
                _ => {
                    let message: String = format!("parameter \"{}\" is out of range", index);
                    Err(Fail::new(libc::ERANGE, message.as_str()))
                },
            },
            _ => {
                let message: String = format!("parameter {} has unexpected type", index);
                Err(Fail::new(libc::EINVAL, message.as_str()))
            },
        }
    }

    /// Get value where the environment value overrides the config file if it exists.
    fn get_typed_env_option<T: FromStr>(index: &str) -> Result<Option<T>, Fail> {
        if let Ok(var) = ::std::env::var(index.to_uppercase()) {
            if let Ok(value) = var.as_str().parse() {
                return Ok(Some(value));
            } else {
                let message: String = format!("parameter {} has unexpected type", index);
                return Err(Fail::new(libc::EINVAL, message.as_str()));
            }
        }
        Ok(None)
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_resumes_per_tick: DEFAULT_MAX_RESUMES_PER_TICK,
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
        }
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
