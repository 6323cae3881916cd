use std::path::PathBuf;

use config_rs::{builder::DefaultState, Config, ConfigBuilder, Environment, File};
use serde::Deserialize;
use t2t_core::{daemon::DEFAULT_REOPEN_AFTER, error::T2tBuildError};
use t2t_devices::devices::pca9685::{check_oscillator, Pca9685DeviceConfig};

pub const DEFAULT_FIFO_PATH: &str = "/tmp/text2type-pipe";
pub const DEFAULT_CHUNK_SIZE: usize = 1024;
pub const ENV_PREFIX: &str = "T2T";

///Top level daemon configuration. Every section is optional.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct T2tConfig {
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub fifo: FifoConfig,
    #[serde(default)]
    pub actuator: Pca9685DeviceConfig,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct Metadata {
    pub name: Option<String>,
    pub description: Option<String>,
}

///Where the byte stream comes from and how it is read.
#[derive(Deserialize, Debug, Clone)]
pub struct FifoConfig {
    #[serde(default = "default_path")]
    pub path: PathBuf,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_create")]
    pub create: bool,
    #[serde(default)]
    pub remove_on_exit: bool,
    ///consecutive read errors before the source is reopened and the actuator reset. 0 disables the restart.
    #[serde(default = "default_reopen_after")]
    pub reopen_after: u32,
}

fn default_path() -> PathBuf {
    PathBuf::from(DEFAULT_FIFO_PATH)
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_create() -> bool {
    true
}

fn default_reopen_after() -> u32 {
    DEFAULT_REOPEN_AFTER
}

impl Default for FifoConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            chunk_size: default_chunk_size(),
            create: default_create(),
            remove_on_exit: false,
            reopen_after: default_reopen_after(),
        }
    }
}

///`T2T__SECTION__FIELD` variables, e.g. `T2T__FIFO__PATH` or `T2T__ACTUATOR__I2C_BUS`.
pub fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}

impl T2tConfig {
    ///Load the optional yaml file at `path`, then apply environment overrides.
    pub fn load(path: Option<&str>) -> Result<Self, T2tBuildError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path));
        }
        Self::from_builder(builder.add_source(environment()))
    }

    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, T2tBuildError> {
        let config = builder
            .build()
            .and_then(|config| config.try_deserialize::<T2tConfig>())
            .map_err(|err| T2tBuildError::new(format!("failed to parse config: {}", err)))?;

        let mut errs = Vec::new();
        if config.fifo.chunk_size == 0 {
            errs.push("fifo.chunk_size must be at least 1".to_string());
        }
        if config.actuator.i2c_address > 0x7F {
            errs.push(format!(
                "actuator.i2c_address 0x{:02x} is not a 7-bit address",
                config.actuator.i2c_address
            ));
        }
        if let Err(err) = check_oscillator(config.actuator.oscillator_hz) {
            errs.push(format!("actuator.oscillator_hz: {}", err));
        }
        if errs.is_empty() {
            Ok(config)
        } else {
            Err(T2tBuildError::from_problems(errs))
        }
    }
}
