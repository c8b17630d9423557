#[macro_use]
extern crate tracing;

mod app_config;
mod args;
mod lbserver_config;

use app_config::AppConfig;
pub use app_config::get_config_dir;
pub use args::Args;
use eyre::{
    eyre,
    Result,
};
pub use lbserver_config::LbServerConfig;
use serde::{
    Deserialize,
    Serialize,
};
use std::net::SocketAddr;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(flatten, skip_serializing)]
    pub app_config: AppConfig,
    pub listen_address: SocketAddr,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub lbservers: Vec<LbServerConfig>,
}

const DEFAULT_CONFIG: &str = include_str!("default-config.yaml");

impl Config {
    /// Layers, lowest precedence first: the embedded defaults, `config.yaml`
    /// in the config dir, the file passed with `--config`, then the CLI flags.
    pub fn new(args: Args) -> Result<Self, config::ConfigError> {
        let config_dir = get_config_dir();
        let mut builder = config::Config::builder()
            .set_default("config_dir", config_dir.to_string_lossy().to_string())?
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Yaml));

        let config_files = [("config.yaml", config::FileFormat::Yaml)];

        for (file, format) in &config_files {
            let source = config::File::from(config_dir.join(file))
                .format(*format)
                .required(false);
            builder = builder.add_source(source);
        }

        if let Some(path) = &args.config {
            debug!(?path, "Adding config file from args");
            builder = builder.add_source(config::File::from(path.clone()).format(config::FileFormat::Yaml));
        }

        builder = builder.add_source(args);

        builder.build()?.try_deserialize()
    }

    /// Builds a config from the embedded defaults and a YAML document only.
    pub fn from_yaml(content: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Yaml))
            .add_source(config::File::from_str(content, config::FileFormat::Yaml))
            .build()?
            .try_deserialize()
    }

    pub fn validate(&self) -> Result<()> {
        if self.lbservers.is_empty() {
            return Err(eyre!("config.lbservers must be non-empty"));
        }
        for lbserver in &self.lbservers {
            lbserver.validate()?;
        }
        Ok(())
    }
}
