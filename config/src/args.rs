use clap::Parser;
use std::{
    collections::HashMap,
    net::SocketAddr,
    path::PathBuf,
};

/// NetScaler Nitro stats exporter
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to a YAML config file layered over the defaults and the user config dir.
    #[arg(long, env = "NITRO_EXPORTER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address the `/metrics` endpoint listens on.
    #[arg(long, env = "NITRO_EXPORTER_LISTEN_ADDRESS")]
    pub listen_address: Option<SocketAddr>,

    /// Enable debug logging.
    #[arg(short, long)]
    pub verbose: bool,
}

impl config::Source for Args {
    fn clone_into_box(&self) -> Box<dyn config::Source + Send + Sync> {
        Box::new((*self).clone())
    }

    fn collect(&self) -> Result<config::Map<String, config::Value>, config::ConfigError> {
        let mut cache = HashMap::<String, config::Value>::new();
        if let Some(address) = &self.listen_address {
            cache.insert("listen_address".to_string(), address.to_string().into());
        }
        // Only an explicit flag overrides the file, `false` means "not given".
        if self.verbose {
            cache.insert("verbose".to_string(), true.into());
        }
        Ok(cache)
    }
}
