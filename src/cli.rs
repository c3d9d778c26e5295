//! Command-line surface
//!
//! `nvd-search [-c CVE | -k KEY] [-v VENDOR] [-p PRODUCT] [-n NVD]`
//!
//! At least one search parameter is required and `-c` excludes `-k`. Both
//! rules are enforced by clap before anything touches the network or disk.
//! Only the store location and the run options reach the synchronizer; the
//! search parameters are carried for the query layer.

use std::path::PathBuf;

use clap::builder::NonEmptyStringValueParser;
use clap::{ArgGroup, Parser};

use crate::config::Config;
use crate::error::Result;
use crate::utils::expand_home;

/// Store location used when neither `-n` nor the configuration file names one
pub const DEFAULT_STORE: &str = "~/.config/nvd-cli/db";

/// Arguments of the `nvd-search` binary
#[derive(Debug, Clone, Parser)]
#[command(
    name = "nvd-search",
    version,
    about = "Synchronize a local mirror of the NVD CVE feeds",
    group(
        ArgGroup::new("search")
            .required(true)
            .multiple(true)
            .args(["cve", "key", "vendor", "product"])
    )
)]
pub struct Cli {
    /// CVE identifier to look up
    #[arg(short = 'c', long, value_name = "CVE", conflicts_with = "key", value_parser = NonEmptyStringValueParser::new())]
    pub cve: Option<String>,

    /// Keyword to search descriptions for
    #[arg(short = 'k', long, value_name = "KEY", value_parser = NonEmptyStringValueParser::new())]
    pub key: Option<String>,

    /// Vendor name
    #[arg(short = 'v', long, value_name = "VENDOR", value_parser = NonEmptyStringValueParser::new())]
    pub vendor: Option<String>,

    /// Product name
    #[arg(short = 'p', long, value_name = "PRODUCT", value_parser = NonEmptyStringValueParser::new())]
    pub product: Option<String>,

    /// Local store directory [default: ~/.config/nvd-cli/db]
    #[arg(short = 'n', long = "nvd", value_name = "NVD")]
    pub nvd: Option<PathBuf>,

    /// JSON configuration file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Re-download every annual artifact and rebuild the dataset
    #[arg(long)]
    pub full: bool,
}

/// Search parameters of one invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchRequest {
    /// CVE identifier
    pub cve: Option<String>,
    /// Description keyword
    pub keyword: Option<String>,
    /// Vendor name
    pub vendor: Option<String>,
    /// Product name
    pub product: Option<String>,
}

impl Cli {
    /// Search parameters, detached from the run options
    pub fn search(&self) -> SearchRequest {
        SearchRequest {
            cve: self.cve.clone(),
            keyword: self.key.clone(),
            vendor: self.vendor.clone(),
            product: self.product.clone(),
        }
    }

    /// Configuration for this invocation.
    ///
    /// Starts from `--config` when given, otherwise from defaults. `-n`
    /// overrides the store location of either.
    ///
    /// # Errors
    /// Returns error if the configuration file cannot be read or is invalid
    pub fn load_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };

        if let Some(nvd) = &self.nvd {
            config.store.path = nvd.clone();
        }
        config.store.path = expand_home(&config.store.path);

        Ok(config)
    }
}
