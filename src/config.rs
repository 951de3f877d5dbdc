// Copyright 2024 Simo Sorce
// See LICENSE.txt file for terms

//! Engine configuration. Controls which software mechanisms get
//! registered at token initialization; operation semantics are never
//! configuration dependent.

use std::env;
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::pkcs11::*;

use serde::de;
use serde::{Deserialize, Serialize};
use toml;

#[cfg(not(test))]
const DEFAULT_CONF_DIR: &str = {
    match option_env!("CONFDIR") {
        Some(p) => p,
        None => "/usr/local/etc",
    }
};
#[cfg(test)]
const DEFAULT_CONF_DIR: &str = "test";

/// Default configuration file name.
pub const DEFAULT_CONF_NAME: &str = "engine.conf";

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Software hash mechanisms to register; all of them when unset.
    #[serde(default)]
    pub hashes: Option<Vec<String>>,
}

fn config_error<E: de::Error + Send + Sync + 'static>(error: E) -> Error {
    Error::ck_rv_from_error(CKR_ARGUMENTS_BAD, error)
}

impl Config {
    /// A configuration enabling everything.
    pub fn new() -> Config {
        Config { hashes: None }
    }

    /// Locates the configuration file: the `MEKHANE_CONF` environment
    /// variable has the highest precedence, then the freedesktop config
    /// directory, then `$HOME/.config`, then the system directory.
    pub fn find_conf() -> Result<String> {
        match env::var("MEKHANE_CONF") {
            Ok(var) => return Ok(var),
            Err(_) => (),
        }
        let datafile = match env::var("XDG_CONFIG_HOME") {
            Ok(xdg) => format!("{}/mekhane/{}", xdg, DEFAULT_CONF_NAME),
            Err(_) => match env::var("HOME") {
                Ok(home) => {
                    format!("{}/.config/mekhane/{}", home, DEFAULT_CONF_NAME)
                }
                Err(_) => {
                    format!("{}/mekhane/{}", DEFAULT_CONF_DIR, DEFAULT_CONF_NAME)
                }
            },
        };
        if Path::new(&datafile).is_file() {
            Ok(datafile)
        } else {
            Err(Error::ck_rv(CKR_ARGUMENTS_BAD))
        }
    }

    /// Parses a configuration file.
    pub fn from_file(filename: &str) -> Result<Config> {
        let config_str = fs::read_to_string(filename)?;
        let conf: Config = toml::from_str(&config_str).map_err(config_error)?;
        Ok(conf)
    }

    /// Whether the named hash mechanism should be registered.
    pub fn hash_enabled(&self, name: &str) -> bool {
        match &self.hashes {
            None => true,
            Some(list) => list.iter().any(|h| h == name),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::new()
    }
}
