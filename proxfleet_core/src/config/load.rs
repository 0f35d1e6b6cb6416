use super::{ProxfleetConfig, CONFIG_DIR};

// Config
use std::fs;
use std::path::{Path, PathBuf};

// Error Handling
use log::info;
use proxfleet_error::{CastError, ProxfleetError, TomlError, WrapError};

impl ProxfleetConfig {
    /*
     * Get config from crate directory
     */
    fn debug_path() -> PathBuf {
        let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        path.push("./proxfleet.config.toml");
        return path;
    }
    /*
     * Get config from FHS path.
     */
    fn release_path() -> PathBuf {
        let mut path = PathBuf::from(CONFIG_DIR);
        path.push("config.toml");
        return path;
    }
    /// Load the config from an explicit path,
    /// or from the default location of the build profile.
    pub fn get(path: Option<&Path>) -> Result<Self, ProxfleetError> {
        let path = match path {
            Some(path) => path.to_owned(),
            None => {
                #[cfg(debug_assertions)]
                let path = Self::debug_path();

                #[cfg(not(debug_assertions))]
                let path = Self::release_path();

                path
            }
        };
        info!("Search config file at {}.", path.display());
        let config = Self::from_file(&path)?;
        config.check()?;
        Ok(config)
    }
    pub fn from_file(path: &Path) -> Result<Self, ProxfleetError> {
        let string = match fs::read_to_string(path) {
            Ok(v) => v,
            Err(e) => {
                let message = format!("Couldn't read config file {:?}", path.display().to_string());
                let help = "Pass a configuration file with --config, or create the default one.";
                return Err(WrapError::builder()
                    .msg(&message)
                    .help(help)
                    .origin(ProxfleetError::from(e).into())
                    .build()
                    .into());
            }
        };
        Self::from_toml(&string)
    }
    pub fn from_toml(string: &str) -> Result<Self, ProxfleetError> {
        let res = toml::from_str::<Self>(&string);
        let item = match res {
            Ok(res) => res,
            Err(e) => {
                let err = CastError::TomlError(TomlError::new(e, &string));
                return Err(err.into());
            }
        };
        Ok(item)
    }
}
