//! Configuration de l'application, chargée une seule fois au démarrage.
//!
//! Les bornes de validation sont vérifiées ici : le validateur ne reçoit
//! jamais une table mal formée.

use std::{
    fs,
    io::{self, ErrorKind::NotFound},
    path::{Path, PathBuf},
};

use derive_more::Display;
use log::info;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fichier de configuration par défaut
pub const CONFIG_FILE: &str = "bloodlink.yaml";

/// Variable d'environnement permettant de choisir un autre fichier
pub const CONFIG_ENV: &str = "BLOODLINK_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read configuration: {0}")]
    Io(#[from] io::Error),

    #[error("Malformed configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Inverted bounds for {field}: minLength {min} > maxLength {max}")]
    InvertedBounds {
        field: BoundedField,
        min: usize,
        max: usize,
    },
}

/// Champ dont la longueur est bornée
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum BoundedField {
    #[display("password")]
    Password,
    #[display("phone")]
    Phone,
    #[display("name")]
    Name,
}

/// Bornes inclusives sur une longueur
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LengthBounds {
    pub min_length: usize,
    pub max_length: usize,
}

impl LengthBounds {
    pub const fn new(min_length: usize, max_length: usize) -> Self {
        Self {
            min_length,
            max_length,
        }
    }

    /// `min_length <= len <= max_length`
    pub fn contains(&self, len: usize) -> bool {
        self.min_length <= len && len <= self.max_length
    }
}

/// La table des bornes consommée par le validateur
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValidationBounds {
    pub password: LengthBounds,
    pub phone: LengthBounds,
    pub name: LengthBounds,
}

impl Default for ValidationBounds {
    fn default() -> Self {
        Self {
            password: LengthBounds::new(8, 64),
            phone: LengthBounds::new(10, 15),
            name: LengthBounds::new(2, 50),
        }
    }
}

impl ValidationBounds {
    /// Rejects any pair where the minimum exceeds the maximum.
    pub fn check(&self) -> Result<(), ConfigError> {
        for (field, bounds) in [
            (BoundedField::Password, self.password),
            (BoundedField::Phone, self.phone),
            (BoundedField::Name, self.name),
        ] {
            if bounds.min_length > bounds.max_length {
                return Err(ConfigError::InvertedBounds {
                    field,
                    min: bounds.min_length,
                    max: bounds.max_length,
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_db_file")]
    pub db_file: PathBuf,
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,
    #[serde(default)]
    pub bounds: ValidationBounds,
}

fn default_db_file() -> PathBuf {
    "database.json".into()
}

fn default_log_file() -> PathBuf {
    "./bloodlink.log".into()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_file: default_db_file(),
            log_file: default_log_file(),
            bounds: ValidationBounds::default(),
        }
    }
}

impl AppConfig {
    /// Charge la configuration depuis `$BLOODLINK_CONFIG`, ou `bloodlink.yaml`
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| CONFIG_FILE.into());
        Self::open(&path)
    }

    /// Un fichier absent donne la configuration par défaut
    pub fn open(path: &Path) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(content) => Self::from_yaml(&content),
            Err(not_found) if not_found.kind() == NotFound => {
                info!(
                    "Config file {} not found, using default configuration",
                    path.display()
                );
                Ok(Self::default())
            }
            Err(other) => Err(other.into()),
        }
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content)?;
        config.bounds.check()?;
        Ok(config)
    }
}
