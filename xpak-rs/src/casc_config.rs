use crate::encoding_key::EncodingKey;
use crate::error::XpakError;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

/// The build configuration of a CASC storage: `name = value value ...` lines.
#[derive(Debug, Default)]
pub struct CascConfig {
    variables: HashMap<String, Variable>,
}

/// Represents a variable in the CASC configuration, with a name and a list of values.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Variable {
    pub name: String,
    pub values: Vec<String>,
}

impl CascConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Retrieves a variable by name, if it exists.
    pub fn get(&self, var_name: &str) -> Option<&Variable> {
        self.variables.get(var_name)
    }

    /// Returns the encoding key of the TVFS root, the second value of
    /// `vfs-root`.
    pub fn vfs_root(&self) -> Result<EncodingKey, XpakError> {
        let value = self
            .get("vfs-root")
            .and_then(|var| var.values.get(1))
            .ok_or_else(|| XpakError::MissingMetadata("vfs-root not in config".into()))?;
        EncodingKey::from_hex(value)
            .map_err(|_| XpakError::MissingMetadata(format!("Invalid vfs-root key {value}")))
    }

    /// Loads configuration variables from a file.
    pub fn load<P: AsRef<Path>>(&mut self, file_name: P) -> Result<(), XpakError> {
        self.load_from(File::open(file_name)?)
    }

    /// Loads configuration variables from a reader.
    pub fn load_from<R: Read>(&mut self, reader: R) -> Result<(), XpakError> {
        for line in BufReader::new(reader).lines() {
            let line = line?;
            let line = line.trim();

            // Ignore empty lines and comments
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((name, value)) = line.split_once('=') {
                let variable = Variable {
                    name: name.trim().to_string(),
                    values: value.split_whitespace().map(|v| v.to_string()).collect(),
                };
                self.variables.insert(variable.name.clone(), variable);
            }
        }

        Ok(())
    }
}
