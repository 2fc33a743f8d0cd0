use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use crate::error::XpakError;
use crate::utility::dsv_file::DSVFile;

/// Represents build information loaded from a CASC `.build.info` file.
///
/// The file is a `|` separated table whose header cells read `Name!TYPE:len`.
/// Only the first data row, the active build, is kept.
#[derive(Debug, Default)]
pub struct CascBuildInfo {
    variables: HashMap<String, Variable>,
}

/// Represents a variable entry in the build info.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub name: String,
    pub var_type: String,
    pub value: String,
}

impl CascBuildInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Retrieves the value of a variable by name, if present.
    pub fn get(&self, var_name: &str) -> Option<&str> {
        self.variables.get(var_name).map(|var| var.value.as_str())
    }

    /// Loads build info variables from the specified file into this instance.
    pub fn load<P: AsRef<Path>>(&mut self, file_name: P) -> Result<(), XpakError> {
        let dsv = DSVFile::from_file(file_name, "|", Some("#"))?;
        self.load_rows(dsv)
    }

    /// Loads build info variables from a reader.
    pub fn load_from<R: Read>(&mut self, reader: R) -> Result<(), XpakError> {
        let mut dsv = DSVFile::with_delimiter("|", Some("#"));
        dsv.load(reader)?;
        self.load_rows(dsv)
    }

    fn load_rows(&mut self, dsv: DSVFile) -> Result<(), XpakError> {
        let rows = dsv.rows;
        if rows.len() < 2 {
            return Err(XpakError::MissingMetadata(
                "Build info has no data rows".into(),
            ));
        }
        let header = &rows[0];
        let data = &rows[1];
        if header.len() != data.len() {
            return Err(XpakError::MissingMetadata(
                "Build info header/data length mismatch".into(),
            ));
        }
        for (info, value) in header.iter().zip(data.iter()) {
            let (name, var_type) = info.split_once('!').ok_or_else(|| {
                XpakError::MissingMetadata(format!("Build info header cell {info} is invalid"))
            })?;
            let var = Variable {
                name: name.to_string(),
                var_type: var_type.to_string(),
                value: value.clone(),
            };
            self.variables.insert(var.name.clone(), var);
        }
        Ok(())
    }
}
