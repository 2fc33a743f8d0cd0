use crate::error::XpakError;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

/// A Delimiter Separated Value file, such as `.build.info`.
#[derive(Debug)]
pub(crate) struct DSVFile {
    delimiter: String,
    comment: Option<String>,
    pub(crate) rows: Vec<Vec<String>>,
}

impl DSVFile {
    pub(crate) fn with_delimiter(delimiter: &str, comment: Option<&str>) -> Self {
        Self {
            delimiter: delimiter.to_string(),
            comment: comment.filter(|c| !c.is_empty()).map(str::to_string),
            rows: Vec::new(),
        }
    }

    pub(crate) fn from_file<P: AsRef<Path>>(
        file: P,
        delimiter: &str,
        comment: Option<&str>,
    ) -> Result<Self, XpakError> {
        let file = File::open(file)?;
        let mut dsv = Self::with_delimiter(delimiter, comment);
        dsv.load(file)?;
        Ok(dsv)
    }

    /// Loads rows from a reader, skipping blank and comment lines.
    pub(crate) fn load<R: Read>(&mut self, reader: R) -> Result<(), XpakError> {
        let buffered = BufReader::new(reader);

        for line in buffered.lines() {
            let line = line?;
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }
            if let Some(ref comment) = self.comment {
                if line.starts_with(comment.as_str()) {
                    continue;
                }
            }
            self.rows
                .push(line.split(&self.delimiter).map(|s| s.to_string()).collect());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_comments_and_blank_lines() {
        let mut dsv = DSVFile::with_delimiter("|", Some("#"));
        dsv.load("# note\r\nA!STRING:0|B!HEX:16\r\n\r\nx|y\r\n".as_bytes())
            .unwrap();
        assert_eq!(dsv.rows[0], vec!["A!STRING:0", "B!HEX:16"]);
        assert_eq!(dsv.rows[1], vec!["x", "y"]);
    }
}
