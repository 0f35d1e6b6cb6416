use super::{Field, Table, VmRecord};

use std::fs;
use std::path::Path;

// Csv
use csv::{ReaderBuilder, Trim, WriterBuilder};

// Error Handling
use log::{debug, info, warn};
use miette::{IntoDiagnostic, Result};
use proxfleet_error::{LibError, ProxfleetError, WrapError};

const BOM: &str = "\u{feff}";

impl Table {
    /*
     * Read a csv file.
     * The delimiter is sniffed from the header line.
     */
    pub fn from_file(path: &Path) -> Result<Self, ProxfleetError> {
        debug!("Reading csv file: {}", path.display());
        let string = match fs::read_to_string(path) {
            Ok(v) => v,
            Err(e) => {
                let message = format!("Couldn't read csv file {:#?}", path.display().to_string());
                return Err(WrapError::builder()
                    .msg(&message)
                    .help("Check the path given with -f/--file.")
                    .origin(ProxfleetError::from(e).into())
                    .build()
                    .into());
            }
        };
        Self::from_csv(&string)
    }
    pub fn from_csv(string: &str) -> Result<Self, ProxfleetError> {
        let string = string.strip_prefix(BOM).unwrap_or(string);
        let delimiter = detect_delimiter(string);

        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter)
            .trim(Trim::Headers)
            .flexible(false)
            .from_reader(string.as_bytes());

        let headers = reader.headers()?.clone();
        let header: Vec<String> = headers.iter().map(|e| e.to_owned()).collect();

        let mut rows = vec![];
        for (i, res) in reader.records().enumerate() {
            let res = res.and_then(|record| {
                let mut row: VmRecord = record.deserialize(Some(&headers))?;
                for (column, value) in headers.iter().zip(record.iter()) {
                    if column.parse::<Field>().is_err() {
                        row.extra.insert(column.to_owned(), value.to_owned());
                    }
                }
                Ok(row)
            });
            match res {
                Ok(row) => rows.push(row),
                Err(e) => {
                    let message = format!("Couldn't parse csv line {}", i + 1);
                    let help = format!("Expected columns are [{}]", Field::columns().join(","));
                    return Err(LibError::builder()
                        .msg(&message)
                        .help(&format!("{help}\n{e}"))
                        .build()
                        .into());
                }
            }
        }
        debug!(
            "Read {} rows (delimiter '{}')",
            rows.len(),
            delimiter as char
        );
        Ok(Self {
            header,
            delimiter,
            rows,
        })
    }

    /// Serialize rows with the loaded header order and delimiter.
    pub fn to_csv(&self) -> Result<String, ProxfleetError> {
        let mut writer = WriterBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(false)
            .from_writer(vec![]);
        writer.write_record(&self.header)?;
        for row in &self.rows {
            let record: Vec<&str> = self
                .header
                .iter()
                .map(|column| match column.parse::<Field>() {
                    Ok(field) => row.get(field),
                    Err(_) => row.extra.get(column).map(|e| e.as_str()).unwrap_or_default(),
                })
                .collect();
            writer.write_record(&record)?;
        }
        let bytes = writer.into_inner().map_err(|e| e.into_error())?;
        let string = String::from_utf8(bytes)?;
        Ok(string)
    }

    /*
     * Write the table back.
     * Content goes to a sibling temporary file first,
     * then replaces the original in one rename.
     */
    pub fn save(&self, path: &Path) -> Result<(), ProxfleetError> {
        let string = self.to_csv()?;
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        fs::write(&tmp, string)?;
        fs::rename(&tmp, path)?;
        info!("Updated csv file {}", path.display());
        Ok(())
    }
}

/// Pick ';' or ',' from the header line, ';' when undecidable.
pub fn detect_delimiter(string: &str) -> u8 {
    let header = string.lines().next().unwrap_or_default();
    let semicolons = header.matches(';').count();
    let commas = header.matches(',').count();
    if commas > semicolons {
        b','
    } else {
        if semicolons == 0 {
            warn!("Unable to detect csv delimiter. Defaulting to ';'");
        }
        b';'
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const HEADER: &str = "student_name;student_firstname;student_login;target_host;vm_name;template_name;pool;storage;newid;net0;net1;ipv4;status";

    #[test]
    fn read_semicolon_file() -> Result<()> {
        let string = format!(
            "{HEADER}\ndupont;jean;;pve1;;debian12;tp;local-lvm;;vmbr1;;;\n\
            martin;alice;amartin;pve2;amartin;debian12;tp;local-lvm;201;vmbr1;vmbr2;10.0.0.2;running\n"
        );
        let table = Table::from_csv(&string)?;
        assert_eq!(table.delimiter, b';');
        assert_eq!(table.len(), 2);
        assert!(table.has_canonical_header());
        assert_eq!(table.rows[0].template_name, "debian12");
        assert_eq!(table.rows[1].get(Field::Status), "running");
        Ok(())
    }

    #[test]
    fn read_comma_file_with_bom() -> Result<()> {
        let header = HEADER.replace(';', ",");
        let string = format!("{BOM}{header}\ndupont,jean,,pve1,,debian12,tp,local-lvm,,,,,\n");
        let table = Table::from_csv(&string)?;
        assert_eq!(table.delimiter, b',');
        assert_eq!(table.header[0], "student_name");
        assert_eq!(table.rows[0].target_host, "pve1");
        Ok(())
    }

    #[test]
    fn missing_column_is_fatal() {
        let string = "student_name;target_host\ndupont;pve1\n";
        assert!(Table::from_csv(string).is_err());
    }

    #[test]
    fn write_back_keeps_delimiter_and_order() -> Result<()> {
        let header = HEADER.replace(';', ",");
        let string = format!(
            "{header}\na,b,,pve1,,tpl,tp,local,,,,,\nc,d,,pve2,,tpl,tp,local,105,,,,cloned\n"
        );
        let table = Table::from_csv(&string)?;
        let written = table.to_csv()?;
        assert_eq!(written, string);
        Ok(())
    }

    #[test]
    fn unknown_columns_are_kept() -> Result<()> {
        let string = format!("{HEADER};group\na;b;;pve1;;tpl;tp;local;;;;;;G1\n");
        let table = Table::from_csv(&string)?;
        assert!(!table.has_canonical_header());
        assert_eq!(table.rows[0].extra.get("group").map(|e| e.as_str()), Some("G1"));
        assert_eq!(table.to_csv()?, string);
        Ok(())
    }

    #[test]
    fn save_replaces_file() -> Result<()> {
        let dir = tempfile::tempdir().into_diagnostic()?;
        let path = dir.path().join("batch.csv");
        fs::write(&path, format!("{HEADER}\na;b;;pve1;;tpl;tp;local;;;;;\n")).into_diagnostic()?;

        let mut table = Table::from_file(&path)?;
        table.rows[0].status = "cloned".to_owned();
        table.save(&path)?;

        let reloaded = Table::from_file(&path)?;
        assert_eq!(reloaded.rows[0].status, "cloned");
        assert_eq!(reloaded.delimiter, b';');
        Ok(())
    }
}
