//! Reader for the `|`-delimited transfer tables dumped from the transfer database.
//!
//! ```text
//!  id | ip_address     | start_time                 | transfer_time   | trans_type | num_bytes
//! ----+----------------+----------------------------+-----------------+------------+----------
//!   1 | 128.142.18.166 | 2013-05-03 10:00:00.250000 | 00:01:30.000000 |          0 |   1048576
//! (1 row)
//! ```

use std::convert::TryFrom;
use std::io::BufRead;
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use log::{debug, info, warn};

use crate::transfer::{Transfer, TransferClass, TransferId};
use crate::{Duration, Error, Result, Timestamp};

const START_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
const TRANSFER_TIME_FORMAT: &str = "%H:%M:%S%.f";

/// A recoverable problem with one row; the row is skipped.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ParseRowError {
    #[error("Could not parse column '{column}' ('{value}'): {reason}")]
    Field {
        column: &'static str,
        value: String,
        reason: String,
    },
    #[error("Missing value for column '{0}'")]
    Missing(&'static str),
    #[error("Row has {found} cells but the header has {expected}")]
    Width { found: usize, expected: usize },
}

#[derive(Debug, Default)]
struct RowBuilder {
    id: Option<u64>,
    ip_address: Option<String>,
    start_time: Option<Timestamp>,
    transfer_time: Option<Duration>,
    trans_type: Option<TransferClass>,
    num_bytes: Option<u64>,
}

type ColumnParser = fn(&str, &mut RowBuilder) -> std::result::Result<(), String>;

fn parse_id(v: &str, row: &mut RowBuilder) -> std::result::Result<(), String> {
    row.id = Some(v.parse().map_err(|e| format!("{}", e))?);
    Ok(())
}

fn parse_ip_address(v: &str, row: &mut RowBuilder) -> std::result::Result<(), String> {
    row.ip_address = Some(v.to_owned());
    Ok(())
}

fn parse_start_time(v: &str, row: &mut RowBuilder) -> std::result::Result<(), String> {
    let ts = NaiveDateTime::parse_from_str(v, START_TIME_FORMAT).map_err(|e| format!("{}", e))?;
    row.start_time = Some(ts);
    Ok(())
}

/// A clock time read as the time elapsed since 00:00:00.
fn parse_transfer_time(v: &str, row: &mut RowBuilder) -> std::result::Result<(), String> {
    let t = NaiveTime::parse_from_str(v, TRANSFER_TIME_FORMAT).map_err(|e| format!("{}", e))?;
    let dura = Duration::seconds(t.num_seconds_from_midnight() as i64)
        + Duration::nanoseconds(t.nanosecond() as i64);
    if dura <= Duration::zero() {
        return Err("transfer time must be positive".to_owned());
    }
    row.transfer_time = Some(dura);
    Ok(())
}

fn parse_trans_type(v: &str, row: &mut RowBuilder) -> std::result::Result<(), String> {
    let code: u64 = v.parse().map_err(|e| format!("{}", e))?;
    let class =
        TransferClass::try_from(code).map_err(|c| format!("unknown transfer type {}", c))?;
    row.trans_type = Some(class);
    Ok(())
}

fn parse_num_bytes(v: &str, row: &mut RowBuilder) -> std::result::Result<(), String> {
    row.num_bytes = Some(v.parse().map_err(|e| format!("{}", e))?);
    Ok(())
}

/// Every required column and how to read it.
const COLUMNS: &[(&str, ColumnParser)] = &[
    ("id", parse_id),
    ("ip_address", parse_ip_address),
    ("start_time", parse_start_time),
    ("transfer_time", parse_transfer_time),
    ("trans_type", parse_trans_type),
    ("num_bytes", parse_num_bytes),
];

impl RowBuilder {
    fn build(self) -> std::result::Result<Transfer, ParseRowError> {
        use ParseRowError::Missing;
        let id = self.id.ok_or(Missing("id"))?;
        let ip_address = self.ip_address.ok_or(Missing("ip_address"))?;
        let start_time = self.start_time.ok_or(Missing("start_time"))?;
        let transfer_time = self.transfer_time.ok_or(Missing("transfer_time"))?;
        let trans_type = self.trans_type.ok_or(Missing("trans_type"))?;
        let num_bytes = self.num_bytes.ok_or(Missing("num_bytes"))?;
        Ok(Transfer::new(
            TransferId(id),
            &ip_address,
            trans_type,
            start_time,
            transfer_time,
            num_bytes,
        ))
    }
}

/// The header row resolved against the column table.
struct Header {
    parsers: Vec<Option<(&'static str, ColumnParser)>>,
}

impl Header {
    fn parse(line: &str, path: &Path) -> Result<Self> {
        let names: Vec<&str> = line.split('|').map(str::trim).collect();
        for &(column, _) in COLUMNS {
            if !names.contains(&column) {
                return Err(Error::MissingColumn {
                    path: path.to_owned(),
                    column,
                });
            }
        }
        let parsers = names
            .iter()
            .map(|name| COLUMNS.iter().find(|(c, _)| c == name).copied())
            .collect();
        Ok(Header { parsers })
    }

    fn parse_row(&self, cells: &[&str]) -> std::result::Result<Transfer, ParseRowError> {
        if cells.len() > self.parsers.len() {
            return Err(ParseRowError::Width {
                found: cells.len(),
                expected: self.parsers.len(),
            });
        }
        let mut row = RowBuilder::default();
        for (&cell, parser) in cells.iter().zip(&self.parsers) {
            if cell.is_empty() || cell == "NULL" {
                continue;
            }
            if let Some((column, parse)) = *parser {
                parse(cell, &mut row).map_err(|reason| ParseRowError::Field {
                    column,
                    value: cell.to_owned(),
                    reason,
                })?;
            }
        }
        row.build()
    }
}

/// `(123 rows)`
fn is_footer(line: &str) -> bool {
    line.starts_with('(') && (line.ends_with("rows)") || line.ends_with("row)"))
}

fn is_separator(line: &str) -> bool {
    line.trim_matches(|c| c == '-' || c == '+').is_empty()
}

/// The transfers read from one log file.
#[derive(Debug, Clone)]
pub struct XferLog {
    pub transfers: Vec<Transfer>,
    /// rows that were skipped because they could not be parsed
    pub bad_rows: usize,
    /// the `(N rows)` summary line, if present
    pub footer: Option<String>,
}

impl XferLog {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(Error::NoSuchFile(path.to_owned()));
        }
        let f = std::fs::File::open(path)?;
        Self::from_reader(std::io::BufReader::new(f), path)
    }

    /// `path` only names the source in errors and diagnostics.
    pub fn from_reader<R: BufRead>(mut reader: R, path: &Path) -> Result<Self> {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Err(Error::EmptyLog(path.to_owned()));
        }
        let header = Header::parse(&line, path)?;

        let mut transfers = Vec::new();
        let mut bad_rows = 0;
        let mut footer = None;

        for line in reader.lines() {
            let line = line?;
            let line = line.trim();
            if is_separator(line) {
                continue;
            }
            let cells: Vec<&str> = line.split('|').map(str::trim).collect();
            if cells.iter().all(|c| c.is_empty()) {
                debug!("skipped line: {}", line);
                continue;
            }
            if is_footer(line) {
                info!(
                    "{} in log file - {} bad rows",
                    line.trim_matches(|c| c == '(' || c == ')'),
                    bad_rows
                );
                footer = Some(line.to_owned());
                continue;
            }
            match header.parse_row(&cells) {
                Ok(t) => transfers.push(t),
                Err(e) => {
                    warn!("{} in this row: {}", e, line);
                    bad_rows += 1;
                }
            }
        }

        info!(
            "read {} transfers from {:?}, {} bad rows",
            transfers.len(),
            path,
            bad_rows
        );

        Ok(XferLog {
            transfers,
            bad_rows,
            footer,
        })
    }
}

/// Copies of the transfers whose requested window touches `day`, sorted by requested start.
pub fn transfers_on_day(transfers: &[Transfer], day: NaiveDate) -> Vec<Transfer> {
    let mut on_day: Vec<Transfer> = transfers
        .iter()
        .filter(|t| t.requested_start().date() <= day && day <= t.requested_end().date())
        .cloned()
        .collect();
    on_day.sort_by_key(|t| t.requested_start());
    on_day
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const LOG: &str = "\
 id | ip_address     | start_time                 | transfer_time   | trans_type | num_bytes | note
----+----------------+----------------------------+-----------------+------------+-----------+------
  1 | 128.142.18.166 | 2013-05-03 10:00:00.250000 | 00:01:30.000000 |          0 |      9000 | NULL
  2 | 128.142.18.166 | 2013-05-03 11:00:00        | 00:00:10.500000 |          1 |      2100 |
  3 | 128.142.18.166 | not a time                 | 00:00:10.000000 |          1 |      2100 |
  4 | 128.142.18.166 | 2013-05-03 12:00:00.000000 | 00:00:00.000000 |          1 |      2100 |
  5 |                | 2013-05-03 12:00:00.000000 | 00:00:10.000000 |          1 |      2100 |
  6 | 128.142.18.166 | 2013-05-03 12:00:00.000000 | 00:00:10.000000 |          7 |      2100 |

(6 rows)
";

    fn read(s: &str) -> Result<XferLog> {
        XferLog::from_reader(Cursor::new(s), Path::new("test.xfer"))
    }

    #[test]
    fn parses_good_rows_and_counts_bad_ones() {
        let log = read(LOG).unwrap();
        assert_eq!(log.transfers.len(), 2);
        assert_eq!(log.bad_rows, 4);
        assert_eq!(log.footer.as_deref(), Some("(6 rows)"));

        let t = &log.transfers[0];
        assert_eq!(t.id(), TransferId(1));
        assert_eq!(t.source(), "128.142.18.166");
        assert_eq!(t.class(), TransferClass::OnDemand);
        assert_eq!(
            t.requested_start(),
            NaiveDate::from_ymd(2013, 5, 3).and_hms_milli(10, 0, 0, 250)
        );
        assert_eq!(t.requested_duration(), Duration::seconds(90));
        assert_eq!(t.requested_rate(), 100.0);

        let t = &log.transfers[1];
        assert_eq!(t.class(), TransferClass::BestEffort);
        assert_eq!(t.requested_duration(), Duration::milliseconds(10_500));
        assert_eq!(t.requested_rate(), 200.0);
    }

    #[test]
    fn row_errors_name_the_column() {
        let header = Header::parse(
            "id|ip_address|start_time|transfer_time|trans_type|num_bytes",
            Path::new("x"),
        )
        .unwrap();
        let cells = ["1", "h", "2013-05-03 10:00:00", "00:00:01", "0", "many"];
        match header.parse_row(&cells) {
            Err(ParseRowError::Field { column, value, .. }) => {
                assert_eq!(column, "num_bytes");
                assert_eq!(value, "many");
            }
            other => panic!("unexpected: {:?}", other),
        }
        let cells = ["1", "h", "2013-05-03 10:00:00", "00:00:01", "0", "1", "extra"];
        assert!(matches!(
            header.parse_row(&cells),
            Err(ParseRowError::Width { found: 7, expected: 6 })
        ));
    }

    #[test]
    fn missing_column_is_fatal() {
        let err = read("id | ip_address | start_time | trans_type | num_bytes\n").unwrap_err();
        assert!(matches!(
            err,
            Error::MissingColumn {
                column: "transfer_time",
                ..
            }
        ));
    }

    #[test]
    fn empty_and_missing_files() {
        assert!(matches!(read(""), Err(Error::EmptyLog(_))));
        assert!(matches!(
            XferLog::from_path("/nonexistent/transfers.xfer"),
            Err(Error::NoSuchFile(_))
        ));
    }

    #[test]
    fn filter_by_day() {
        let day = NaiveDate::from_ymd(2013, 5, 3);
        let mk = |id, start: Timestamp, secs| {
            Transfer::new(
                TransferId(id),
                "h",
                TransferClass::OnDemand,
                start,
                Duration::seconds(secs),
                100,
            )
        };
        let ts = vec![
            mk(0, day.and_hms(23, 0, 0), 60),
            mk(1, day.pred().and_hms(23, 59, 0), 120),
            mk(2, day.pred().and_hms(10, 0, 0), 60),
            mk(3, day.succ().and_hms(0, 0, 1), 60),
            mk(4, day.and_hms(1, 0, 0), 60),
        ];
        let ids: Vec<u64> = transfers_on_day(&ts, day)
            .iter()
            .map(|t| t.id().0)
            .collect();
        assert_eq!(ids, vec![1, 4, 0]);
    }
}
