//! Recipient list parsing.
//!
//! One address per line. Blank lines and `#` comments (whole-line or
//! trailing) are ignored. Order is preserved and duplicates are kept: a
//! recipient listed twice is paid twice.

use std::collections::HashSet;
use std::path::Path;

use thiserror::Error;
use tracing::warn;

use dropship_protocol::crypto::{Address, AddressError};

#[derive(Debug, Error)]
pub enum RecipientsError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("line {line}: {source}")]
    Malformed { line: usize, source: AddressError },

    #[error("line {line}: the zero address cannot receive transfers")]
    ZeroAddress { line: usize },
}

pub fn parse_recipients(text: &str) -> Result<Vec<Address>, RecipientsError> {
    let mut recipients = Vec::new();
    let mut seen = HashSet::new();

    for (i, raw) in text.lines().enumerate() {
        let line = i + 1;
        let entry = raw.split('#').next().unwrap_or("").trim();
        if entry.is_empty() {
            continue;
        }

        let address: Address = entry
            .parse()
            .map_err(|source| RecipientsError::Malformed { line, source })?;
        if address.is_zero() {
            return Err(RecipientsError::ZeroAddress { line });
        }
        if !seen.insert(address) {
            warn!(line, %address, "duplicate recipient, it will be paid again");
        }
        recipients.push(address);
    }

    Ok(recipients)
}

pub fn load_recipients(path: &Path) -> Result<Vec<Address>, RecipientsError> {
    let text = std::fs::read_to_string(path).map_err(|source| RecipientsError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_recipients(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const A: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const B: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

    #[test]
    fn comments_and_blanks_are_skipped() {
        let text = format!("# airdrop round 1\n\n{}\n   \n{}  # second\n", A, B);
        let list = parse_recipients(&text).unwrap();
        assert_eq!(list, vec![A.parse().unwrap(), B.parse().unwrap()]);
    }

    #[test]
    fn order_and_duplicates_are_kept() {
        let text = format!("{}\n{}\n{}\n", B, A, B);
        let list = parse_recipients(&text).unwrap();
        assert_eq!(list.len(), 3);
        assert_eq!(list[0], list[2]);
        assert_eq!(list[1], A.parse().unwrap());
    }

    #[test]
    fn malformed_line_is_reported_by_number() {
        let text = format!("{}\n\nnot-an-address\n", A);
        let err = parse_recipients(&text).unwrap_err();
        assert!(matches!(err, RecipientsError::Malformed { line: 3, .. }));
        assert!(err.to_string().starts_with("line 3:"));
    }

    #[test]
    fn zero_address_is_refused() {
        let text = "0x0000000000000000000000000000000000000000\n";
        assert!(matches!(
            parse_recipients(text),
            Err(RecipientsError::ZeroAddress { line: 1 })
        ));
    }

    #[test]
    fn empty_file_gives_empty_list() {
        assert!(parse_recipients("").unwrap().is_empty());
        assert!(parse_recipients("# nothing yet\n").unwrap().is_empty());
    }

    #[test]
    fn loads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{}", A).unwrap();
        writeln!(file, "{}", B).unwrap();
        let list = load_recipients(file.path()).unwrap();
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = load_recipients(Path::new("/nonexistent/recipients.txt")).unwrap_err();
        assert!(matches!(err, RecipientsError::Io { .. }));
    }
}
