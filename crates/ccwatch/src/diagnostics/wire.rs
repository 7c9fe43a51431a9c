//! Cross-process encoding of a [`FormattedDiagSet`].
//!
//! The encoding is UTF-8 text articulated by three reserved octets that can
//! never occur inside well-formed UTF-8: `0xFE` separates lines within one
//! formatted diagnostic, `0x00` separates diagnostics, and the trailing
//! record is either the info line's text or the single octet `0xFD` for
//! "no info".

use thiserror::Error;

use super::{FormattedDiag, FormattedDiagSet};

pub const LINE_SEP: u8 = 0xFE;
pub const DIAG_SEP: u8 = 0x00;
pub const NO_INFO: u8 = 0xFD;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("diagnostic text contains a reserved separator octet")]
    ReservedOctet,
    #[error("info line must not be empty")]
    EmptyInfo,
    #[error("missing trailing info record")]
    MissingInfoMarker,
    #[error("diagnostic payload is not valid UTF-8")]
    InvalidUtf8,
    #[error("empty diagnostic payload")]
    Empty,
}

pub fn encode(set: &FormattedDiagSet) -> Result<Vec<u8>, WireError> {
    let mut out = Vec::new();
    for diag in &set.diags {
        for (i, line) in diag.lines.iter().enumerate() {
            check_text(line)?;
            if i > 0 {
                out.push(LINE_SEP);
            }
            out.extend_from_slice(line.as_bytes());
        }
        out.push(DIAG_SEP);
    }
    match &set.info {
        Some(info) => {
            if info.is_empty() {
                return Err(WireError::EmptyInfo);
            }
            check_text(info)?;
            out.extend_from_slice(info.as_bytes());
        }
        None => out.push(NO_INFO),
    }
    Ok(out)
}

pub fn decode(bytes: &[u8]) -> Result<FormattedDiagSet, WireError> {
    if bytes.is_empty() {
        return Err(WireError::Empty);
    }

    let mut records: Vec<&[u8]> = bytes.split(|b| *b == DIAG_SEP).collect();
    let info_record = records.pop().expect("split yields at least one record");

    let info = if info_record == [NO_INFO] {
        None
    } else if info_record.is_empty() {
        return Err(WireError::MissingInfoMarker);
    } else {
        Some(text_from(info_record)?)
    };

    let mut diags = Vec::with_capacity(records.len());
    for record in records {
        let lines = record
            .split(|b| *b == LINE_SEP)
            .map(text_from)
            .collect::<Result<Vec<_>, _>>()?;
        diags.push(FormattedDiag { lines });
    }

    let uses_colors = diags
        .iter()
        .flat_map(|d| d.lines.iter())
        .any(|l| l.contains('\u{1b}'));
    Ok(FormattedDiagSet {
        diags,
        info,
        uses_colors,
    })
}

fn check_text(text: &str) -> Result<(), WireError> {
    // Reserved octets are invalid UTF-8, so a `str` can only smuggle the
    // NUL separator.
    if text.bytes().any(|b| b == DIAG_SEP) {
        return Err(WireError::ReservedOctet);
    }
    Ok(())
}

fn text_from(bytes: &[u8]) -> Result<String, WireError> {
    std::str::from_utf8(bytes)
        .map(str::to_owned)
        .map_err(|_| WireError::InvalidUtf8)
}
