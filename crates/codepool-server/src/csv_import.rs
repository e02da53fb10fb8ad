//! CSV import bodies and their Content-MD5 check.

use md5::{Digest, Md5};

use codepool::CodeRecord;

use crate::error::ApiError;

const FLAVOUR: &str = "flavour";
const UNIQUE_CODE: &str = "unique_code";

/// Lowercase hex MD5 of `body`.
pub fn content_md5(body: &[u8]) -> String {
    hex::encode(Md5::digest(body))
}

/// Check the `Content-MD5` header against the body.
///
/// Returns the digest, lowercased, for use as the content fingerprint.
pub fn verify_content_md5(header: Option<&str>, body: &[u8]) -> Result<String, ApiError> {
    let Some(claimed) = header else {
        return Err(ApiError::bad_request("Missing Content-MD5 header."));
    };
    let claimed = claimed.trim().to_ascii_lowercase();
    if claimed != content_md5(body) {
        return Err(ApiError::bad_request(
            "Content-MD5 header does not match content.",
        ));
    }
    Ok(claimed)
}

/// Parse a CSV body with a header row into import rows.
///
/// Header names are matched case-insensitively; columns other than
/// `flavour` and `unique_code` are ignored.
pub fn parse_rows(body: &[u8]) -> Result<Vec<CodeRecord>, ApiError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .from_reader(body);

    let headers: Vec<String> = reader
        .headers()
        .map_err(csv_error)?
        .iter()
        .map(str::to_lowercase)
        .collect();
    let column = |name: &str| headers.iter().position(|h| h == name);

    let (flavour, unique_code) = match (column(FLAVOUR), column(UNIQUE_CODE)) {
        (Some(f), Some(u)) => (f, u),
        (f, u) => {
            let missing: Vec<String> = [(FLAVOUR, f), (UNIQUE_CODE, u)]
                .iter()
                .filter(|(_, idx)| idx.is_none())
                .map(|(name, _)| format!("'{}'", name))
                .collect();
            return Err(ApiError::bad_request(format!(
                "Missing CSV columns: {}",
                missing.join(", ")
            )));
        }
    };

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(csv_error)?;
        match (record.get(flavour), record.get(unique_code)) {
            (Some(f), Some(u)) => rows.push(CodeRecord::new(f, u)),
            _ => {
                return Err(ApiError::bad_request(format!(
                    "Short CSV row at line {}.",
                    record.position().map(|p| p.line()).unwrap_or(0)
                )))
            }
        }
    }
    Ok(rows)
}

fn csv_error(e: csv::Error) -> ApiError {
    ApiError::bad_request(format!("Invalid CSV content: {}", e))
}
