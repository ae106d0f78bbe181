use serde_json::Value;

use crate::error::ResultError;
use crate::process::Process;
use crate::result::document::{read_raw_result, write_document, ResultDocument};
use crate::storage::StorageLayout;

/// The executable printed its JSON result; merge the standard fields into it.
pub(crate) fn handle_result(
    stdout: &str,
    process: &Process,
    layout: &StorageLayout,
) -> Result<Option<Value>, ResultError> {
    let raw = read_raw_result(process, stdout)?;
    let mut document = ResultDocument::parse(raw)?;
    document.finalize(process, layout);
    write_document(process, &document).map(Some)
}
