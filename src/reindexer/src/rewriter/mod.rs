//! Artifact rewriters
//!
//! Each rewriter produces its output under a hidden temporary sibling of the
//! file it replaces. Substitution is a separate step so a failed rewrite never
//! leaves a half-written file in place of the original.

pub mod index;
pub mod rows;
pub mod schema;

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::layout::temp_sibling;
use crate::model::table_folder;

pub use index::{IndexRewriter, renumber_index};
pub use rows::{RowCursor, RowRewriter};
pub use schema::{SchemaRewriter, schema_columns};

const WRITE_BUFFER: usize = 256 * 1024;
const TABLE_TOKEN: &[u8] = b"table";

/// Replace every `table<digits>` token in `value` with the folder name of
/// `new_index`.
///
/// Returns `None` when `value` carries no such token.
pub fn retarget_table_tokens(value: &str, new_index: u32) -> Option<String> {
    let bytes = value.as_bytes();
    let replacement = table_folder(new_index);
    let mut out = String::with_capacity(value.len());
    let mut copied = 0;
    let mut found = false;
    let mut pos = 0;

    while pos + TABLE_TOKEN.len() < bytes.len() {
        let at_boundary = pos == 0 || !bytes[pos - 1].is_ascii_alphanumeric();
        if at_boundary && bytes[pos..].starts_with(TABLE_TOKEN) {
            let digits_start = pos + TABLE_TOKEN.len();
            let digits = bytes[digits_start..]
                .iter()
                .take_while(|b| b.is_ascii_digit())
                .count();
            if digits > 0 {
                out.push_str(&value[copied..pos]);
                out.push_str(&replacement);
                pos = digits_start + digits;
                copied = pos;
                found = true;
                continue;
            }
        }
        pos += 1;
    }

    if !found {
        return None;
    }
    out.push_str(&value[copied..]);
    Some(out)
}

/// Write a replacement for `target` into its temporary sibling.
///
/// On failure the temporary file is left where it is and `target` is
/// untouched.
pub fn write_temp<F>(target: &Path, write: F) -> Result<PathBuf>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    let temp = temp_sibling(target);
    let mut out = BufWriter::with_capacity(WRITE_BUFFER, File::create(&temp)?);
    write(&mut out)?;
    out.flush()?;
    out.get_ref().sync_all()?;
    Ok(temp)
}

/// Substitute a finished temporary file for `target`
pub fn replace(temp: &Path, target: &Path) -> Result<()> {
    fs::rename(temp, target)?;
    Ok(())
}
