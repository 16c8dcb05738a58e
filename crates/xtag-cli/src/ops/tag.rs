use std::path::Path;

use tracing::debug;
use xtag_record::{hash_hex, load, Record};

use super::{open, Program};
use crate::error::{Result, XtagError};
use crate::settings::TagConstraint;

pub(super) fn tag_file(
    program: &Program<'_>,
    path: &Path,
    name: &str,
    only: TagConstraint,
) -> Result<()> {
    let mut file = open(path)?;
    let mut attr = load(program.store, &file, path)?;

    let skip = match only {
        TagConstraint::None => false,
        TagConstraint::Untagged => !attr.is_empty(),
        TagConstraint::Invalid => attr.has_valid(),
    };
    if skip {
        debug!(path = %path.display(), only = ?only, "Constraint not met, not tagging");
        return Ok(());
    }
    if attr.contains(name) {
        return Err(XtagError::NameConflict {
            name: name.to_string(),
            path: path.to_path_buf(),
        });
    }

    let algorithm = program.cfg.algorithm;
    let checksum = hash_hex(&mut file, algorithm).map_err(|e| XtagError::io(path, e))?;
    attr.insert(name, Record::new(checksum, algorithm));
    attr.store(program.store, &file, path)?;
    debug!(path = %path.display(), name, %algorithm, "Tagged");

    program.echo_changed(path)
}
