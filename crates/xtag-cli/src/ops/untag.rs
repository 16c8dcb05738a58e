use std::path::Path;

use tracing::debug;
use xtag_record::{load, purge};

use super::{open, Program};
use crate::error::Result;
use crate::settings::UntagConstraint;

pub(super) fn untag_file(
    program: &Program<'_>,
    path: &Path,
    names: Option<&[String]>,
    only: UntagConstraint,
) -> Result<()> {
    let file = open(path)?;

    let purge_all = match (only, names) {
        (UntagConstraint::All, _) | (UntagConstraint::None, None) => true,
        _ => false,
    };
    if purge_all {
        if purge(program.store, &file, path)? {
            program.echo_changed(path)?;
        }
        return Ok(());
    }

    let mut attr = load(program.store, &file, path)?;
    let before = attr.len();
    match (only, names) {
        (UntagConstraint::Invalid, Some(names)) => {
            attr.retain(|name, rec| rec.valid || !names.iter().any(|n| n == name))
        }
        (UntagConstraint::Invalid, None) => attr.retain(|_, rec| rec.valid),
        (_, Some(names)) => {
            for name in names {
                attr.remove(name);
            }
        }
        (_, None) => {}
    }

    let removed = before - attr.len();
    if removed == 0 {
        return Ok(());
    }
    debug!(path = %path.display(), removed, "Removed records");
    if attr.is_empty() {
        purge(program.store, &file, path)?;
    } else {
        attr.store(program.store, &file, path)?;
    }
    program.echo_changed(path)
}
