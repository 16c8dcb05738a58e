//! Re-checking stored checksums against current file content.

use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, info};
use xtag_record::{digest_hex, load, multi_hash, Accumulator, Algorithm};

use super::{open, Program};
use crate::error::{Result, XtagError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recheck {
    /// Valid records whose checksum no longer matches become invalid.
    Invalidate,
    /// Invalid records whose checksum matches again become valid.
    Revalidate,
}

impl Recheck {
    /// Validity of the records this mode looks at.
    fn checks(self) -> bool {
        self == Recheck::Invalidate
    }
}

pub(super) fn recheck_file(
    program: &Program<'_>,
    path: &Path,
    names: Option<&[String]>,
    mode: Recheck,
) -> Result<()> {
    let file = open(path)?;
    let mut attr = load(program.store, &file, path)?;

    let checked: Vec<String> = attr
        .iter()
        .filter(|(name, rec)| {
            rec.valid == mode.checks() && names.map_or(true, |names| names.contains(name))
        })
        .map(|(name, _)| name.clone())
        .collect();
    if checked.is_empty() {
        return Ok(());
    }

    // One read pass feeds every algorithm in use.
    let mut accs: HashMap<Algorithm, Accumulator> = HashMap::new();
    for name in &checked {
        if let Some(rec) = attr.get(name) {
            accs.entry(rec.algorithm)
                .or_insert_with(|| rec.algorithm.accumulator());
        }
    }
    multi_hash(&mut &file, &mut accs).map_err(|e| XtagError::io(path, e))?;
    let digests: HashMap<Algorithm, String> = accs
        .iter_mut()
        .map(|(algorithm, acc)| (*algorithm, digest_hex(acc.as_mut())))
        .collect();

    let mut changed = 0usize;
    for name in &checked {
        let Some(rec) = attr.get_mut(name) else {
            continue;
        };
        let matches = digests.get(&rec.algorithm) == Some(&rec.checksum);
        let flip = match mode {
            Recheck::Invalidate => !matches,
            Recheck::Revalidate => matches,
        };
        if flip {
            rec.valid = !rec.valid;
            changed += 1;
            info!(path = %path.display(), name = %name, valid = rec.valid, "Record validity changed");
        }
    }
    if changed == 0 {
        debug!(path = %path.display(), checked = checked.len(), "All checked records unchanged");
        return Ok(());
    }

    attr.store(program.store, &file, path)?;
    program.echo_changed(path)
}
