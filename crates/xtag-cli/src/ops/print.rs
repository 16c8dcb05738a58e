use std::path::Path;

use xtag_record::{load, Attribute};

use super::{open, Program};
use crate::error::{Result, XtagError};
use crate::settings::PrintConstraint;

pub(super) fn print_file(
    program: &Program<'_>,
    path: &Path,
    names: Option<&[String]>,
    only: PrintConstraint,
    records: bool,
) -> Result<()> {
    let file = open(path)?;
    let mut attr = load(program.store, &file, path)?;
    if let Some(names) = names {
        attr = attr.filter_by_name(names);
    }
    if !matches(&attr, only) {
        return Ok(());
    }

    let printer = program.printer;
    let written = if program.cfg.print0 {
        printer.null(path)
    } else if records {
        printer.records(path, &attr)
    } else {
        printer.line(path)
    };
    written.map_err(XtagError::Output)
}

fn matches(attr: &Attribute, only: PrintConstraint) -> bool {
    if attr.is_empty() {
        return only == PrintConstraint::Untagged;
    }
    match only {
        PrintConstraint::None => true,
        PrintConstraint::Untagged => false,
        PrintConstraint::Valid => attr.all_valid(),
        PrintConstraint::Invalid => attr.all_invalid(),
    }
}
