//! Companion runner templates compiled into the crate.

use anyhow::{anyhow, Result};
use include_dir::{include_dir, Dir};

use crate::script::LineEnding;

static RESOURCES: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/resources");

pub const RUNSTRESS_SH: &str = "runstress.sh";
pub const SETUPDUMPLING_CMD: &str = "setupdumpling.cmd";

/// Raw bytes of an embedded template.
pub fn template(name: &str) -> Option<&'static [u8]> {
    RESOURCES.get_file(name).map(|f| f.contents())
}

/// Template text with line breaks rewritten for the target shell.
pub fn normalized_template(name: &str, line_ending: LineEnding) -> Result<String> {
    let bytes = template(name).ok_or_else(|| anyhow!("embedded template not found: {}", name))?;
    let text = std::str::from_utf8(bytes)
        .map_err(|e| anyhow!("embedded template {} is not utf-8: {}", name, e))?;
    Ok(line_ending.normalize(text))
}
