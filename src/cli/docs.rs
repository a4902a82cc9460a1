//! Function reference for the mace CLI

use std::fmt::Write;

use super::CliError;
use crate::functions::{self, FunctionSpec};

/// Signature line such as `s_sub(string, string or regex, string)`.
fn signature(spec: &FunctionSpec) -> String {
    let shown = if spec.max_args == usize::MAX {
        spec.arg_kinds.len().max(spec.min_args)
    } else {
        spec.max_args
    };
    let mut params: Vec<String> = (0..shown)
        .map(|i| {
            let kind = spec.kind(i).describe();
            if i < spec.min_args {
                kind.to_string()
            } else {
                format!("[{}]", kind)
            }
        })
        .collect();
    if spec.max_args == usize::MAX {
        params.push("...".to_string());
    }
    format!("{}({})", spec.name, params.join(", "))
}

/// Every built-in with its one-line summary.
pub fn functions_overview() -> String {
    let mut out = String::from("MACE FUNCTIONS\n\n");
    out.push_str("Vectorized functions (marked *) run once per element when their first\n");
    out.push_str("argument is an array or object.\n\n");
    for spec in functions::all() {
        let marker = if spec.vectorized { '*' } else { ' ' };
        let _ = writeln!(out, "  {} {:<14} {}", marker, spec.name, spec.summary);
    }
    out
}

/// Signature and summary of one built-in.
pub fn function_doc(name: &str) -> Result<String, CliError> {
    let spec = functions::lookup(name).ok_or_else(|| CliError::UnknownFunction(name.to_string()))?;
    let mut out = signature(spec);
    out.push('\n');
    let _ = writeln!(out, "  {}", spec.summary);
    if spec.vectorized {
        out.push_str("  vectorized over an array or object first argument\n");
    }
    Ok(out)
}
