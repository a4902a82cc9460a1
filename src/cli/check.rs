//! Compile mace queries and run them against JSON input

use super::CliError;
use crate::{CompileOptions, ConvertOptions, Query, parse_json, to_json, to_json_pretty};

/// Options for the query and check commands
#[derive(Debug, Clone, Default)]
pub struct CheckOptions {
    /// The query to run
    pub query: String,
    /// JSON input string
    pub input: Option<String>,
    /// Pretty-print the output
    pub pretty: bool,
    /// Only validate syntax, don't execute
    pub syntax_only: bool,
    /// Turn date-shaped strings into dates
    pub parse_dates: bool,
    /// Parser nesting ceiling; the library default when `None`
    pub max_depth: Option<usize>,
}

/// Result of a check operation
#[derive(Debug, PartialEq)]
pub enum CheckResult {
    /// Syntax validation passed
    SyntaxValid { assignment: bool },
    /// Query ran; the rendered result, or the rewritten document for an
    /// assignment
    Success(String),
}

/// Execute a mace query, or only validate it
pub fn execute_check(options: &CheckOptions) -> Result<CheckResult, CliError> {
    let mut compile = CompileOptions::default();
    if let Some(depth) = options.max_depth {
        compile.max_depth = depth;
    }
    let query = Query::compile_with(&options.query, &compile)?;

    if options.syntax_only {
        return Ok(CheckResult::SyntaxValid {
            assignment: query.is_assignment(),
        });
    }

    let input = options.input.as_deref().ok_or(CliError::NoInput)?;
    let convert = ConvertOptions {
        parse_datetimes: options.parse_dates,
    };
    let mut document = parse_json(input, &convert)?;

    let output = if query.is_assignment() {
        query.mutate(&mut document)?;
        document
    } else {
        query.search(&document)?
    };
    let rendered = if options.pretty {
        to_json_pretty(&output)
    } else {
        to_json(&output)
    };
    Ok(CheckResult::Success(rendered))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(query: &str, input: &str) -> Result<CheckResult, CliError> {
        execute_check(&CheckOptions {
            query: query.into(),
            input: Some(input.into()),
            ..Default::default()
        })
    }

    #[test]
    fn test_search_renders_compact() {
        let result = run("@.a[1:]", r#"{"a": [1, 2, 3]}"#).unwrap();
        assert_eq!(result, CheckResult::Success("[2,3]".into()));
    }

    #[test]
    fn test_assignment_prints_document() {
        let result = run("@.a[0] = 10", r#"{"a": [1, 2]}"#).unwrap();
        assert_eq!(result, CheckResult::Success(r#"{"a":[10,2]}"#.into()));
    }

    #[test]
    fn test_syntax_only() {
        let result = execute_check(&CheckOptions {
            query: "@.a = 1".into(),
            syntax_only: true,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(result, CheckResult::SyntaxValid { assignment: true });
    }

    #[test]
    fn test_missing_input() {
        assert!(matches!(
            execute_check(&CheckOptions {
                query: "@".into(),
                ..Default::default()
            }),
            Err(CliError::NoInput)
        ));
    }
}
