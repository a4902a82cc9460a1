// tests/functions_tests.rs

use mace_lang::{ConvertOptions, EvalError, Query, QueryError, Value, parse_json, to_json};

fn search(query: &str, input: &str) -> Result<Value, QueryError> {
    let root = parse_json(input, &ConvertOptions::default()).expect("test input is valid JSON");
    Query::compile(query)?.search(&root)
}

fn run_table(input: &str, test_cases: Vec<(&str, &str)>) {
    for (query, expected) in test_cases {
        match search(query, input) {
            Ok(v) => assert_eq!(to_json(&v), expected, "query: {}", query),
            Err(e) => panic!("query {:?} failed: {}", query, e),
        }
    }
}

fn argument_position(result: Result<Value, QueryError>) -> Option<usize> {
    match result {
        Err(QueryError::Eval(EvalError::ArgumentError { position, .. })) => Some(position),
        _ => None,
    }
}

// ============================================================================
// Aggregates
// ============================================================================

#[test]
fn test_numeric_aggregates() {
    run_table(
        "[3, 1, 2]",
        vec![
            ("len(@)", "3"),
            ("sum(@)", "6.0"),
            ("mean(@)", "2.0"),
            ("avg(@)", "2.0"),
            ("min(@)", "1.0"),
            ("max(@)", "3.0"),
            ("quantile(@, 0.5)", "2.0"),
            ("quantile(j`[1, 2, 3, 4]`, 0.5)", "2.5"),
            ("min(j`[]`)", "Infinity"),
            ("max(j`[]`)", "-Infinity"),
        ],
    );
}

#[test]
fn test_collection_aggregates() {
    run_table(
        r#"["b", "a", "b", "c", "b"]"#,
        vec![
            ("unique(@)", r#"["b","a","c"]"#),
            ("unique(@, true)", r#"["a","b","c"]"#),
            ("value_counts(@)", r#"[["b",3],["a",1],["c",1]]"#),
            ("value_counts(j`[1, 2, 2]`, true)", "[[2,2],[1,1]]"),
            ("sorted(@)", r#"["a","b","b","b","c"]"#),
            ("sorted(@, true)", r#"["c","b","b","b","a"]"#),
            ("all(j`[true, true]`)", "true"),
            ("all(j`[]`)", "true"),
            ("any(j`[false]`)", "false"),
        ],
    );
}

#[test]
fn test_keyed_aggregates() {
    let records = r#"[{"k": "x", "v": 2}, {"k": "y", "v": 1}, {"k": "x", "v": 3}]"#;
    run_table(
        records,
        vec![
            ("sort_by(@, v)", r#"[{"k":"y","v":1},{"k":"x","v":2},{"k":"x","v":3}]"#),
            ("sort_by(@, v, true)[0].v", "3"),
            ("sort_by(@, -@.v)[:].v", "[3,2,1]"),
            ("max_by(@, v).v", "3"),
            ("min_by(@, v).k", "\"y\""),
            ("min_by(@, @.v * -1).v", "3"),
            (
                "group_by(@, k)",
                r#"{"x":[{"k":"x","v":2},{"k":"x","v":3}],"y":[{"k":"y","v":1}]}"#,
            ),
            ("group_by(@, @.v > 1)[`true`][:].v", "[2,3]"),
        ],
    );
    run_table(
        "[[1, 5], [2, 3]]",
        vec![("max_by(@, 1)", "[1,5]"), ("min_by(@, 1)", "[2,3]"), ("sort_by(@, 1)[0]", "[2,3]")],
    );
}

// ============================================================================
// Builders and reshapers
// ============================================================================

#[test]
fn test_range() {
    run_table(
        "null",
        vec![
            ("range(3)", "[0,1,2]"),
            ("range(3,)", "[0,1,2]"),
            ("range(3, 10, 2)", "[3,5,7,9]"),
            ("range(5, 0, -2)", "[5,3,1]"),
            ("range(2, 1)", "[]"),
            ("range(0)", "[]"),
            ("range(-2)", "[]"),
        ],
    );
    assert_eq!(argument_position(search("range(1, 2, 0)", "null")), Some(2));
}

#[test]
fn test_structural_builders() {
    run_table(
        "null",
        vec![
            ("zip(j`[1, 2]`, j`[\"a\", \"b\"]`)", r#"[[1,"a"],[2,"b"]]"#),
            ("dict(j`[[\"a\", 1], [\"b\", 2]]`)", r#"{"a":1,"b":2}"#),
            ("items(j`{\"a\": 1, \"b\": 2}`)", r#"[["a",1],["b",2]]"#),
            ("keys(j`{\"a\": 1, \"b\": 2}`)", r#"["a","b"]"#),
            ("values(j`{\"a\": 1, \"b\": 2}`)", "[1,2]"),
            ("concat(j`[1]`, j`[2, 3]`, j`[]`)", "[1,2,3]"),
            ("concat(j`{\"a\": 1}`, j`{\"a\": 2, \"b\": 3}`)", r#"{"a":2,"b":3}"#),
            ("append(j`[1]`, 2, `x`)", r#"[1,2,"x"]"#),
            ("add_items(j`{\"a\": 1}`, b, 2, c, 3)", r#"{"a":1,"b":2,"c":3}"#),
            ("flatten(j`[[1, [2]], 3]`)", "[1,[2],3]"),
            ("flatten(j`[[1, [2]], 3]`, 2)", "[1,2,3]"),
            ("flatten(j`[[1, [2]], 3]`, 0)", "[[1,[2]],3]"),
        ],
    );
    assert_eq!(argument_position(search("zip(j`[1]`, j`[1, 2]`)", "null")), Some(1));
    assert_eq!(argument_position(search("dict(j`[[1, 2]]`)", "null")), Some(0));
}

#[test]
fn test_pivot() {
    let rows = r#"[["foo", 2, 3, true], ["bar", 3, 3, true], ["foo", 4, 4, false], ["bar", 5, 4, false]]"#;
    run_table(
        rows,
        vec![
            ("pivot(@, 0, 1)", r#"{"foo":[2,4],"bar":[3,5]}"#),
            ("pivot(@, 0, 1, 2, 3)", r#"{"foo":[2,4],"bar":[3,5],"2":[3,4],"3":[true,false]}"#),
        ],
    );
    let records = r#"[{"k": "a", "v": 1, "i": 0}, {"k": "b", "v": 2, "i": 0}, {"k": "a", "v": 3, "i": 1}, {"k": "b", "v": 4, "i": 1}]"#;
    run_table(records, vec![("pivot(@, k, v, i)", r#"{"a":[1,3],"b":[2,4],"i":[0,1]}"#)]);
}

#[test]
fn test_to_records() {
    run_table(
        "null",
        vec![
            (
                "to_records(j`[{\"a\": 1, \"b\": {\"c\": 2}}]`)",
                r#"[{"a":1,"b.c":2}]"#,
            ),
            (
                "to_records(j`[{\"a\": [1, 2], \"b\": {\"c\": 2}}]`, d)",
                r#"[{"a":[1,2],"b.c":2}]"#,
            ),
            (
                "to_records(j`[[1, [2, 3]]]`, r)",
                r#"[{"col1":1,"col2.col1":2,"col2.col2":3}]"#,
            ),
            ("to_records(j`[{\"a\": [1, 2]}]`, s)", r#"[{"a":"[1,2]"}]"#),
            ("to_records(j`[{\"a\": [1, 2]}]`, n)", r#"[{"a":[1,2]}]"#),
            (
                "to_records(j`{\"a\": [1, 2], \"b\": [3, 4]}`, n)",
                r#"[{"a":1,"b":3},{"a":2,"b":4}]"#,
            ),
        ],
    );
    assert_eq!(argument_position(search("to_records(@, x)", "[]")), Some(1));
}

#[test]
fn test_index() {
    run_table(
        "[1, 2, 1]",
        vec![
            ("index(@, 1)", "0"),
            ("index(@, 1, true)", "2"),
            ("index(j`{\"a\": 1, \"b\": 2}`, 2)", "\"b\""),
        ],
    );
    assert!(matches!(
        search("index(@, 5)", "[1]"),
        Err(QueryError::Eval(EvalError::KeyError(_)))
    ));
}

// ============================================================================
// String functions
// ============================================================================

#[test]
fn test_string_functions() {
    run_table(
        "null",
        vec![
            ("s_len(`héllo`)", "5"),
            ("s_upper(`abc`)", "\"ABC\""),
            ("s_lower(`ABC`)", "\"abc\""),
            ("s_strip(`  hi `)", "\"hi\""),
            ("s_mul(`ab`, 3)", "\"ababab\""),
            ("s_count(`banana`, `an`)", "2"),
            ("s_count(`banana`, g`a`)", "3"),
            ("s_find(`a1b22`, g`\\d+`)", r#"["1","22"]"#),
            ("s_split(`a b  c`)", r#"["a","b","c"]"#),
            ("s_split(`a,b`, `,`)", r#"["a","b"]"#),
            ("s_split(`a1b22c`, g`\\d+`)", r#"["a","b","c"]"#),
            ("s_sub(`abc`, `b`, `x`)", "\"axc\""),
            ("s_sub(`a1b2`, g`(\\d)`, `<$1>`)", "\"a<1>b<2>\""),
            ("s_slice(`hello`, 1:3)", "\"el\""),
            ("s_slice(`hello`, ::-1)", "\"olleh\""),
            ("s_slice(`hello`, -1)", "\"o\""),
            ("s_join(`-`, j`[\"a\", \"b\"]`)", "\"a-b\""),
        ],
    );
    assert!(matches!(
        search("s_slice(`hi`, 5)", "null"),
        Err(QueryError::Eval(EvalError::IndexError(_)))
    ));
    assert_eq!(argument_position(search("s_split(`a`, ``)", "null")), Some(1));
}

#[test]
fn test_string_functions_vectorize() {
    run_table(
        r#"{"names": ["ann", "Bob"], "byk": {"x": "A", "y": "b"}}"#,
        vec![
            ("s_upper(@.names)", r#"["ANN","BOB"]"#),
            ("s_lower(@.byk)", r#"{"x":"a","y":"b"}"#),
            ("s_len(@.names)", "[3,3]"),
            ("s_slice(@.names, 0)", r#"["a","B"]"#),
            ("s_mul(@.names, j`[1, 2]`)", r#"["ann","BobBob"]"#),
            ("@.names[s_len(@) > 2 & @ =~ g`^[A-Z]`]", r#"["Bob"]"#),
        ],
    );
}

// ============================================================================
// Conversions and predicates
// ============================================================================

#[test]
fn test_conversions() {
    run_table(
        "null",
        vec![
            ("str(1.5)", "\"1.5\""),
            ("str(j`[1, 2]`)", r#"["1","2"]"#),
            ("int(`12`)", "12"),
            ("int(2.7)", "2"),
            ("int(-2.7)", "-2"),
            ("int(true)", "1"),
            ("float(`1.5`)", "1.5"),
            ("float(2)", "2.0"),
            ("abs(-3)", "3"),
            ("abs(j`[-1.5, 2]`)", "[1.5,2]"),
            ("abs(-1 / 2)", "\"1/2\""),
            ("round(2.5)", "3"),
            ("round(-1.25, 1)", "-1.3"),
            ("round(j`[1.4, 1.6]`)", "[1,2]"),
            ("log2(8)", "3.0"),
            ("log(1)", "0.0"),
        ],
    );
    assert_eq!(argument_position(search("int(`x`)", "null")), Some(0));
}

#[test]
fn test_predicates() {
    run_table(
        r#"[1, "a", null, [2], 1.5]"#,
        vec![
            ("is_num(@)", "[true,false,false,false,true]"),
            ("is_str(@)", "[false,true,false,false,false]"),
            ("isnull(@)", "[false,false,true,false,false]"),
            ("isna(NaN)", "true"),
            ("isna(1.0)", "false"),
            ("in(2, j`[1, 2]`)", "true"),
            ("in(`a`, j`{\"a\": 1}`)", "true"),
            ("in(`b`, j`{\"a\": 1}`)", "false"),
        ],
    );
    run_table(
        "[1, 3, 2]",
        vec![
            ("in(@, j`[1, 2]`)", "[true,false,true]"),
            ("@[in(@, j`[1, 2]`)]", "[1,2]"),
            ("ifelse(@ > 1, `big`, `small`)", r#"["small","big","big"]"#),
            ("ifelse(len(@) > 2, 1, 0)", "1"),
        ],
    );
}

// ============================================================================
// Argument errors
// ============================================================================

#[test]
fn test_arity_errors() {
    let test_cases = vec![
        ("range(1, 2, 3, 4)", 3),
        ("zip(j`[1]`)", 1),
        ("s_sub(`a`, g`a`)", 2),
        ("len()", 0),
    ];
    for (query, position) in test_cases {
        match Query::compile(query) {
            Err(QueryError::Eval(EvalError::ArgumentError { position: p, .. })) => {
                assert_eq!(p, position, "query: {}", query)
            }
            other => panic!("{} should fail to compile, got {:?}", query, other),
        }
    }
}

#[test]
fn test_kind_errors_name_the_position() {
    let test_cases = vec![
        ("len(1)", 0),
        ("len(g`a`)", 0),
        ("sum(@)", 0),
        ("s_len(1)", 0),
        ("s_find(`a`, 1)", 1),
        ("quantile(j`[1]`, 2)", 1),
        ("sorted(@, 1)", 1),
    ];
    for (query, position) in test_cases {
        assert_eq!(
            argument_position(search(query, r#"["a"]"#)),
            Some(position),
            "query: {}",
            query
        );
    }
}

#[test]
fn test_argument_error_message() {
    let err = search("sum(@)", r#"["a"]"#).unwrap_err();
    assert!(err.to_string().contains("sum() argument 0"), "{}", err);
}

#[test]
fn test_oversized_repetition_is_refused() {
    assert_eq!(
        argument_position(search("s_mul(`ab`, 9223372036854775807)", "null")),
        Some(1)
    );
    assert_eq!(
        argument_position(search("s_mul(`ab`, 1000000000)", "null")),
        Some(1)
    );
    run_table("null", vec![("s_mul(`ab`, -2)", "\"\""), ("s_mul(``, 1000000000)", "\"\"")]);
}
