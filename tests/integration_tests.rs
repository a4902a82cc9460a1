use mace_lang::{
    BinOp, ConvertOptions, EvalError, Query, QueryError, Value, parse_json, to_json,
};

const DOC: &str = r#"{
    "foo": [[0, 1, 2], [3, 4, 5], [6, 7, 8]],
    "bar": {"a": false, "b": ["a`g", "bah"]},
    "baz": "z",
    "quz": {},
    "jub": [],
    "guzo": [[[1]], [[2], [3]]],
    "7": [{"foo": 2}],
    "_": {"0": 0}
}"#;

fn doc(json: &str) -> Value {
    parse_json(json, &ConvertOptions::default()).expect("test input is valid JSON")
}

fn search(query: &str, input: &str) -> Result<Value, QueryError> {
    Query::compile(query)?.search(&doc(input))
}

fn search_json(query: &str, input: &str) -> String {
    match search(query, input) {
        Ok(v) => to_json(&v),
        Err(e) => panic!("query {:?} failed: {}", query, e),
    }
}

fn run_table(input: &str, test_cases: Vec<(&str, &str)>) {
    for (query, expected) in test_cases {
        assert_eq!(search_json(query, input), expected, "query: {}", query);
    }
}

fn is_type_error(result: Result<Value, QueryError>) -> bool {
    matches!(result, Err(QueryError::Eval(EvalError::TypeError(_))))
}

// ============================================================================
// Indexing
// ============================================================================

#[test]
fn test_slices_of_nested_arrays() {
    run_table(
        r#"{"foo": [[0, 1, 2], [3, 4, 5], [6, 7, 8]]}"#,
        vec![
            ("@.foo[-2:]", "[[3,4,5],[6,7,8]]"),
            ("@.foo[:3:2]", "[[0,1,2],[6,7,8]]"),
            ("flatten(@.foo, 2)", "[0,1,2,3,4,5,6,7,8]"),
        ],
    );
}

#[test]
fn test_key_and_position_access() {
    run_table(
        DOC,
        vec![
            ("@.foo[1][1]", "4"),
            ("@.foo[:][0]", "[0,3,6]"),
            ("@.foo[0][2:, 0]", "[2,0]"),
            ("@.foo[::-1][0]", "[6,3,0]"),
            ("@.foo[1::9223372036854775807]", "[[3,4,5]]"),
            ("@.foo[0][1::9223372036854775807]", "[1]"),
            ("@.foo[0][::-9223372036854775807]", "[2]"),
            ("@.baz", "\"z\""),
            ("@.`7`[0].foo", "2"),
            ("@._.0", "0"),
            ("@.jub", "[]"),
            ("@.quz", "{}"),
            ("@.bar.b[-1]", "\"bah\""),
            ("@[baz, jub]", r#"{"baz":"z","jub":[]}"#),
            ("@.g`^ba`", r#"{"bar":{"a":false,"b":["a`g","bah"]},"baz":"z"}"#),
            ("@.bar!.a", r#"{"b":["a`g","bah"]}"#),
            ("@.bar.*", r#"{"a":false,"b":["a`g","bah"]}"#),
            ("@.foo[1]![1]", "[3,5]"),
        ],
    );
}

#[test]
fn test_missing_selections_are_empty() {
    run_table(
        DOC,
        vec![
            ("@.nope", "{}"),
            ("@.foo[5]", "[]"),
            ("@[nope, baz]", r#"{"baz":"z"}"#),
            ("@.foo[7, 1][0]", "[3]"),
        ],
    );
}

#[test]
fn test_wide_selections_and_complements() {
    let keys: Vec<String> = (0..20_000).map(|i| format!("\"k{}\": {}", i, i)).collect();
    let wide = format!("{{{}}}", keys.join(", "));
    assert_eq!(search_json("len(@![g`^k1`])", &wide), "8889");
    assert_eq!(search_json("len(@[g`^k`, g`0$`])", &wide), "20000");
    assert_eq!(search_json("@![g`^k.{1,4}$`, g`^k1....$`]", &wide), "{}");

    let items: Vec<String> = (0..20_000).map(|i| i.to_string()).collect();
    let long = format!("[{}]", items.join(","));
    assert_eq!(search_json("@![:19998]", &long), "[19998,19999]");
    assert_eq!(search_json("len(@![::2, 1::4])", &long), "5000");
}

#[test]
fn test_indexing_wrong_kind_is_type_error() {
    assert!(is_type_error(search("@.foo.a", DOC)));
    assert!(is_type_error(search("@.bar[0]", DOC)));
    assert!(is_type_error(search("@.baz.*", DOC)));
}

// ============================================================================
// Recursive search
// ============================================================================

#[test]
fn test_recursive_search() {
    run_table(
        DOC,
        vec![
            ("@..a", "[false]"),
            ("@..foo", "[[[0,1,2],[3,4,5],[6,7,8]],2]"),
            ("@..`0`", "[0]"),
            ("@..g`^b`", r#"[{"a":false,"b":["a`g","bah"]},"z"]"#),
            ("@..nothing", "[]"),
            ("@.guzo..*", "[1,2,3]"),
            ("@.bar..*", r#"[false,"a`g","bah"]"#),
            ("@..`7`[0].foo", "[2]"),
            ("@..[a, baz]", r#"[false,"z"]"#),
        ],
    );
}

// ============================================================================
// Boolean indexing
// ============================================================================

#[test]
fn test_filters() {
    run_table(
        DOC,
        vec![
            ("@.foo[:][@ > 4]", "[[5],[6,7,8]]"),
            ("@.foo[1][@ % 2 == 0]", "[4]"),
            ("@.bar.b[@ =~ g`^ba`]", r#"["bah"]"#),
            ("@.bar.b[@ =~ `g$`]", r#"["a`g"]"#),
            ("@.foo[0][not (@ == 1)]", "[0,2]"),
            ("@.foo[0][true]", "[0,1,2]"),
            ("@.foo[0][false]", "[]"),
            ("@.baz[true]", "\"z\""),
            ("@.baz[false]", "[]"),
        ],
    );
}

#[test]
fn test_object_mask() {
    run_table(
        r#"{"a": 1, "b": 5, "c": 3}"#,
        vec![
            ("@[@ > 2]", r#"{"b":5,"c":3}"#),
            ("@[@ > 9]", "{}"),
            ("@[@ > 2] * 10", r#"{"b":50,"c":30}"#),
        ],
    );
}

#[test]
fn test_mask_shape_mismatch() {
    assert!(is_type_error(search("@[j`[true, false]`]", "[1, 2, 3]")));
    assert!(is_type_error(search("@[@]", "[1, 2]")));
}

// ============================================================================
// Projections and map steps
// ============================================================================

#[test]
fn test_projections() {
    run_table(
        DOC,
        vec![
            ("@.foo{foo: @[0], bar: @[1][:2]}", r#"{"foo":[0,1,2],"bar":[3,4]}"#),
            ("@.foo{@[0][0], @[2][2]}", "[0,8]"),
            ("@.foo[:]{a: @[0], n: len(@)}", r#"[{"a":0,"n":3},{"a":3,"n":3},{"a":6,"n":3}]"#),
            ("1{1, 2}", "[1,2]"),
            ("@.foo[:]->sum(@)", "[3.0,12.0,21.0]"),
            ("@.foo->len(@)", "3"),
            ("@.foo[0]->(@ + 1)", "[1,2,3]"),
        ],
    );
}

// ============================================================================
// Arithmetic and broadcasting
// ============================================================================

#[test]
fn test_broadcasting() {
    run_table(
        DOC,
        vec![
            ("@.foo[0] + 1", "[1,2,3]"),
            ("@.foo[0] * @.foo[1]", "[0,4,10]"),
            ("@.foo[1] - @.foo[0]", "[3,3,3]"),
            ("-@.foo[0]", "[0,-1,-2]"),
            ("@.foo[0] & 1", "[0,1,0]"),
            ("10 - @.foo[2]", "[4,3,2]"),
            ("@.foo * 2", "[[0,2,4],[6,8,10],[12,14,16]]"),
        ],
    );
}

#[test]
fn test_arithmetic() {
    run_table(
        "null",
        vec![
            ("1 + 2 * 3", "7"),
            ("(1 + 2) * 3", "9"),
            ("2 ** 3 ** 2", "512"),
            ("-2 ** 2", "-4"),
            ("10 - 4 - 3", "3"),
            ("7 // 2", "3"),
            ("-7 // 2", "-4"),
            ("7 % 3", "1"),
            ("2.5 * 2", "5.0"),
            ("1.5 / 3", "0.5"),
            ("0x10 + 1", "17"),
            ("`ab` + `cd`", "\"abcd\""),
            ("`ab` * 2", "\"abab\""),
            ("true ^ false", "true"),
            ("true & false", "false"),
            ("false | true", "true"),
        ],
    );
}

#[test]
fn test_exact_fractions() {
    run_table(
        "null",
        vec![
            ("1 / 3", "\"1/3\""),
            ("6 / 3", "2"),
            ("2 / 3 + 1 / 3", "1"),
            ("1 / 3 * 3", "1"),
            ("2 ** -3", "\"1/8\""),
            ("-1 / 2", "\"-1/2\""),
            ("1 / 2 + 0.25", "0.75"),
            ("1 / 3 < 0.34", "true"),
            ("2 / 4 == 0.5", "true"),
            ("1 / 3 == 2 / 6", "true"),
        ],
    );
}

#[test]
fn test_numeric_tower_comparisons() {
    run_table(
        "null",
        vec![
            ("2 < true", "false"),
            ("2 > true", "true"),
            ("2 == true", "false"),
            ("true < 2", "true"),
            ("true > 2", "false"),
            ("true == 2", "false"),
            ("0.5 > true", "false"),
            ("0.5 < true", "true"),
            ("0.5 == true", "false"),
            ("1.0 == true", "true"),
            ("1.0 < true", "false"),
            ("1.0 > true", "false"),
            ("true == 1.0", "true"),
            ("true < 1.0", "false"),
            ("true > 1.0", "false"),
            ("0.0 == false", "true"),
            ("0.0 < false", "false"),
            ("0.0 > false", "false"),
            ("false == 0.0", "true"),
            ("false < 0.0", "false"),
            ("false > 0.0", "false"),
            ("false > true", "false"),
            ("false < true", "true"),
            ("false == true", "false"),
            ("-1 > false", "false"),
            ("-1 < false", "true"),
            ("-1 == false", "false"),
            ("false < -1", "false"),
            ("false > -1", "true"),
            ("false == -1", "false"),
            ("-1 < -0.6", "true"),
            ("-1 > -0.6", "false"),
            ("17 < 17.4", "true"),
            ("17.4 > 17", "true"),
            ("17 == 17.4", "false"),
            ("17.4 == 17", "false"),
            ("17 > 16.6", "true"),
            ("17 == 16.6", "false"),
            ("16.6 < 17", "true"),
            ("16.6 == 17", "false"),
            ("true == 1", "true"),
            ("1 == 1.0", "true"),
            ("1.5 <= 2", "true"),
            ("true >= 0.5", "true"),
            ("false != 0", "false"),
            ("`a` < `b`", "true"),
            ("`a` == 1", "false"),
            ("NaN < 1", "false"),
        ],
    );
}

#[test]
fn test_bool_int_float_pairs_compare_by_value() {
    let operands = [
        ("false", 0.0),
        ("true", 1.0),
        ("-1", -1.0),
        ("0", 0.0),
        ("1", 1.0),
        ("2", 2.0),
        ("-0.6", -0.6),
        ("0.0", 0.0),
        ("0.5", 0.5),
        ("1.0", 1.0),
        ("2.5", 2.5),
    ];
    for (left, x) in operands {
        for (right, y) in operands {
            let test_cases = [("<", x < y), (">", x > y), ("==", x == y)];
            for (op, expected) in test_cases {
                let query = format!("{} {} {}", left, op, right);
                assert_eq!(search_json(&query, "null"), expected.to_string(), "query: {}", query);
            }
        }
    }
}

#[test]
fn test_every_operator_rejects_mismatched_shapes() {
    for op in BinOp::ALL {
        let uneven = format!("j`[1, 2]` {} j`[1, 2, 3]`", op);
        assert!(is_type_error(search(&uneven, "null")), "{}", uneven);

        let mixed = format!("j`[1]` {} j`{{\"a\": 1}}`", op);
        assert!(is_type_error(search(&mixed, "null")), "{}", mixed);

        let keys = format!("j`{{\"a\": 1}}` {} j`{{\"b\": 1}}`", op);
        assert!(is_type_error(search(&keys, "null")), "{}", keys);
    }
}

#[test]
fn test_every_operator_rejects_unsupported_scalars() {
    // equality is defined between any two scalars
    let operators = BinOp::ALL
        .into_iter()
        .filter(|op| !matches!(op, BinOp::Equal | BinOp::NotEqual));
    for op in operators {
        let query = format!("null {} `a`", op);
        assert!(is_type_error(search(&query, "null")), "{}", query);
    }
    assert!(is_type_error(search("-`a`", "null")));
}

// ============================================================================
// Dates
// ============================================================================

#[test]
fn test_dates_compare() {
    let input = r#"{"d": "2024-01-02", "t": "2024-01-02 10:00:00", "s": "2024-13-01"}"#;
    let root = parse_json(input, &ConvertOptions { parse_datetimes: true }).unwrap();
    let run = |q: &str| to_json(&Query::compile(q).unwrap().search(&root).unwrap());

    assert_eq!(run("@.d < @.t"), "true");
    assert_eq!(run("@.d"), "\"2024-01-02\"");
    assert_eq!(run("@.t"), "\"2024-01-02 10:00:00\"");
    // not a real date, so it stays a string
    assert!(matches!(
        Query::compile("@.s").unwrap().search(&root).unwrap(),
        Value::String(_)
    ));
}

// ============================================================================
// Query handles
// ============================================================================

#[test]
fn test_query_reuse() {
    let query = Query::compile("@[@ > 1] * 2").unwrap();
    assert_eq!(to_json(&query.search(&doc("[1, 2, 3]")).unwrap()), "[4,6]");
    assert_eq!(to_json(&query.search(&doc("[5]")).unwrap()), "[10]");
    assert_eq!(query.text(), "@[@ > 1] * 2");
    assert!(!query.is_assignment());
}

#[test]
fn test_compile_errors() {
    assert!(matches!(Query::compile("@.foo["), Err(QueryError::Syntax(_))));
    assert!(matches!(Query::compile("nope(@)"), Err(QueryError::Syntax(_))));
    assert!(matches!(
        Query::compile("len(1)"),
        Err(QueryError::Eval(EvalError::ArgumentError { position: 0, .. }))
    ));
    assert!(matches!(
        Query::compile("g`a`"),
        Err(QueryError::Eval(EvalError::TypeError(_)))
    ));
}

#[test]
fn test_runtime_error_is_scoped_to_the_call() {
    let query = Query::compile("@ + 1").unwrap();
    assert!(query.search(&doc(r#""x""#)).is_err());
    assert_eq!(to_json(&query.search(&doc("1")).unwrap()), "2");
}

#[test]
fn test_error_messages() {
    let err = search("@.a + 1", r#"{"a": "x"}"#).unwrap_err();
    assert!(err.to_string().starts_with("Type error"), "{}", err);
    let err = Query::compile("@.a[").unwrap_err();
    assert!(err.to_string().starts_with("Syntax error"), "{}", err);
}
