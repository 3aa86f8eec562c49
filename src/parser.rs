//! CQL parser using nom.
//!
//! Parses the statement dialect the transpiler emits (plus literal values),
//! column types, and human durations such as `1h30m`.
//!
//! ```text
//! SELECT id, at FROM app.events WHERE bucket = ? AND at >= ? LIMIT 10
//! ─┬──── ──┬──── ─┬── ────┬───── ──────────┬────────────── ───┬────
//!  │       │      │       │                │                  │
//!  │       │      │       │                │                  └── Limit
//!  │       │      │       │                └── Conditions (? binds in order)
//!  │       │      │       └── Target (keyspace.table)
//!  │       │      └── Source
//!  │       └── Projection
//!  └── Verb
//! ```

use std::time::Duration;

use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_while1},
    character::complete::{char, digit1, multispace0, satisfy},
    combinator::{map, map_res, not, opt, peek, recognize, value},
    error::{Error, ErrorKind},
    multi::{many0, many1, separated_list1},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};

use crate::ast::{Column, CqlType, Operator, Value};
use crate::error::{CassaError, CassaResult};
use crate::options::SortOrder;

/// A value slot: a positional placeholder or an inline literal.
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    Param,
    Literal(Value),
}

/// `field op term(s)` in a WHERE clause, or `(field, rest...) op (terms...)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Cond {
    pub field: String,
    pub op: Operator,
    pub terms: Vec<Term>,
    pub rest: Vec<String>,
}

/// Right-hand side of a SET assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum SetExpr {
    /// `c = t`
    Assign(Term),
    /// `c = c + t`
    Add(Term),
    /// `c = t + c`
    Prepend(Term),
    /// `c = c - t`
    Subtract(Term),
    /// `c[k] = t`
    MapEntry(Term, Term),
}

/// `USING TTL n AND TIMESTAMP n`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Using {
    pub ttl: Option<u64>,
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub keyspace: Option<String>,
    pub table: String,
}

/// A parsed statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Cql {
    CreateTable {
        if_not_exists: bool,
        target: Target,
        columns: Vec<Column>,
        partition: Vec<String>,
        clustering: Vec<String>,
        order: Vec<(String, SortOrder)>,
        compact: bool,
    },
    DropTable {
        if_exists: bool,
        target: Target,
    },
    Insert {
        target: Target,
        columns: Vec<String>,
        values: Vec<Term>,
        using: Using,
    },
    Update {
        target: Target,
        using: Using,
        assignments: Vec<(String, SetExpr)>,
        conditions: Vec<Cond>,
    },
    Delete {
        target: Target,
        using: Using,
        conditions: Vec<Cond>,
    },
    Select {
        columns: Option<Vec<String>>,
        target: Target,
        conditions: Vec<Cond>,
        limit: Option<usize>,
        allow_filtering: bool,
    },
}

/// Parse one complete statement. A trailing `;` is allowed.
pub fn parse_statement(input: &str) -> CassaResult<Cql> {
    let input = input.trim().trim_end_matches(';');
    finish(input, statement(input))
}

/// Parse a column type such as `map<text, list<int>>`.
pub fn parse_type(input: &str) -> CassaResult<CqlType> {
    let input = input.trim();
    finish(input, cql_type(input))
}

/// Parse a duration such as `90s`, `1h30m` or `250ms`.
pub fn parse_duration(input: &str) -> CassaResult<Duration> {
    let input = input.trim();
    finish(input, duration(input))
}

fn finish<T>(input: &str, result: IResult<&str, T>) -> CassaResult<T> {
    match result {
        Ok((remaining, out)) if remaining.trim().is_empty() => Ok(out),
        Ok((remaining, _)) => Err(CassaError::parse(
            input.len() - remaining.len(),
            format!("Unexpected trailing content: '{}'", remaining),
        )),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(CassaError::parse(
            input.len() - e.input.len(),
            format!("Parse failed: {:?}", e.code),
        )),
        Err(nom::Err::Incomplete(_)) => Err(CassaError::parse(input.len(), "Incomplete input")),
    }
}

fn fail<T>(input: &str, kind: ErrorKind) -> IResult<&str, T> {
    Err(nom::Err::Error(Error::new(input, kind)))
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn ws<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

/// Case-insensitive keyword that is not the prefix of a longer word.
fn kw<'a>(word: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    ws(terminated(tag_no_case(word), not(peek(satisfy(is_ident_char)))))
}

/// Parse an identifier. Bare identifiers fold to lowercase.
fn identifier(input: &str) -> IResult<&str, String> {
    ws(alt((
        double_quoted,
        map(take_while1(is_ident_char), |s: &str| s.to_lowercase()),
    )))(input)
}

/// Parse text between `quote` characters, where a doubled quote escapes itself.
fn quoted(input: &str, quote: char) -> IResult<&str, String> {
    let (mut rest, _) = char(quote)(input)?;
    let mut out = String::new();
    loop {
        match rest.find(quote) {
            None => return fail(rest, ErrorKind::Char),
            Some(i) => {
                out.push_str(&rest[..i]);
                rest = &rest[i + 1..];
                if rest.starts_with(quote) {
                    out.push(quote);
                    rest = &rest[1..];
                } else {
                    return Ok((rest, out));
                }
            }
        }
    }
}

fn double_quoted(input: &str) -> IResult<&str, String> {
    quoted(input, '"')
}

fn single_quoted(input: &str) -> IResult<&str, String> {
    quoted(input, '\'')
}

fn ident_list(input: &str) -> IResult<&str, Vec<String>> {
    separated_list1(ws(char(',')), identifier)(input)
}

fn parenthesized<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(ws(char('(')), inner, ws(char(')')))
}

fn qualified_name(input: &str) -> IResult<&str, Target> {
    let (input, first) = identifier(input)?;
    let (input, second) = opt(preceded(char('.'), identifier))(input)?;
    let target = match second {
        Some(table) => Target {
            keyspace: Some(first),
            table,
        },
        None => Target {
            keyspace: None,
            table: first,
        },
    };
    Ok((input, target))
}

fn cql_type(input: &str) -> IResult<&str, CqlType> {
    let (rest, name) = identifier(input)?;
    let (rest, args) = opt(delimited(
        ws(char('<')),
        separated_list1(ws(char(',')), cql_type),
        ws(char('>')),
    ))(rest)?;
    let ty = match (name.as_str(), args) {
        ("text" | "varchar" | "ascii", None) => CqlType::Text,
        ("int" | "smallint" | "tinyint", None) => CqlType::Int,
        ("bigint" | "varint", None) => CqlType::BigInt,
        ("double" | "float" | "decimal", None) => CqlType::Double,
        ("boolean", None) => CqlType::Boolean,
        ("uuid" | "timeuuid", None) => CqlType::Uuid,
        ("timestamp", None) => CqlType::Timestamp,
        ("blob", None) => CqlType::Blob,
        ("counter", None) => CqlType::Counter,
        ("list", Some(mut args)) if args.len() == 1 => CqlType::List(Box::new(args.remove(0))),
        ("map", Some(mut args)) if args.len() == 2 && args[0] == CqlType::Text => {
            CqlType::Map(Box::new(args.remove(1)))
        }
        _ => return fail(input, ErrorKind::Verify),
    };
    Ok((rest, ty))
}

fn duration(input: &str) -> IResult<&str, Duration> {
    let part = pair(
        map_res(digit1, |s: &str| s.parse::<u64>()),
        alt((tag("ms"), tag("s"), tag("m"), tag("h"), tag("d"))),
    );
    let (input, parts) = many1(part)(input)?;
    let total = parts.into_iter().fold(Duration::ZERO, |acc, (n, unit)| {
        acc + match unit {
            "ms" => Duration::from_millis(n),
            "s" => Duration::from_secs(n),
            "m" => Duration::from_secs(n * 60),
            "h" => Duration::from_secs(n * 3600),
            _ => Duration::from_secs(n * 86_400),
        }
    });
    Ok((input, total))
}

/// Parse a number (integer or float).
fn number(input: &str) -> IResult<&str, Value> {
    let (rest, num_str) = recognize(tuple((
        opt(char('-')),
        digit1,
        opt(pair(char('.'), digit1)),
    )))(input)?;

    if num_str.contains('.') {
        match num_str.parse() {
            Ok(f) => Ok((rest, Value::Double(f))),
            Err(_) => fail(input, ErrorKind::Float),
        }
    } else {
        match num_str.parse() {
            Ok(n) => Ok((rest, Value::Int(n))),
            Err(_) => fail(input, ErrorKind::Digit),
        }
    }
}

fn literal(input: &str) -> IResult<&str, Value> {
    alt((
        value(Value::Null, kw("null")),
        value(Value::Bool(true), kw("true")),
        value(Value::Bool(false), kw("false")),
        number,
        map(single_quoted, Value::Text),
    ))(input)
}

fn term(input: &str) -> IResult<&str, Term> {
    ws(alt((value(Term::Param, char('?')), map(literal, Term::Literal))))(input)
}

fn term_list(input: &str) -> IResult<&str, Vec<Term>> {
    parenthesized(separated_list1(ws(char(',')), term))(input)
}

fn comparison(input: &str) -> IResult<&str, Operator> {
    ws(alt((
        value(Operator::Gte, tag(">=")),
        value(Operator::Lte, tag("<=")),
        value(Operator::Gt, tag(">")),
        value(Operator::Lt, tag("<")),
        value(Operator::Eq, tag("=")),
    )))(input)
}

fn tuple_condition(input: &str) -> IResult<&str, Cond> {
    let (input, mut fields) = parenthesized(ident_list)(input)?;
    let (input, op) = comparison(input)?;
    let (input, terms) = term_list(input)?;
    if fields.len() != terms.len() {
        return fail(input, ErrorKind::Verify);
    }
    let field = fields.remove(0);
    Ok((
        input,
        Cond {
            field,
            op,
            terms,
            rest: fields,
        },
    ))
}

fn condition(input: &str) -> IResult<&str, Cond> {
    if let Ok(parsed) = tuple_condition(input) {
        return Ok(parsed);
    }
    let (input, field) = identifier(input)?;
    if let Ok((rest, terms)) = preceded(kw("IN"), term_list)(input) {
        return Ok((
            rest,
            Cond {
                field,
                op: Operator::In,
                terms,
                rest: Vec::new(),
            },
        ));
    }
    let (input, op) = comparison(input)?;
    let (input, t) = term(input)?;
    Ok((
        input,
        Cond {
            field,
            op,
            terms: vec![t],
            rest: Vec::new(),
        },
    ))
}

fn where_clause(input: &str) -> IResult<&str, Vec<Cond>> {
    preceded(kw("WHERE"), separated_list1(kw("AND"), condition))(input)
}

fn signed(input: &str) -> IResult<&str, i64> {
    map_res(recognize(pair(opt(char('-')), digit1)), |s: &str| s.parse::<i64>())(input)
}

fn using(input: &str) -> IResult<&str, Using> {
    #[derive(Clone)]
    enum Item {
        Ttl(u64),
        Timestamp(i64),
    }
    let item = alt((
        map(preceded(kw("TTL"), ws(map_res(digit1, |s: &str| s.parse::<u64>()))), Item::Ttl),
        map(preceded(kw("TIMESTAMP"), ws(signed)), Item::Timestamp),
    ));
    let (input, items) = preceded(kw("USING"), separated_list1(kw("AND"), item))(input)?;
    let mut out = Using::default();
    for item in items {
        match item {
            Item::Ttl(n) => out.ttl = Some(n),
            Item::Timestamp(n) => out.timestamp = Some(n),
        }
    }
    Ok((input, out))
}

fn assignment(input: &str) -> IResult<&str, (String, SetExpr)> {
    let (input, field) = identifier(input)?;

    if let Ok((rest, (key, val))) = pair(
        delimited(ws(char('[')), term, ws(char(']'))),
        preceded(ws(char('=')), term),
    )(input)
    {
        return Ok((rest, (field, SetExpr::MapEntry(key, val))));
    }

    let (input, _) = ws(char('='))(input)?;

    if let Ok((rest, (same, op, t))) =
        tuple((identifier, ws(alt((char('+'), char('-')))), term))(input)
    {
        if same == field {
            let expr = if op == '+' {
                SetExpr::Add(t)
            } else {
                SetExpr::Subtract(t)
            };
            return Ok((rest, (field, expr)));
        }
    }

    if let Ok((rest, (t, _, same))) = tuple((term, ws(char('+')), identifier))(input) {
        if same == field {
            return Ok((rest, (field, SetExpr::Prepend(t))));
        }
    }

    let (input, t) = term(input)?;
    Ok((input, (field, SetExpr::Assign(t))))
}

#[derive(Debug, Clone)]
enum TableItem {
    Column(Column),
    PrimaryKey(Vec<String>, Vec<String>),
}

fn primary_key(input: &str) -> IResult<&str, TableItem> {
    let (input, _) = tuple((kw("PRIMARY"), kw("KEY"), ws(char('('))))(input)?;
    let (input, partition) = alt((parenthesized(ident_list), map(identifier, |i| vec![i])))(input)?;
    let (input, clustering) = many0(preceded(ws(char(',')), identifier))(input)?;
    let (input, _) = ws(char(')'))(input)?;
    Ok((input, TableItem::PrimaryKey(partition, clustering)))
}

fn table_item(input: &str) -> IResult<&str, TableItem> {
    alt((
        primary_key,
        map(pair(identifier, cql_type), |(name, ty)| {
            TableItem::Column(Column::new(name, ty))
        }),
    ))(input)
}

#[derive(Debug, Clone)]
enum WithItem {
    Order(Vec<(String, SortOrder)>),
    Compact,
}

fn with_item(input: &str) -> IResult<&str, WithItem> {
    let direction = alt((
        value(SortOrder::Asc, kw("ASC")),
        value(SortOrder::Desc, kw("DESC")),
    ));
    alt((
        map(
            preceded(
                tuple((kw("CLUSTERING"), kw("ORDER"), kw("BY"))),
                parenthesized(separated_list1(ws(char(',')), pair(identifier, direction))),
            ),
            WithItem::Order,
        ),
        value(WithItem::Compact, tuple((kw("COMPACT"), kw("STORAGE")))),
    ))(input)
}

fn create_table(input: &str) -> IResult<&str, Cql> {
    let (input, _) = tuple((kw("CREATE"), kw("TABLE")))(input)?;
    let (input, if_not_exists) = opt(tuple((kw("IF"), kw("NOT"), kw("EXISTS"))))(input)?;
    let (input, target) = qualified_name(input)?;
    let (input, items) = parenthesized(separated_list1(ws(char(',')), table_item))(input)?;
    let (input, with) = opt(preceded(kw("WITH"), separated_list1(kw("AND"), with_item)))(input)?;

    let mut columns = Vec::new();
    let mut key = None;
    for item in items {
        match item {
            TableItem::Column(c) => columns.push(c),
            TableItem::PrimaryKey(p, c) => key = Some((p, c)),
        }
    }
    let (partition, clustering) = match key {
        Some(k) => k,
        None => return fail(input, ErrorKind::Verify),
    };

    let mut order = Vec::new();
    let mut compact = false;
    for item in with.unwrap_or_default() {
        match item {
            WithItem::Order(o) => order = o,
            WithItem::Compact => compact = true,
        }
    }

    Ok((
        input,
        Cql::CreateTable {
            if_not_exists: if_not_exists.is_some(),
            target,
            columns,
            partition,
            clustering,
            order,
            compact,
        },
    ))
}

fn drop_table(input: &str) -> IResult<&str, Cql> {
    let (input, _) = tuple((kw("DROP"), kw("TABLE")))(input)?;
    let (input, if_exists) = opt(pair(kw("IF"), kw("EXISTS")))(input)?;
    let (input, target) = qualified_name(input)?;
    Ok((
        input,
        Cql::DropTable {
            if_exists: if_exists.is_some(),
            target,
        },
    ))
}

fn insert(input: &str) -> IResult<&str, Cql> {
    let (input, _) = tuple((kw("INSERT"), kw("INTO")))(input)?;
    let (input, target) = qualified_name(input)?;
    let (input, columns) = parenthesized(ident_list)(input)?;
    let (input, _) = kw("VALUES")(input)?;
    let (input, values) = term_list(input)?;
    let (input, using) = opt(using)(input)?;
    Ok((
        input,
        Cql::Insert {
            target,
            columns,
            values,
            using: using.unwrap_or_default(),
        },
    ))
}

fn update(input: &str) -> IResult<&str, Cql> {
    let (input, _) = kw("UPDATE")(input)?;
    let (input, target) = qualified_name(input)?;
    let (input, using) = opt(using)(input)?;
    let (input, _) = kw("SET")(input)?;
    let (input, assignments) = separated_list1(ws(char(',')), assignment)(input)?;
    let (input, conditions) = where_clause(input)?;
    Ok((
        input,
        Cql::Update {
            target,
            using: using.unwrap_or_default(),
            assignments,
            conditions,
        },
    ))
}

fn delete(input: &str) -> IResult<&str, Cql> {
    let (input, _) = tuple((kw("DELETE"), kw("FROM")))(input)?;
    let (input, target) = qualified_name(input)?;
    let (input, using) = opt(using)(input)?;
    let (input, conditions) = where_clause(input)?;
    Ok((
        input,
        Cql::Delete {
            target,
            using: using.unwrap_or_default(),
            conditions,
        },
    ))
}

fn select(input: &str) -> IResult<&str, Cql> {
    let (input, _) = kw("SELECT")(input)?;
    let (input, columns) = alt((value(None, ws(char('*'))), map(ident_list, Some)))(input)?;
    let (input, _) = kw("FROM")(input)?;
    let (input, target) = qualified_name(input)?;
    let (input, conditions) = opt(where_clause)(input)?;
    let (input, limit) = opt(preceded(
        kw("LIMIT"),
        ws(map_res(digit1, |s: &str| s.parse::<usize>())),
    ))(input)?;
    let (input, allow_filtering) = opt(pair(kw("ALLOW"), kw("FILTERING")))(input)?;
    Ok((
        input,
        Cql::Select {
            columns,
            target,
            conditions: conditions.unwrap_or_default(),
            limit,
            allow_filtering: allow_filtering.is_some(),
        },
    ))
}

fn statement(input: &str) -> IResult<&str, Cql> {
    alt((create_table, drop_table, insert, update, delete, select))(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(table: &str) -> Target {
        Target {
            keyspace: Some("app".into()),
            table: table.into(),
        }
    }

    #[test]
    fn test_select() {
        let cql = parse_statement(
            "SELECT id, at FROM app.events WHERE bucket = ? AND at >= ? AND id IN (?, 'x') LIMIT 10 ALLOW FILTERING",
        )
        .unwrap();
        let Cql::Select {
            columns,
            target: t,
            conditions,
            limit,
            allow_filtering,
        } = cql
        else {
            panic!("expected select");
        };
        assert_eq!(columns, Some(vec!["id".to_string(), "at".to_string()]));
        assert_eq!(t, target("events"));
        assert_eq!(conditions.len(), 3);
        assert_eq!(conditions[1].op, Operator::Gte);
        assert_eq!(
            conditions[2].terms,
            vec![Term::Param, Term::Literal(Value::from("x"))]
        );
        assert_eq!(limit, Some(10));
        assert!(allow_filtering);
    }

    #[test]
    fn test_select_tuple_condition() {
        let cql = parse_statement("SELECT * FROM app.t WHERE k = ? AND (day, id) > (?, 'x')").unwrap();
        let Cql::Select { conditions, .. } = cql else {
            panic!("expected select");
        };
        assert_eq!(conditions.len(), 2);
        assert!(conditions[0].rest.is_empty());
        assert_eq!(conditions[1].field, "day");
        assert_eq!(conditions[1].rest, vec!["id".to_string()]);
        assert_eq!(conditions[1].op, Operator::Gt);
        assert_eq!(conditions[1].terms, vec![Term::Param, Term::Literal(Value::from("x"))]);

        assert!(parse_statement("SELECT * FROM app.t WHERE (day, id) > (?)").is_err());
    }

    #[test]
    fn test_select_star_without_keyspace() {
        let cql = parse_statement("select * from users;").unwrap();
        assert!(matches!(cql, Cql::Select { columns: None, conditions, .. } if conditions.is_empty()));
    }

    #[test]
    fn test_insert_with_using() {
        let cql =
            parse_statement("INSERT INTO app.users (id, \"createdAt\") VALUES (?, ?) USING TTL 30 AND TIMESTAMP -5")
                .unwrap();
        let Cql::Insert { columns, values, using, .. } = cql else {
            panic!("expected insert");
        };
        assert_eq!(columns, vec!["id".to_string(), "createdAt".to_string()]);
        assert_eq!(values.len(), 2);
        assert_eq!(using, Using { ttl: Some(30), timestamp: Some(-5) });
    }

    #[test]
    fn test_update_assignment_forms() {
        let cql = parse_statement(
            "UPDATE app.users SET name = ?, hits = hits + ?, tags = ? + tags, tags = tags - ?, attrs[?] = ? WHERE id = ?",
        )
        .unwrap();
        let Cql::Update { assignments, conditions, .. } = cql else {
            panic!("expected update");
        };
        let kinds: Vec<&str> = assignments
            .iter()
            .map(|(_, e)| match e {
                SetExpr::Assign(_) => "assign",
                SetExpr::Add(_) => "add",
                SetExpr::Prepend(_) => "prepend",
                SetExpr::Subtract(_) => "subtract",
                SetExpr::MapEntry(..) => "entry",
            })
            .collect();
        assert_eq!(kinds, vec!["assign", "add", "prepend", "subtract", "entry"]);
        assert_eq!(conditions.len(), 1);
    }

    #[test]
    fn test_create_table_forms() {
        let cql = parse_statement(
            "CREATE TABLE IF NOT EXISTS app.events (bucket timestamp, at timestamp, id text, tags list<text>, PRIMARY KEY ((bucket), at, id)) WITH CLUSTERING ORDER BY (at DESC) AND COMPACT STORAGE",
        )
        .unwrap();
        let Cql::CreateTable {
            if_not_exists,
            columns,
            partition,
            clustering,
            order,
            compact,
            ..
        } = cql
        else {
            panic!("expected create");
        };
        assert!(if_not_exists);
        assert_eq!(columns.len(), 4);
        assert_eq!(columns[3].ty, CqlType::List(Box::new(CqlType::Text)));
        assert_eq!(partition, vec!["bucket".to_string()]);
        assert_eq!(clustering, vec!["at".to_string(), "id".to_string()]);
        assert_eq!(order, vec![("at".to_string(), SortOrder::Desc)]);
        assert!(compact);

        let bare = parse_statement("CREATE TABLE t (a int, b int, PRIMARY KEY (a, b))").unwrap();
        let Cql::CreateTable { partition, clustering, .. } = bare else {
            panic!("expected create");
        };
        assert_eq!(partition, vec!["a".to_string()]);
        assert_eq!(clustering, vec!["b".to_string()]);
    }

    #[test]
    fn test_delete_and_drop() {
        let cql = parse_statement("DELETE FROM app.users USING TIMESTAMP 7 WHERE id = ?").unwrap();
        assert!(matches!(cql, Cql::Delete { using: Using { timestamp: Some(7), .. }, .. }));

        let cql = parse_statement("DROP TABLE IF EXISTS app.users").unwrap();
        assert_eq!(
            cql,
            Cql::DropTable {
                if_exists: true,
                target: target("users")
            }
        );
    }

    #[test]
    fn test_trailing_garbage_rejected() {
        let err = parse_statement("SELECT * FROM t WHERE a = ? nonsense").unwrap_err();
        assert!(matches!(err, CassaError::Parse { .. }));
    }

    #[test]
    fn test_parse_type() {
        assert_eq!(parse_type("text").unwrap(), CqlType::Text);
        assert_eq!(
            parse_type("map<text, list<bigint>>").unwrap(),
            CqlType::Map(Box::new(CqlType::List(Box::new(CqlType::BigInt))))
        );
        assert!(parse_type("map<int, text>").is_err());
        assert!(parse_type("widget").is_err());
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("2d").unwrap(), Duration::from_secs(172_800));
        assert!(parse_duration("soon").is_err());
    }
}
