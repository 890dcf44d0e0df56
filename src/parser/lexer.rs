// Token-level parsers shared by the stage parsers

use crate::loader::parse_date;
use chrono::NaiveDate;
use nom::{
    branch::alt,
    bytes::complete::{tag, take_while},
    character::complete::{alpha1, alphanumeric1, char, multispace0},
    combinator::{map, map_opt, recognize},
    multi::{many0, separated_list0},
    number::complete::double,
    sequence::{delimited, pair, terminated},
    IResult,
};

/// Wrap a parser so it skips surrounding whitespace
pub fn ws<'a, F, O>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

/// Bare word: letters, digits, `_` and `-`, starting with a letter or `_`
pub fn identifier(input: &str) -> IResult<&str, String> {
    map(
        recognize(pair(
            alt((alpha1, tag("_"))),
            many0(alt((alphanumeric1, tag("_"), tag("-")))),
        )),
        |s: &str| s.to_string(),
    )(input)
}

/// Double-quoted text, no escapes
pub fn string_literal(input: &str) -> IResult<&str, String> {
    map(
        delimited(char('"'), take_while(|c: char| c != '"'), char('"')),
        |s: &str| s.to_string(),
    )(input)
}

pub fn number_literal(input: &str) -> IResult<&str, f64> {
    double(input)
}

/// Column name, bare or quoted (quotes needed for names with spaces)
pub fn column_ref(input: &str) -> IResult<&str, String> {
    alt((string_literal, identifier))(input)
}

/// `[a, "b c"]` or a single column
pub fn column_list(input: &str) -> IResult<&str, Vec<String>> {
    alt((
        delimited(
            ws(char('[')),
            separated_list0(ws(char(',')), ws(column_ref)),
            ws(char(']')),
        ),
        map(ws(column_ref), |c| vec![c]),
    ))(input)
}

/// Quoted date in any format the loader accepts
pub fn date_literal(input: &str) -> IResult<&str, NaiveDate> {
    map_opt(string_literal, |s| parse_date(&s))(input)
}

/// `name:` argument key
pub fn key<'a>(name: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    ws(terminated(tag(name), ws(char(':'))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier() {
        assert_eq!(identifier("Sub-Category rest"), Ok((" rest", "Sub-Category".to_string())));
        assert_eq!(identifier("_x1"), Ok(("", "_x1".to_string())));
        assert!(identifier("1abc").is_err());
    }

    #[test]
    fn test_string_literal() {
        assert_eq!(string_literal(r#""Order Date""#), Ok(("", "Order Date".to_string())));
        assert!(string_literal(r#""unterminated"#).is_err());
    }

    #[test]
    fn test_column_list() {
        let (_, cols) = column_list(r#"[Region, "Sub-Category"]"#).unwrap();
        assert_eq!(cols, vec!["Region", "Sub-Category"]);
        let (_, cols) = column_list("Sales").unwrap();
        assert_eq!(cols, vec!["Sales"]);
    }

    #[test]
    fn test_date_literal() {
        let (_, d) = date_literal(r#""2014-03-01""#).unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2014, 3, 1).unwrap());
        assert!(date_literal(r#""yesterday""#).is_err());
    }

    #[test]
    fn test_key() {
        assert_eq!(key("of")(" of : Sales"), Ok(("Sales", "of")));
    }
}
