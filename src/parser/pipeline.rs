// Pipeline parser for the dashboard query language

use super::ast::Query;
use super::command::parse_stage;
use super::lexer::ws;
use crate::error::{DashError, Result};
use nom::{
    bytes::complete::tag,
    combinator::eof,
    error::{Error, ErrorKind},
    multi::separated_list0,
    IResult,
};

/// Parse a complete query
/// Format: stage | stage | ... with at most one terminal stage, placed last
pub fn parse_query(input: &str) -> IResult<&str, Query> {
    let (input, stages) = separated_list0(ws(tag("|")), parse_stage)(input)?;

    // Consume trailing whitespace and ensure end of input
    let (input, _) = ws(eof)(input)?;

    let terminals = stages.iter().filter(|s| s.is_terminal()).count();
    let terminal_last = stages.last().map(|s| s.is_terminal()).unwrap_or(false);
    if terminals > 1 || (terminals == 1 && !terminal_last) {
        return Err(nom::Err::Error(Error::new(input, ErrorKind::Verify)));
    }

    Ok((input, Query { stages }))
}

/// Parse query text, reporting failures as `DashError::Parse`
pub fn parse(text: &str) -> Result<Query> {
    match parse_query(text) {
        Ok((_, query)) => Ok(query),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            let consumed = text.len() - e.input.len();
            let reason = if e.code == ErrorKind::Verify && e.input.is_empty() {
                "a query may end with one view, sum, monthly, pivot or chart stage".to_string()
            } else {
                format!("unexpected input at offset {}: '{}'", consumed, snippet(e.input))
            };
            Err(DashError::Parse(reason))
        }
        Err(nom::Err::Incomplete(_)) => Err(DashError::Parse("incomplete query".to_string())),
    }
}

fn snippet(rest: &str) -> &str {
    match rest.char_indices().nth(24) {
        Some((idx, _)) => &rest[..idx],
        None => rest,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ast::Stage;

    #[test]
    fn test_parse_filter_then_view() {
        let result = parse_query(r#"region("East") | state() | view(category_sales)"#);
        assert!(result.is_ok());
        let (_, query) = result.unwrap();
        assert_eq!(query.stages.len(), 3);
        assert_eq!(query.terminal(), Some(&Stage::View("category_sales".to_string())));
    }

    #[test]
    fn test_parse_empty_query() {
        let (_, query) = parse_query("  ").unwrap();
        assert!(query.stages.is_empty());
        assert_eq!(query.terminal(), None);
    }

    #[test]
    fn test_parse_trailing_pipe() {
        assert!(parse_query("region(East) |").is_err());
    }

    #[test]
    fn test_two_terminals_rejected() {
        assert!(parse_query("view(data) | view(preview)").is_err());
    }

    #[test]
    fn test_terminal_must_be_last() {
        assert!(parse_query("sum(by: Region, of: Sales) | city()").is_err());
    }

    #[test]
    fn test_parse_reports_offset() {
        match parse("region(East) | nonsense()") {
            Err(DashError::Parse(msg)) => assert!(msg.contains("nonsense"), "{}", msg),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_reports_terminal_rule() {
        match parse("view(data) | view(sample)") {
            Err(DashError::Parse(msg)) => assert!(msg.contains("may end with one")),
            other => panic!("unexpected {:?}", other),
        }
    }
}
