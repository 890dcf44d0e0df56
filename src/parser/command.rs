// Stage parsers for the dashboard query language

use super::ast::{ChartStage, Stage};
use super::lexer::{column_list, column_ref, date_literal, identifier, key, number_literal, string_literal, ws};
use crate::chart::Role;
use crate::filter::Level;
use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::char,
    combinator::{map, map_opt, value},
    error::{Error, ErrorKind},
    multi::{many0, separated_list0},
    sequence::preceded,
    IResult,
};

fn verify_error(input: &str) -> nom::Err<Error<&str>> {
    nom::Err::Error(Error::new(input, ErrorKind::Verify))
}

/// Parse a date window
/// Format: dates(from: "2014-01-01", to: "2014-12-31"), either bound optional
pub fn parse_dates(input: &str) -> IResult<&str, Stage> {
    let (input, _) = ws(tag("dates"))(input)?;
    let (input, _) = ws(char('('))(input)?;

    let (input, args) = separated_list0(
        ws(char(',')),
        alt((
            map(preceded(key("from"), ws(date_literal)), |d| ("from", d)),
            map(preceded(key("to"), ws(date_literal)), |d| ("to", d)),
        )),
    )(input)?;

    let (input, _) = ws(char(')'))(input)?;

    let mut from = None;
    let mut to = None;
    for (k, date) in args {
        match k {
            "from" => from = Some(date),
            "to" => to = Some(date),
            _ => {}
        }
    }

    Ok((input, Stage::Dates { from, to }))
}

/// Parse a hierarchy selection
/// Format: region("East", West) / state(...) / city(); empty clears the level
pub fn parse_select(input: &str) -> IResult<&str, Stage> {
    let (input, level) = ws(alt((
        value(Level::Region, tag("region")),
        value(Level::State, tag("state")),
        value(Level::City, tag("city")),
    )))(input)?;
    let (input, _) = ws(char('('))(input)?;
    let (input, values) = separated_list0(ws(char(',')), ws(column_ref))(input)?;
    let (input, _) = ws(char(')'))(input)?;

    Ok((input, Stage::Select { level, values }))
}

/// Parse a column projection
/// Format: columns(Region, "Order Date", Sales)
pub fn parse_columns(input: &str) -> IResult<&str, Stage> {
    let (input, _) = ws(tag("columns"))(input)?;
    let (input, _) = ws(char('('))(input)?;
    let (input, names) = separated_list0(ws(char(',')), ws(column_ref))(input)?;
    let (input, _) = ws(char(')'))(input)?;

    if names.is_empty() {
        return Err(verify_error(input));
    }
    Ok((input, Stage::Columns(names)))
}

/// Parse a dashboard view
/// Format: view(category_sales)
pub fn parse_view(input: &str) -> IResult<&str, Stage> {
    let (input, _) = ws(tag("view"))(input)?;
    let (input, _) = ws(char('('))(input)?;
    let (input, name) = ws(identifier)(input)?;
    let (input, _) = ws(char(')'))(input)?;

    Ok((input, Stage::View(name)))
}

/// Parse a grouped sum
/// Format: sum(by: [Category, "Sub-Category"], of: Sales)
pub fn parse_sum(input: &str) -> IResult<&str, Stage> {
    let (input, _) = ws(tag("sum"))(input)?;
    let (input, _) = ws(char('('))(input)?;

    let (input, args) = separated_list0(
        ws(char(',')),
        alt((
            map(preceded(key("by"), column_list), |c| ("by", c)),
            map(preceded(key("of"), ws(column_ref)), |c| ("of", vec![c])),
        )),
    )(input)?;

    let (input, _) = ws(char(')'))(input)?;

    let mut by = Vec::new();
    let mut of = None;
    for (k, cols) in args {
        match k {
            "by" => by = cols,
            "of" => of = cols.into_iter().next(),
            _ => {}
        }
    }

    match of {
        Some(of) => Ok((input, Stage::Sum { by, of })),
        None => Err(verify_error(input)),
    }
}

/// Parse a monthly trend
/// Format: monthly(of: Sales)
pub fn parse_monthly(input: &str) -> IResult<&str, Stage> {
    let (input, _) = ws(tag("monthly"))(input)?;
    let (input, _) = ws(char('('))(input)?;
    let (input, of) = preceded(key("of"), ws(column_ref))(input)?;
    let (input, _) = ws(char(')'))(input)?;

    Ok((input, Stage::Monthly { of }))
}

/// Parse a pivot
/// Format: pivot(rows: "Sub-Category", cols: month, of: Sales)
pub fn parse_pivot(input: &str) -> IResult<&str, Stage> {
    let (input, _) = ws(tag("pivot"))(input)?;
    let (input, _) = ws(char('('))(input)?;

    let (input, args) = separated_list0(
        ws(char(',')),
        alt((
            map(preceded(key("rows"), ws(column_ref)), |c| ("rows", c)),
            map(preceded(key("cols"), ws(column_ref)), |c| ("cols", c)),
            map(preceded(key("of"), ws(column_ref)), |c| ("of", c)),
        )),
    )(input)?;

    let (input, _) = ws(char(')'))(input)?;

    let mut rows = None;
    let mut cols = None;
    let mut of = None;
    for (k, c) in args {
        match k {
            "rows" => rows = Some(c),
            "cols" => cols = Some(c),
            "of" => of = Some(c),
            _ => {}
        }
    }

    match (rows, cols, of) {
        (Some(rows), Some(cols), Some(of)) => Ok((input, Stage::Pivot { rows, cols, of })),
        _ => Err(verify_error(input)),
    }
}

#[derive(Debug)]
enum ChartArg {
    Bind(Role, Vec<String>),
    Title(String),
    Fill(String),
    Hole(f64),
    Bins(usize),
}

fn single_role<'a>(name: &'static str, role: Role) -> impl FnMut(&'a str) -> IResult<&'a str, ChartArg> {
    map(preceded(key(name), ws(column_ref)), move |c| ChartArg::Bind(role, vec![c]))
}

fn chart_arg(input: &str) -> IResult<&str, ChartArg> {
    alt((
        map(preceded(key("path"), column_list), |c| ChartArg::Bind(Role::Path, c)),
        map(preceded(key("columns"), column_list), |c| ChartArg::Bind(Role::Columns, c)),
        single_role("category", Role::Category),
        single_role("value", Role::Value),
        single_role("x", Role::X),
        single_role("y", Role::Y),
        single_role("size", Role::Size),
        single_role("color", Role::Color),
        map(preceded(key("title"), ws(string_literal)), ChartArg::Title),
        map(preceded(key("fill"), ws(string_literal)), ChartArg::Fill),
        map(preceded(key("hole"), ws(number_literal)), ChartArg::Hole),
        map(
            preceded(
                key("bins"),
                ws(map_opt(number_literal, |n| {
                    (n >= 1.0 && n.fract() == 0.0).then_some(n as usize)
                })),
            ),
            ChartArg::Bins,
        ),
    ))(input)
}

/// Parse a chart request
/// Format: chart(bar, category: Category, value: Sales, title: "Sales")
pub fn parse_chart(input: &str) -> IResult<&str, Stage> {
    let (input, _) = ws(tag("chart"))(input)?;
    let (input, _) = ws(char('('))(input)?;
    let (input, chart) = ws(identifier)(input)?;
    let (input, args) = many0(preceded(ws(char(',')), chart_arg))(input)?;
    let (input, _) = ws(char(')'))(input)?;

    let mut stage = ChartStage {
        chart,
        ..ChartStage::default()
    };
    for arg in args {
        match arg {
            ChartArg::Bind(role, cols) => {
                stage.bindings.retain(|(r, _)| *r != role);
                stage.bindings.push((role, cols));
            }
            ChartArg::Title(t) => stage.title = Some(t),
            ChartArg::Fill(f) => stage.fill = Some(f),
            ChartArg::Hole(h) => stage.hole = Some(h),
            ChartArg::Bins(b) => stage.bins = Some(b),
        }
    }

    Ok((input, Stage::Chart(stage)))
}

/// Parse any stage
pub fn parse_stage(input: &str) -> IResult<&str, Stage> {
    alt((
        parse_dates,
        parse_select,
        parse_columns,
        parse_view,
        parse_sum,
        parse_monthly,
        parse_pivot,
        parse_chart,
    ))(input)
}
