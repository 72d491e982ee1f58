// Series spec parser
//
// series(column: "Elevation (m)", label: "Elevation", axis: secondary)
// series(keywords: ["wall loss", "worst"], optional: true)

use super::lexer::{bool_literal, identifier, string_literal, ws};
use crate::ir::AxisGroup;
use crate::resolve::FieldSpec;
use crate::series::ColumnSpec;
use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::char,
    combinator::{all_consuming, map, map_res},
    multi::separated_list0,
    sequence::{delimited, preceded},
    IResult,
};

#[derive(Debug, Clone, PartialEq)]
enum SeriesArg {
    Column(String),
    Keywords(Vec<String>),
    Label(String),
    Axis(AxisGroup),
    Optional(bool),
}

fn string_list(input: &str) -> IResult<&str, Vec<String>> {
    delimited(
        ws(char('[')),
        separated_list0(ws(char(',')), ws(string_literal)),
        ws(char(']')),
    )(input)
}

fn axis_group(input: &str) -> IResult<&str, AxisGroup> {
    map_res(alt((string_literal, identifier)), |s| s.parse::<AxisGroup>())(input)
}

fn series_arg(input: &str) -> IResult<&str, SeriesArg> {
    alt((
        map(preceded(ws(tag("column:")), ws(string_literal)), SeriesArg::Column),
        map(preceded(ws(tag("keywords:")), string_list), SeriesArg::Keywords),
        map(preceded(ws(tag("label:")), ws(string_literal)), SeriesArg::Label),
        map(preceded(ws(tag("axis:")), ws(axis_group)), SeriesArg::Axis),
        map(preceded(ws(tag("optional:")), ws(bool_literal)), SeriesArg::Optional),
    ))(input)
}

/// Parse a `series(...)` call into a column spec
pub fn parse_series_spec(input: &str) -> IResult<&str, ColumnSpec> {
    let (input, _) = ws(tag("series"))(input)?;
    let (input, _) = ws(char('('))(input)?;
    let (input, args) = separated_list0(ws(char(',')), series_arg)(input)?;
    let (input, _) = ws(char(')'))(input)?;

    let mut spec = ColumnSpec::default();
    for arg in args {
        match arg {
            SeriesArg::Column(name) => spec.field.name = Some(name),
            SeriesArg::Keywords(words) => {
                spec.field.keywords = words.into_iter().map(|w| w.to_lowercase()).collect()
            }
            SeriesArg::Label(label) => spec.label = Some(label),
            SeriesArg::Axis(axis) => spec.axis = axis,
            SeriesArg::Optional(flag) => spec.optional = flag,
        }
    }

    Ok((input, spec))
}

/// Parse a command-line series argument. Anything that is not a `series(...)`
/// call is taken as a plain column name.
pub fn parse_series_arg(input: &str) -> Result<ColumnSpec, String> {
    let is_call = input
        .trim_start()
        .strip_prefix("series")
        .is_some_and(|rest| rest.trim_start().starts_with('('));
    if !is_call {
        let name = input.trim();
        if name.is_empty() {
            return Err("empty series argument".to_string());
        }
        return Ok(ColumnSpec::new(FieldSpec::named(name)));
    }

    match all_consuming(parse_series_spec)(input) {
        Ok((_, spec)) if spec.field.name.is_none() && spec.field.keywords.is_empty() => {
            Err(format!("series needs a column or keywords: {}", input))
        }
        Ok((_, spec)) => Ok(spec),
        Err(e) => Err(format!("invalid series spec `{}`: {:?}", input, e)),
    }
}
