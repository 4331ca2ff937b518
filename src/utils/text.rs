//! Line-oriented text parsing shared by the input and output file readers.
//!
//! Parameter-space files, simulator parameter files, catalogs and observed
//! data are all whitespace-separated text with comment markers, so they share
//! the same handful of nom parsers.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_till1},
    character::complete::{alpha1, alphanumeric1, not_line_ending, space0, space1},
    combinator::recognize,
    multi::{many0, separated_list1},
    number::complete::double,
    sequence::{delimited, pair, preceded},
    IResult, Parser,
};

/// Remove everything from the first comment marker onwards and trim the rest.
pub(crate) fn strip_comment<'a>(line: &'a str, markers: &[char]) -> &'a str {
    match line.find(|c: char| markers.contains(&c)) {
        Some(idx) => line[..idx].trim(),
        None => line.trim(),
    }
}

/// Parse an identifier (letters, digits and underscores, not starting with a digit)
pub(crate) fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0(alt((alphanumeric1, tag("_")))),
    ))
    .parse(input)
}

/// Parse a whitespace-separated row of numbers
pub(crate) fn number_row(input: &str) -> IResult<&str, Vec<f64>> {
    delimited(space0, separated_list1(space1, double), space0).parse(input)
}

/// Parse a `Key   value with spaces` line; the value runs to the end of the line.
pub(crate) fn key_value(input: &str) -> IResult<&str, (&str, &str)> {
    (
        preceded(space0, take_till1(|c: char| c.is_whitespace())),
        preceded(space1, not_line_ending),
    )
        .parse(input)
}

/// Parse a `name lower upper` parameter definition
pub(crate) fn bound_triple(input: &str) -> IResult<&str, (&str, f64, f64)> {
    (
        preceded(space0, identifier),
        preceded(space1, double),
        delimited(space1, double, space0),
    )
        .parse(input)
}

/// Turn a parser result into a plain result, requiring the whole input to be consumed.
pub(crate) fn complete<O>(result: IResult<&str, O>) -> Result<O, String> {
    match result {
        Ok((rest, out)) if rest.trim().is_empty() => Ok(out),
        Ok((rest, _)) => Err(format!("unexpected trailing text '{}'", rest.trim())),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            Err(format!("unexpected input '{}'", e.input))
        }
        Err(nom::Err::Incomplete(_)) => Err("incomplete input".to_string()),
    }
}
