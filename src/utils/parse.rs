//! Small `nom` parsers shared by the text readers.
//!
//! Fit reports, QDP tables and spectral-fit files are all whitespace
//! delimited rows of a label and/or floating point numbers.

use nom::{
    branch::alt,
    bytes::complete::take_till1,
    character::complete::{space0, space1},
    combinator::{all_consuming, eof, peek},
    multi::{many0, many1},
    number::complete::double,
    sequence::{preceded, terminated},
    IResult, Parser,
};

/// A run of non-whitespace characters, after optional leading blanks.
pub fn token(input: &str) -> IResult<&str, &str> {
    preceded(space0, take_till1(char::is_whitespace)).parse(input)
}

/// A floating point number that fills a whole token.
pub fn number(input: &str) -> IResult<&str, f64> {
    preceded(space0, terminated(double, peek(alt((space1, eof))))).parse(input)
}

/// A single token that is exactly one number.
pub fn float(token: &str) -> Option<f64> {
    all_consuming(double::<&str, nom::error::Error<&str>>)
        .parse(token)
        .ok()
        .map(|(_, v)| v)
}

/// A row made only of numbers, e.g. a QDP data row.
pub fn numeric_row(line: &str) -> Option<Vec<f64>> {
    let mut parser = all_consuming(terminated(many1(number), space0));
    parser.parse(line.trim_end()).ok().map(|(_, values)| values)
}

/// A label followed by zero or more numbers, e.g. a fit-report row.
pub fn labelled_row(line: &str) -> Option<(&str, Vec<f64>)> {
    let mut parser = all_consuming(terminated((token, many0(number)), space0));
    parser.parse(line.trim_end()).ok().map(|(_, row)| row)
}
