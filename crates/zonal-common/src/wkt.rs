//! Well-known text parsing and formatting.
//!
//! Accepts the geography WKT produced by the warehouse:
//! - `POINT (lon lat)`
//! - `MULTIPOINT ((lon lat), (lon lat))` or `MULTIPOINT (lon lat, lon lat)`
//! - `LINESTRING`, `MULTILINESTRING`
//! - `POLYGON ((ring), (hole))`, `MULTIPOLYGON (((ring)), ((ring)))`
//! - `GEOMETRYCOLLECTION (...)`
//!
//! Keywords are case-insensitive. A `Z`, `M` or `ZM` tag is accepted and any
//! ordinates after lon/lat are dropped.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::geometry::{Geometry, Position};

/// Errors that can occur when parsing WKT.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum WktError {
    /// Malformed WKT structure.
    #[error("Invalid WKT format: {0}")]
    InvalidWkt(String),

    /// A coordinate that is not a finite number.
    #[error("Invalid coordinate value: {0}")]
    InvalidCoordinate(String),

    /// Coordinate outside lon/lat bounds.
    #[error("Coordinate out of range: {0}")]
    OutOfRange(String),

    /// Geometry keyword we do not handle.
    #[error("Unsupported geometry type: {0}")]
    UnsupportedType(String),

    /// `EMPTY` geometries cannot be reduced over.
    #[error("Empty geometry: {0}")]
    EmptyGeometry(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Number(String),
    LParen,
    RParen,
    Comma,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Word(w) => write!(f, "'{}'", w),
            Token::Number(n) => write!(f, "'{}'", n),
            Token::LParen => write!(f, "'('"),
            Token::RParen => write!(f, "')'"),
            Token::Comma => write!(f, "','"),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, WktError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(start, ch)) = chars.peek() {
        match ch {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                tokens.push(Token::LParen);
                chars.next();
            }
            ')' => {
                tokens.push(Token::RParen);
                chars.next();
            }
            ',' => {
                tokens.push(Token::Comma);
                chars.next();
            }
            c if c.is_ascii_alphabetic() => {
                let mut end = start;
                while let Some(&(i, c)) = chars.peek() {
                    if !c.is_ascii_alphabetic() {
                        break;
                    }
                    end = i + c.len_utf8();
                    chars.next();
                }
                tokens.push(Token::Word(input[start..end].to_ascii_uppercase()));
            }
            c if c.is_ascii_digit() || c == '-' || c == '+' || c == '.' => {
                let mut end = start;
                while let Some(&(i, c)) = chars.peek() {
                    if !(c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E')) {
                        break;
                    }
                    end = i + c.len_utf8();
                    chars.next();
                }
                tokens.push(Token::Number(input[start..end].to_string()));
            }
            other => {
                return Err(WktError::InvalidWkt(format!(
                    "Unexpected character '{}' at position {}",
                    other, start
                )))
            }
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), WktError> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(WktError::InvalidWkt(format!(
                "Expected {}, got {}",
                expected, token
            ))),
            None => Err(WktError::InvalidWkt(format!(
                "Expected {}, got end of input",
                expected
            ))),
        }
    }

    fn expect_end(&self) -> Result<(), WktError> {
        match self.peek() {
            None => Ok(()),
            Some(token) => Err(WktError::InvalidWkt(format!(
                "Unexpected trailing {}",
                token
            ))),
        }
    }

    fn geometry(&mut self) -> Result<Geometry, WktError> {
        let kind = match self.next() {
            Some(Token::Word(w)) => w,
            Some(token) => {
                return Err(WktError::InvalidWkt(format!(
                    "Expected geometry type, got {}",
                    token
                )))
            }
            None => return Err(WktError::InvalidWkt("Empty input".to_string())),
        };

        // Optional dimension tag, then optional EMPTY
        if let Some(Token::Word(tag)) = self.peek() {
            if matches!(tag.as_str(), "Z" | "M" | "ZM") {
                self.pos += 1;
            }
        }
        if let Some(Token::Word(tag)) = self.peek() {
            if tag == "EMPTY" {
                return Err(WktError::EmptyGeometry(kind));
            }
            return Err(WktError::InvalidWkt(format!(
                "Unexpected keyword '{}' after {}",
                tag, kind
            )));
        }

        match kind.as_str() {
            "POINT" => {
                self.expect(Token::LParen)?;
                let position = self.position()?;
                self.expect(Token::RParen)?;
                Ok(Geometry::Point {
                    coordinates: position,
                })
            }
            "MULTIPOINT" => Ok(Geometry::MultiPoint {
                coordinates: self.list(Self::multipoint_member)?,
            }),
            "LINESTRING" => Ok(Geometry::LineString {
                coordinates: self.line()?,
            }),
            "MULTILINESTRING" => Ok(Geometry::MultiLineString {
                coordinates: self.list(Self::line)?,
            }),
            "POLYGON" => Ok(Geometry::Polygon {
                coordinates: self.rings()?,
            }),
            "MULTIPOLYGON" => Ok(Geometry::MultiPolygon {
                coordinates: self.list(Self::rings)?,
            }),
            "GEOMETRYCOLLECTION" => Ok(Geometry::GeometryCollection {
                geometries: self.list(Self::geometry)?,
            }),
            other => Err(WktError::UnsupportedType(other.to_string())),
        }
    }

    /// Parse `( item, item, ... )`.
    fn list<T>(
        &mut self,
        mut item: impl FnMut(&mut Self) -> Result<T, WktError>,
    ) -> Result<Vec<T>, WktError> {
        self.expect(Token::LParen)?;
        let mut items = vec![item(self)?];
        loop {
            match self.next() {
                Some(Token::Comma) => items.push(item(self)?),
                Some(Token::RParen) => return Ok(items),
                Some(token) => {
                    return Err(WktError::InvalidWkt(format!(
                        "Expected ',' or ')', got {}",
                        token
                    )))
                }
                None => {
                    return Err(WktError::InvalidWkt(
                        "Missing closing parenthesis".to_string(),
                    ))
                }
            }
        }
    }

    fn number(&mut self) -> Result<f64, WktError> {
        match self.next() {
            Some(Token::Number(raw)) => raw
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or(WktError::InvalidCoordinate(raw)),
            Some(Token::Word(w)) => Err(WktError::InvalidCoordinate(w)),
            Some(token) => Err(WktError::InvalidWkt(format!(
                "Expected coordinate, got {}",
                token
            ))),
            None => Err(WktError::InvalidWkt(
                "Expected coordinate, got end of input".to_string(),
            )),
        }
    }

    fn position(&mut self) -> Result<Position, WktError> {
        let lon = self.number()?;
        let lat = self.number()?;

        // Drop Z and M ordinates
        let mut extra = 0;
        while let Some(Token::Number(_)) = self.peek() {
            if extra == 2 {
                return Err(WktError::InvalidWkt(
                    "Too many ordinates in position".to_string(),
                ));
            }
            self.number()?;
            extra += 1;
        }

        validate_coordinates(lon, lat)?;
        Ok([lon, lat])
    }

    fn multipoint_member(&mut self) -> Result<Position, WktError> {
        if self.peek() == Some(&Token::LParen) {
            self.pos += 1;
            let position = self.position()?;
            self.expect(Token::RParen)?;
            Ok(position)
        } else {
            self.position()
        }
    }

    fn line(&mut self) -> Result<Vec<Position>, WktError> {
        let points = self.list(Self::position)?;
        if points.len() < 2 {
            return Err(WktError::InvalidWkt(
                "LineString must have at least 2 points".to_string(),
            ));
        }
        Ok(points)
    }

    fn ring(&mut self) -> Result<Vec<Position>, WktError> {
        let points = self.list(Self::position)?;
        if points.len() < 4 {
            return Err(WktError::InvalidWkt(
                "Polygon ring must have at least 4 points (including closing point)".to_string(),
            ));
        }
        if points.first() != points.last() {
            return Err(WktError::InvalidWkt("Polygon ring is not closed".to_string()));
        }
        Ok(points)
    }

    fn rings(&mut self) -> Result<Vec<Vec<Position>>, WktError> {
        self.list(Self::ring)
    }
}

/// Validate that coordinates are within lon/lat bounds.
fn validate_coordinates(lon: f64, lat: f64) -> Result<(), WktError> {
    if !(-180.0..=180.0).contains(&lon) {
        return Err(WktError::OutOfRange(format!(
            "Longitude {} is out of range [-180, 180]",
            lon
        )));
    }
    if !(-90.0..=90.0).contains(&lat) {
        return Err(WktError::OutOfRange(format!(
            "Latitude {} is out of range [-90, 90]",
            lat
        )));
    }
    Ok(())
}

/// Parse a WKT string into a geometry.
pub fn parse_wkt(input: &str) -> Result<Geometry, WktError> {
    let mut parser = Parser {
        tokens: tokenize(input)?,
        pos: 0,
    };
    let geometry = parser.geometry()?;
    parser.expect_end()?;
    Ok(geometry)
}

fn write_number(out: &mut String, v: f64) {
    use std::fmt::Write;
    // Avoid "-0" in output
    let v = if v == 0.0 { 0.0 } else { v };
    let _ = write!(out, "{}", v);
}

fn write_position(out: &mut String, p: &Position) {
    write_number(out, p[0]);
    out.push(' ');
    write_number(out, p[1]);
}

fn write_sequence(out: &mut String, positions: &[Position]) {
    out.push('(');
    for (i, p) in positions.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_position(out, p);
    }
    out.push(')');
}

fn write_parts<T>(out: &mut String, parts: &[T], mut part: impl FnMut(&mut String, &T)) {
    out.push('(');
    for (i, p) in parts.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        part(out, p);
    }
    out.push(')');
}

fn write_geometry(out: &mut String, geometry: &Geometry) {
    let keyword = match geometry {
        Geometry::Point { .. } => "POINT",
        Geometry::MultiPoint { .. } => "MULTIPOINT",
        Geometry::LineString { .. } => "LINESTRING",
        Geometry::MultiLineString { .. } => "MULTILINESTRING",
        Geometry::Polygon { .. } => "POLYGON",
        Geometry::MultiPolygon { .. } => "MULTIPOLYGON",
        Geometry::GeometryCollection { .. } => "GEOMETRYCOLLECTION",
    };
    out.push_str(keyword);

    let is_empty = match geometry {
        Geometry::Point { .. } => false,
        Geometry::MultiPoint { coordinates } | Geometry::LineString { coordinates } => {
            coordinates.is_empty()
        }
        Geometry::MultiLineString { coordinates } | Geometry::Polygon { coordinates } => {
            coordinates.is_empty()
        }
        Geometry::MultiPolygon { coordinates } => coordinates.is_empty(),
        Geometry::GeometryCollection { geometries } => geometries.is_empty(),
    };
    if is_empty {
        out.push_str(" EMPTY");
        return;
    }
    out.push(' ');

    match geometry {
        Geometry::Point { coordinates } => write_sequence(out, std::slice::from_ref(coordinates)),
        Geometry::MultiPoint { coordinates } => write_parts(out, coordinates, |out, p| {
            write_sequence(out, std::slice::from_ref(p))
        }),
        Geometry::LineString { coordinates } => write_sequence(out, coordinates),
        Geometry::MultiLineString { coordinates } | Geometry::Polygon { coordinates } => {
            write_parts(out, coordinates, |out, part| write_sequence(out, part))
        }
        Geometry::MultiPolygon { coordinates } => write_parts(out, coordinates, |out, polygon| {
            write_parts(out, polygon, |out, ring| write_sequence(out, ring))
        }),
        Geometry::GeometryCollection { geometries } => {
            write_parts(out, geometries, write_geometry)
        }
    }
}

/// Format a geometry as WKT, e.g. `POLYGON ((0 0, 1 0, 1 1, 0 0))`.
pub fn to_wkt(geometry: &Geometry) -> String {
    let mut out = String::new();
    write_geometry(&mut out, geometry);
    out
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&to_wkt(self))
    }
}

impl FromStr for Geometry {
    type Err = WktError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_wkt(s)
    }
}
