//! Presentation hints (size attributes, inline style declarations) to physical dimensions.

use cssparser::{ParseError, Parser, ParserInput, Token};

/// Pixels per inch used for every pixel-valued hint.
pub const PIXELS_PER_INCH: f64 = 96.0;

/// Resolved image size in inches.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Dimensions {
    pub width: Option<f64>,
    pub height: Option<f64>,
}

/// Width: `width` attribute, then style `width`, then style `max-width`.
/// Height: `height` attribute only; inline-style height is never consulted.
pub fn resolve_dimensions(
    width_attr: Option<&str>,
    height_attr: Option<&str>,
    style: Option<&str>,
) -> Dimensions {
    let declared = style.map(parse_style_dimensions).unwrap_or_default();

    let width_px = width_attr
        .and_then(parse_attr_pixels)
        .or(declared.width)
        .or(declared.max_width);
    let height_px = height_attr.and_then(parse_attr_pixels);

    Dimensions {
        width: width_px.map(pixels_to_inches),
        height: height_px.map(pixels_to_inches),
    }
}

pub fn pixels_to_inches(px: u32) -> f64 {
    f64::from(px) / PIXELS_PER_INCH
}

#[derive(Debug, Default, PartialEq)]
struct StyleDimensions {
    width: Option<u32>,
    max_width: Option<u32>,
}

/// Reads `width` and `max-width` out of an inline declaration list.
fn parse_style_dimensions(style: &str) -> StyleDimensions {
    let mut input = ParserInput::new(style);
    let mut parser = Parser::new(&mut input);
    let mut dims = StyleDimensions::default();

    loop {
        parser.skip_whitespace();
        if parser.is_exhausted() {
            break;
        }

        let result: Result<(), ParseError<'_, ()>> = parser.try_parse(|i| {
            let property = match i.next()? {
                Token::Ident(name) => name.to_ascii_lowercase(),
                _ => return Err(i.new_custom_error(())),
            };
            i.expect_colon()?;

            // First pixel length wins; `!important` and the like trail it.
            let mut px = None;
            loop {
                match i.next() {
                    Ok(Token::Semicolon) | Err(_) => break,
                    Ok(token) => px = px.or_else(|| pixel_length(token)),
                }
            }

            match property.as_str() {
                "width" => dims.width = px.or(dims.width),
                "max-width" => dims.max_width = px.or(dims.max_width),
                _ => {}
            }
            Ok(())
        });

        if result.is_err() {
            // Skip to the next declaration.
            loop {
                match parser.next() {
                    Ok(Token::Semicolon) | Err(_) => break,
                    Ok(_) => continue,
                }
            }
        }
    }

    dims
}

fn pixel_length(token: &Token) -> Option<u32> {
    match token {
        Token::Dimension {
            int_value: Some(value),
            unit,
            ..
        } if unit.eq_ignore_ascii_case("px") => u32::try_from(*value).ok(),
        _ => None,
    }
}

/// `192` or `192px`.
fn parse_attr_pixels(value: &str) -> Option<u32> {
    let value = value.trim();
    parse_px(value).or_else(|| value.parse().ok())
}

/// `192px` attribute form.
fn parse_px(value: &str) -> Option<u32> {
    value.strip_suffix("px")?.trim().parse().ok()
}
