//! Composite format templates with positional placeholders.
//!
//! A template such as `"{0} is {1,4:D2}"` is parsed once into literal and
//! placeholder segments, then rendered against an ordered argument slice.
//!
//! # Grammar
//!
//! ```text
//! template    := (literal | "{{" | "}}" | placeholder)*
//! placeholder := "{" index ("," alignment)? (":" spec)? "}"
//! index       := decimal digits
//! alignment   := optional '-' then decimal digits
//! ```
//!
//! Positive alignments right-align the rendered argument in a field of that
//! display width, negative alignments left-align it.
//!
//! # Invariants
//!
//! 1. Parsing is the only step that can reject a template's shape. Rendering
//!    fails only when a placeholder index has no matching argument.
//! 2. Rendering is single-pass: argument text is never re-scanned for
//!    placeholders.
//! 3. `FormatTemplate::source()` always returns the exact text that was parsed.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | `{` without `}` | Truncated placeholder | `UnclosedPlaceholder` |
//! | Lone `}` | Unescaped closing brace | `UnexpectedClosingBrace` |
//! | `{x}` | Non-numeric index | `InvalidIndex` |
//! | `{0,x}` | Non-numeric alignment | `InvalidAlignment` |
//! | `{3}` with 2 args | Missing argument | `IndexOutOfRange` |
//! | `{0:Q}` | Unknown specifier | Default rendering |

use core::fmt;

use unicode_width::UnicodeWidthStr;

use crate::culture::Culture;

/// Errors from parsing or rendering a [`FormatTemplate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// A `{` opened a placeholder that never closed.
    UnclosedPlaceholder { offset: usize },
    /// A `}` appeared outside a placeholder without being doubled.
    UnexpectedClosingBrace { offset: usize },
    /// The placeholder index is not a decimal number.
    InvalidIndex { offset: usize },
    /// The placeholder alignment is not a signed decimal number.
    InvalidAlignment { offset: usize },
    /// A placeholder referenced an argument that was not supplied.
    IndexOutOfRange { index: usize, len: usize },
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnclosedPlaceholder { offset } => {
                write!(f, "unclosed placeholder starting at byte {offset}")
            }
            Self::UnexpectedClosingBrace { offset } => {
                write!(f, "unexpected '}}' at byte {offset}")
            }
            Self::InvalidIndex { offset } => {
                write!(f, "invalid placeholder index at byte {offset}")
            }
            Self::InvalidAlignment { offset } => {
                write!(f, "invalid placeholder alignment at byte {offset}")
            }
            Self::IndexOutOfRange { index, len } => {
                write!(f, "placeholder {{{index}}} has no argument ({len} supplied)")
            }
        }
    }
}

impl std::error::Error for FormatError {}

/// A value that can be rendered into a template placeholder.
pub trait FormatArg {
    /// Append this value's text to `out`, honoring the placeholder's
    /// format specifier (if any) and the culture's separators.
    fn write_arg(&self, spec: Option<&str>, culture: &Culture, out: &mut String);
}

impl<T: FormatArg + ?Sized> FormatArg for &T {
    fn write_arg(&self, spec: Option<&str>, culture: &Culture, out: &mut String) {
        (**self).write_arg(spec, culture, out);
    }
}

impl FormatArg for i64 {
    fn write_arg(&self, spec: Option<&str>, culture: &Culture, out: &mut String) {
        out.push_str(&format_integer(*self, spec, culture));
    }
}

impl FormatArg for i32 {
    fn write_arg(&self, spec: Option<&str>, culture: &Culture, out: &mut String) {
        out.push_str(&format_integer(i64::from(*self), spec, culture));
    }
}

impl FormatArg for f64 {
    fn write_arg(&self, spec: Option<&str>, culture: &Culture, out: &mut String) {
        out.push_str(&format_float(*self, spec, culture));
    }
}

impl FormatArg for bool {
    fn write_arg(&self, _spec: Option<&str>, _culture: &Culture, out: &mut String) {
        out.push_str(if *self { "true" } else { "false" });
    }
}

impl FormatArg for str {
    fn write_arg(&self, _spec: Option<&str>, _culture: &Culture, out: &mut String) {
        out.push_str(self);
    }
}

impl FormatArg for String {
    fn write_arg(&self, _spec: Option<&str>, _culture: &Culture, out: &mut String) {
        out.push_str(self);
    }
}

/// One `{index,alignment:spec}` occurrence in a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    pub index: usize,
    pub alignment: Option<i32>,
    pub spec: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Slot(Placeholder),
}

/// A parsed composite format template.
///
/// # Example
///
/// ```
/// use tether_i18n::culture::Culture;
/// use tether_i18n::format::FormatTemplate;
///
/// let template = FormatTemplate::parse("{0} is {1}").unwrap();
/// let out = template.render(&["Alice", "30"], &Culture::invariant()).unwrap();
/// assert_eq!(out, "Alice is 30");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl FormatTemplate {
    /// Parse a template.
    ///
    /// # Errors
    ///
    /// Returns the first structural problem found, with its byte offset.
    pub fn parse(template: &str) -> Result<Self, FormatError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = template.char_indices().peekable();

        while let Some((offset, ch)) = chars.next() {
            match ch {
                '{' => {
                    if matches!(chars.peek(), Some(&(_, '{'))) {
                        chars.next();
                        literal.push('{');
                        continue;
                    }
                    let mut body = String::new();
                    let mut closed = false;
                    for (_, c) in chars.by_ref() {
                        if c == '}' {
                            closed = true;
                            break;
                        }
                        body.push(c);
                    }
                    if !closed {
                        return Err(FormatError::UnclosedPlaceholder { offset });
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Slot(parse_placeholder(&body, offset)?));
                }
                '}' => {
                    if matches!(chars.peek(), Some(&(_, '}'))) {
                        chars.next();
                        literal.push('}');
                    } else {
                        return Err(FormatError::UnexpectedClosingBrace { offset });
                    }
                }
                other => literal.push(other),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            source: template.to_string(),
            segments,
        })
    }

    /// The text this template was parsed from.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Placeholders in order of appearance.
    pub fn placeholders(&self) -> impl Iterator<Item = &Placeholder> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Slot(p) => Some(p),
            Segment::Literal(_) => None,
        })
    }

    /// Highest argument index referenced, if any placeholder exists.
    #[must_use]
    pub fn max_index(&self) -> Option<usize> {
        self.placeholders().map(|p| p.index).max()
    }

    /// Render the template against `args`.
    ///
    /// # Errors
    ///
    /// [`FormatError::IndexOutOfRange`] when a placeholder has no argument.
    pub fn render<A: FormatArg>(&self, args: &[A], culture: &Culture) -> Result<String, FormatError> {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Slot(p) => {
                    let arg = args.get(p.index).ok_or(FormatError::IndexOutOfRange {
                        index: p.index,
                        len: args.len(),
                    })?;
                    let mut piece = String::new();
                    arg.write_arg(p.spec.as_deref(), culture, &mut piece);
                    push_aligned(&mut out, &piece, p.alignment);
                }
            }
        }
        Ok(out)
    }
}

impl fmt::Display for FormatTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Parse and render in one step.
///
/// # Errors
///
/// Any parse or render error from [`FormatTemplate`].
pub fn format<A: FormatArg>(template: &str, args: &[A], culture: &Culture) -> Result<String, FormatError> {
    FormatTemplate::parse(template)?.render(args, culture)
}

fn parse_placeholder(body: &str, offset: usize) -> Result<Placeholder, FormatError> {
    let (head, spec) = match body.find(':') {
        Some(pos) => (&body[..pos], Some(&body[pos + 1..])),
        None => (body, None),
    };
    let (index, alignment) = match head.find(',') {
        Some(pos) => (&head[..pos], Some(&head[pos + 1..])),
        None => (head, None),
    };

    let index = index.trim();
    if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
        return Err(FormatError::InvalidIndex { offset });
    }
    let index = index
        .parse::<usize>()
        .map_err(|_| FormatError::InvalidIndex { offset })?;

    let alignment = match alignment {
        Some(raw) => Some(
            raw.trim()
                .parse::<i32>()
                .map_err(|_| FormatError::InvalidAlignment { offset })?,
        ),
        None => None,
    };

    Ok(Placeholder {
        index,
        alignment,
        spec: spec.filter(|s| !s.is_empty()).map(str::to_string),
    })
}

fn push_aligned(out: &mut String, piece: &str, alignment: Option<i32>) {
    let Some(alignment) = alignment else {
        out.push_str(piece);
        return;
    };
    let width = alignment.unsigned_abs() as usize;
    let pad = width.saturating_sub(piece.width());
    if alignment >= 0 {
        out.extend(std::iter::repeat_n(' ', pad));
        out.push_str(piece);
    } else {
        out.push_str(piece);
        out.extend(std::iter::repeat_n(' ', pad));
    }
}

// ---------------------------------------------------------------------------
// Numeric specifiers
// ---------------------------------------------------------------------------

/// Split `"N2"` into `('N', Some(2))`. Anything else is not a specifier.
fn parse_spec(spec: Option<&str>) -> Option<(char, Option<usize>)> {
    let spec = spec?.trim();
    let mut chars = spec.chars();
    let letter = chars.next().filter(char::is_ascii_alphabetic)?;
    let digits = chars.as_str();
    if digits.is_empty() {
        return Some((letter, None));
    }
    digits.parse::<usize>().ok().map(|p| (letter, Some(p)))
}

/// Render an integer with an optional numeric specifier.
#[must_use]
pub fn format_integer(value: i64, spec: Option<&str>, culture: &Culture) -> String {
    match parse_spec(spec) {
        Some(('D' | 'd', precision)) => {
            let digits = value.unsigned_abs().to_string();
            let width = precision.unwrap_or(0);
            let sign = if value < 0 { "-" } else { "" };
            format!("{sign}{digits:0>width$}")
        }
        Some(('X', precision)) => format!("{value:0>width$X}", width = precision.unwrap_or(0)),
        Some(('x', precision)) => format!("{value:0>width$x}", width = precision.unwrap_or(0)),
        Some(_) => format_float(value as f64, spec, culture),
        None => value.to_string(),
    }
}

/// Render a float with an optional numeric specifier.
#[must_use]
pub fn format_float(value: f64, spec: Option<&str>, culture: &Culture) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    match parse_spec(spec) {
        Some(('F' | 'f', precision)) => fixed(value, precision.unwrap_or(2), false, culture),
        Some(('N' | 'n', precision)) => fixed(value, precision.unwrap_or(2), true, culture),
        Some(('P' | 'p', precision)) => {
            let mut text = fixed(value * 100.0, precision.unwrap_or(2), true, culture);
            text.push('%');
            text
        }
        Some(('D' | 'd' | 'X' | 'x', _)) if value.fract() == 0.0 && value.abs() < 9.0e15 => {
            format_integer(value as i64, spec, culture)
        }
        _ => localize_decimal(&value.to_string(), culture),
    }
}

fn fixed(value: f64, decimals: usize, grouped: bool, culture: &Culture) -> String {
    let text = format!("{value:.decimals$}");
    let (sign, digits) = match text.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", text.as_str()),
    };
    let (int_part, frac_part) = match digits.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (digits, None),
    };

    let mut out = String::with_capacity(text.len() + 4);
    out.push_str(sign);
    if grouped {
        out.push_str(&group_digits(int_part, culture.group_separator()));
    } else {
        out.push_str(int_part);
    }
    if let Some(frac) = frac_part {
        out.push(culture.decimal_separator());
        out.push_str(frac);
    }
    out
}

fn group_digits(digits: &str, separator: char) -> String {
    let len = digits.len();
    let mut out = String::with_capacity(len + len / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(separator);
        }
        out.push(ch);
    }
    out
}

fn localize_decimal(text: &str, culture: &Culture) -> String {
    if culture.decimal_separator() == '.' {
        text.to_string()
    } else {
        text.replace('.', &culture.decimal_separator().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn inv() -> Culture {
        Culture::invariant()
    }

    #[test]
    fn positional_arguments() {
        let t = FormatTemplate::parse("{0} is {1}").unwrap();
        assert_eq!(t.render(&["Alice", "30"], &inv()).unwrap(), "Alice is 30");
    }

    #[test]
    fn arguments_can_repeat_and_reorder() {
        let t = FormatTemplate::parse("{1}-{0}-{1}").unwrap();
        assert_eq!(t.render(&[1_i64, 2], &inv()).unwrap(), "2-1-2");
        assert_eq!(t.max_index(), Some(1));
    }

    #[test]
    fn escaped_braces() {
        let t = FormatTemplate::parse("{{{0}}}").unwrap();
        assert_eq!(t.render(&["x"], &inv()).unwrap(), "{x}");
        let t = FormatTemplate::parse("no {{placeholders}}").unwrap();
        assert_eq!(t.placeholders().count(), 0);
        assert_eq!(t.render::<&str>(&[], &inv()).unwrap(), "no {placeholders}");
    }

    #[test]
    fn alignment_pads_by_display_width() {
        let t = FormatTemplate::parse("[{0,5}|{1,-4}]").unwrap();
        assert_eq!(t.render(&["ab", "c"], &inv()).unwrap(), "[   ab|c   ]");
        // Wide glyphs count as two columns.
        let t = FormatTemplate::parse("[{0,4}]").unwrap();
        assert_eq!(t.render(&["日本"], &inv()).unwrap(), "[日本]");
    }

    #[test]
    fn alignment_never_truncates() {
        let t = FormatTemplate::parse("{0,2}").unwrap();
        assert_eq!(t.render(&["abcdef"], &inv()).unwrap(), "abcdef");
    }

    #[test]
    fn parse_errors_carry_offsets() {
        assert_eq!(
            FormatTemplate::parse("ab {0"),
            Err(FormatError::UnclosedPlaceholder { offset: 3 })
        );
        assert_eq!(
            FormatTemplate::parse("a}b"),
            Err(FormatError::UnexpectedClosingBrace { offset: 1 })
        );
        assert_eq!(
            FormatTemplate::parse("{name}"),
            Err(FormatError::InvalidIndex { offset: 0 })
        );
        assert_eq!(
            FormatTemplate::parse("{}"),
            Err(FormatError::InvalidIndex { offset: 0 })
        );
        assert_eq!(
            FormatTemplate::parse("x{0,wide}"),
            Err(FormatError::InvalidAlignment { offset: 1 })
        );
    }

    #[test]
    fn missing_argument_is_render_error() {
        let t = FormatTemplate::parse("{0} {2}").unwrap();
        assert_eq!(
            t.render(&["a", "b"], &inv()),
            Err(FormatError::IndexOutOfRange { index: 2, len: 2 })
        );
    }

    #[test]
    fn integer_specifiers() {
        let c = inv();
        assert_eq!(format_integer(42, Some("D5"), &c), "00042");
        assert_eq!(format_integer(-42, Some("D4"), &c), "-0042");
        assert_eq!(format_integer(255, Some("X"), &c), "FF");
        assert_eq!(format_integer(255, Some("x4"), &c), "00ff");
        assert_eq!(format_integer(1234567, Some("N0"), &c), "1,234,567");
        assert_eq!(format_integer(3, Some("F1"), &c), "3.0");
        assert_eq!(format_integer(7, None, &c), "7");
    }

    #[test]
    fn float_specifiers() {
        let c = inv();
        assert_eq!(format_float(3.14159, Some("F2"), &c), "3.14");
        assert_eq!(format_float(3.0, Some("F"), &c), "3.00");
        assert_eq!(format_float(-1234.5, Some("N1"), &c), "-1,234.5");
        assert_eq!(format_float(0.125, Some("P1"), &c), "12.5%");
        assert_eq!(format_float(2.5, None, &c), "2.5");
        assert_eq!(format_float(12.0, Some("D3"), &c), "012");
    }

    #[test]
    fn unknown_specifier_falls_back() {
        let c = inv();
        assert_eq!(format_float(1.5, Some("Q"), &c), "1.5");
        assert_eq!(format_integer(9, Some("??"), &c), "9");
    }

    #[test]
    fn culture_separators_apply() {
        let de = Culture::new("de-DE");
        assert_eq!(format_float(1234.5, Some("N2"), &de), "1.234,50");
        assert_eq!(format_float(0.5, None, &de), "0,5");
        let fr = Culture::new("fr-FR");
        assert_eq!(format_integer(1_000_000, Some("N0"), &fr), "1 000 000");
    }

    #[test]
    fn spec_inside_template() {
        let t = FormatTemplate::parse("{0:F1} / {1:D3}").unwrap();
        let out = t.render(&[2.26_f64, 7.0], &inv()).unwrap();
        assert_eq!(out, "2.3 / 007");
    }

    #[test]
    fn source_is_preserved() {
        let t = FormatTemplate::parse("{0:N2} total").unwrap();
        assert_eq!(t.source(), "{0:N2} total");
        assert_eq!(t.to_string(), "{0:N2} total");
    }

    #[test]
    fn error_display() {
        let err = FormatError::IndexOutOfRange { index: 3, len: 1 };
        assert_eq!(err.to_string(), "placeholder {3} has no argument (1 supplied)");
    }

    proptest! {
        #[test]
        fn brace_free_text_renders_verbatim(text in "[^{}]{0,40}") {
            let t = FormatTemplate::parse(&text).unwrap();
            prop_assert_eq!(t.render::<&str>(&[], &Culture::invariant()).unwrap(), text);
        }

        #[test]
        fn sequential_placeholders_join_arguments(args in prop::collection::vec(-1000i64..1000, 1..8)) {
            let template: String = (0..args.len()).map(|i| format!("{{{i}}};")).collect();
            let t = FormatTemplate::parse(&template).unwrap();
            let expected: String = args.iter().map(|a| format!("{a};")).collect();
            prop_assert_eq!(t.render(&args, &Culture::invariant()).unwrap(), expected);
        }
    }
}
