// Session codec
// Saves the board as a re-executable list of image directives and reads it back

use crate::board::LoadRequest;
use crate::error::BoardError;
use crate::store::ImageStore;
use log::{error, warn};
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Write the board to `path`, returning the number of images written
pub fn write_session(path: &Path, program: &str, store: &ImageStore) -> Result<usize, BoardError> {
    let io_failure = |source| BoardError::IoFailure {
        path: path.to_path_buf(),
        source,
    };
    let file = File::create(path).map_err(io_failure)?;
    let mut out = BufWriter::new(file);
    let written = write_to(&mut out, program, store).map_err(io_failure)?;
    out.flush().map_err(io_failure)?;
    Ok(written)
}

/// Serialize the board: a shebang line, then one directive per image in store order
pub fn write_to<W: Write>(out: &mut W, program: &str, store: &ImageStore) -> io::Result<usize> {
    writeln!(out, "#!{} -f", program)?;
    let mut written = 0;
    for (_, image) in store.iter() {
        let Some(path) = image.path().to_str() else {
            warn!(
                "{}: path is not valid UTF-8, not saved",
                image.path().display()
            );
            continue;
        };
        if path.contains('\n') {
            warn!("{:?}: path contains a newline, not saved", path);
            continue;
        }
        if path.contains('#') {
            warn!("{}: path contains '#', it will be cut short when read back", path);
        }
        let (x, y) = image.center();
        writeln!(
            out,
            "{} x={} y={} scale={:.6}",
            quote(path),
            x,
            y,
            image.scale()
        )?;
        written += 1;
    }
    Ok(written)
}

/// Read every directive from a session file.
///
/// Malformed lines are reported and skipped; only I/O failures abort.
pub fn read_session(path: &Path) -> Result<Vec<LoadRequest>, BoardError> {
    let file = File::open(path).map_err(|source| BoardError::IoFailure {
        path: path.to_path_buf(),
        source,
    })?;
    parse_session(BufReader::new(file)).map_err(|source| BoardError::IoFailure {
        path: path.to_path_buf(),
        source,
    })
}

pub fn parse_session<R: BufRead>(reader: R) -> io::Result<Vec<LoadRequest>> {
    let mut requests = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        match parse_directive(&line?, index + 1) {
            Ok(Some(request)) => requests.push(request),
            Ok(None) => {}
            Err(e) => error!("{}", e),
        }
    }
    Ok(requests)
}

/// Parse one line: a path token followed by `x=`, `y=` and `scale=` overrides.
///
/// Blank and comment-only lines yield `None`.
pub fn parse_directive(line: &str, line_no: usize) -> Result<Option<LoadRequest>, BoardError> {
    let content = line.split('#').next().unwrap_or_default();
    let mut tokens = tokenize(content).into_iter();
    let Some(path) = tokens.next() else {
        return Ok(None);
    };

    let mut request = LoadRequest::new(path);
    for token in tokens {
        let Some((key, value)) = token.split_once('=') else {
            continue;
        };
        let malformed = |reason: String| BoardError::MalformedDirective {
            line: line_no,
            token: token.clone(),
            reason,
        };
        match key {
            "x" => request.anchor.0 = parse_int(value).map_err(malformed)?,
            "y" => request.anchor.1 = parse_int(value).map_err(malformed)?,
            "scale" => request.scale = parse_scale(value).map_err(malformed)?,
            _ => {}
        }
    }
    Ok(Some(request))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quote {
    None,
    Single,
    Double,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenState {
    Normal,
    InSingle,
    InDouble,
    /// Next character is literal, then resume the given quoting
    Escaped(Quote),
}

impl TokenState {
    fn quoting(self) -> Quote {
        match self {
            TokenState::Normal => Quote::None,
            TokenState::InSingle => Quote::Single,
            TokenState::InDouble => Quote::Double,
            TokenState::Escaped(quote) => quote,
        }
    }

    fn resume(quote: Quote) -> Self {
        match quote {
            Quote::None => TokenState::Normal,
            Quote::Single => TokenState::InSingle,
            Quote::Double => TokenState::InDouble,
        }
    }
}

/// Split a line into shell-like words.
///
/// Quotes group whitespace and are dropped; a backslash makes the next character
/// literal in any state. Unterminated quotes run to the end of the line.
pub fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut started = false;
    let mut state = TokenState::Normal;

    for c in line.chars() {
        state = match (state, c) {
            (TokenState::Escaped(quote), c) => {
                current.push(c);
                TokenState::resume(quote)
            }
            (state, '\\') => {
                started = true;
                TokenState::Escaped(state.quoting())
            }
            (TokenState::Normal, c) if c.is_whitespace() => {
                if started {
                    tokens.push(std::mem::take(&mut current));
                    started = false;
                }
                TokenState::Normal
            }
            (TokenState::Normal, '\'') => {
                started = true;
                TokenState::InSingle
            }
            (TokenState::Normal, '"') => {
                started = true;
                TokenState::InDouble
            }
            (TokenState::InSingle, '\'') | (TokenState::InDouble, '"') => TokenState::Normal,
            (state, c) => {
                started = true;
                current.push(c);
                state
            }
        };
    }
    if started {
        tokens.push(current);
    }
    tokens
}

/// Single-quote a path so [`tokenize`] returns it unchanged
pub fn quote(path: &str) -> String {
    let mut quoted = String::with_capacity(path.len() + 2);
    quoted.push('\'');
    for c in path.chars() {
        if c == '\\' || c == '\'' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('\'');
    quoted
}

/// Signed decimal or `0x` hexadecimal integer that fits in an `i32`
fn parse_int(value: &str) -> Result<i32, String> {
    let (negative, digits) = match value.as_bytes().first() {
        Some(b'-') => (true, &value[1..]),
        Some(b'+') => (false, &value[1..]),
        _ => (false, value),
    };
    let (radix, digits) = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) => (16, hex),
        None => (10, digits),
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return Err(format!("`{}` is not an integer", value));
    }
    let magnitude =
        i64::from_str_radix(digits, radix).map_err(|_| format!("`{}` is out of range", value))?;
    let signed = if negative { -magnitude } else { magnitude };
    i32::try_from(signed).map_err(|_| format!("`{}` is out of range", value))
}

fn parse_scale(value: &str) -> Result<f32, String> {
    match value.parse::<f32>() {
        Ok(scale) if scale.is_finite() => Ok(scale),
        Ok(_) => Err(format!("`{}` is not a finite number", value)),
        Err(e) => Err(format!("`{}`: {}", value, e)),
    }
}
