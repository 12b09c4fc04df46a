// Command line interface module
// Handles parsing of command line arguments and the +XxY anchor directives

use crate::board::LoadRequest;
use clap::Parser;
use log::warn;
use std::path::PathBuf;
use std::process;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// refpin - A transparent always-on-top reference board for Wayland
#[derive(Parser, Debug)]
#[command(name = "refpin")]
#[command(about, long_about = None, disable_version_flag = true)]
pub struct Args {
    /// Print the version and exit
    #[arg(short = 'v', long)]
    pub version: bool,

    /// Session file loaded at startup and written by the save shortcut
    #[arg(short = 'f', long = "file", value_name = "SESSION")]
    pub session: Option<PathBuf>,

    /// Configuration file (default: $XDG_CONFIG_HOME/refpin/config.toml)
    #[arg(short = 'c', long, value_name = "CONFIG")]
    pub config: Option<PathBuf>,

    /// Disable GPU rendering and use CPU rendering only
    #[arg(long, default_value = "false")]
    pub cpu: bool,

    /// Images to open; `+<X>x<Y>` before a file centers it on (X, Y)
    #[arg(value_name = "FILE")]
    pub files: Vec<String>,
}

/// Parsed arguments with resolved load requests
#[derive(Debug)]
pub struct ParsedArgs {
    pub requests: Vec<LoadRequest>,
    pub session_file: Option<PathBuf>,
    pub config_path: Option<PathBuf>,
    /// Use GPU rendering (default true, set to false with --cpu)
    pub use_gpu: bool,
    /// Name the program was started as, used in saved sessions
    pub program: String,
}

impl ParsedArgs {
    fn from_args(args: Args, program: String) -> Self {
        Self {
            requests: load_requests(&args.files),
            session_file: args.session,
            config_path: args.config,
            use_gpu: !args.cpu, // GPU is default, --cpu disables it
            program,
        }
    }
}

/// Parse command line arguments, exiting on `-v`, `-h` and usage errors
pub fn parse_args() -> ParsedArgs {
    let program = std::env::args()
        .next()
        .unwrap_or_else(|| "refpin".to_string());

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            // help goes to stdout and is not an error
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            process::exit(code);
        }
    };

    if args.version {
        eprintln!("{} {}", program, VERSION);
        process::exit(0);
    }

    ParsedArgs::from_args(args, program)
}

/// Turn positional arguments into load requests.
///
/// An anchor applies to the next file only and resets to (0, 0) afterwards.
pub fn load_requests(files: &[String]) -> Vec<LoadRequest> {
    let mut anchor = (0, 0);
    let mut requests = Vec::new();
    for arg in files {
        if let Some(spec) = arg.strip_prefix('+') {
            if !parse_anchor(spec, &mut anchor) {
                warn!("{}: malformed anchor, expected +<X>x<Y>", arg);
            }
            continue;
        }
        requests.push(LoadRequest::new(arg).at(anchor.0, anchor.1));
        anchor = (0, 0);
    }
    requests
}

/// Scan `<X>x<Y>`, updating each coordinate that parses; true if both did
fn parse_anchor(spec: &str, anchor: &mut (i32, i32)) -> bool {
    let Some((x, rest)) = leading_int(spec) else {
        return false;
    };
    anchor.0 = x;
    let Some((y, _)) = rest.strip_prefix('x').and_then(leading_int) else {
        return false;
    };
    anchor.1 = y;
    true
}

/// Optional whitespace, optional sign, then decimal digits
fn leading_int(s: &str) -> Option<(i32, &str)> {
    let s = s.trim_start();
    let sign_len = usize::from(s.starts_with(['+', '-']));
    let digits = s[sign_len..]
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(s.len() - sign_len);
    if digits == 0 {
        return None;
    }
    let end = sign_len + digits;
    let value = s[..end].parse().ok()?;
    Some((value, &s[end..]))
}
