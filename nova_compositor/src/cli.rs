//! Command line parsing.

use std::ffi::OsString;
use std::path::PathBuf;

use thiserror::Error;

/// Environment variable naming the display socket when `--display` is absent.
pub const DISPLAY_ENV: &str = "NOVA_COMPMGR_DISPLAY";

pub const USAGE: &str = "\
Usage: nova-compmgr [OPTION]...
Compositing manager for a display session.

  -c, --config FILE           read the configuration from FILE
  -r, --rendering-path DIR    search rendering backends in DIR
  -p, --plugins-path DIR      search plugins in DIR
  -d, --display SOCKET        connect to the display server at SOCKET
                              (default: $NOVA_COMPMGR_DISPLAY)
  -h, --help                  display this help and exit
  -v, --version               output version information and exit";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Options {
    pub config: Option<PathBuf>,
    pub rendering_path: Option<PathBuf>,
    pub plugins_path: Option<PathBuf>,
    pub display: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Version,
    Run(Options),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CliError {
    #[error("unrecognized option '{0}'")]
    UnknownOption(String),
    #[error("option '{0}' requires an argument")]
    MissingArgument(String),
    #[error("option '{0}' requires a non-empty argument")]
    EmptyArgument(String),
    #[error("unexpected argument '{0}'")]
    UnexpectedArgument(String),
}

/// Parses the arguments following the program name.
///
/// `--help` and `--version` win as soon as they are seen. Options accept both
/// `--name value` and `--name=value`.
pub fn parse<I>(args: I) -> Result<Command, CliError>
where
    I: IntoIterator<Item = OsString>,
{
    let mut options = Options::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        let arg = arg.to_string_lossy().into_owned();
        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) if flag.starts_with("--") => (flag.to_string(), Some(OsString::from(value))),
            _ => (arg.clone(), None),
        };

        let slot = match flag.as_str() {
            "-h" | "--help" => return Ok(Command::Help),
            "-v" | "--version" => return Ok(Command::Version),
            "-c" | "--config" => &mut options.config,
            "-r" | "--rendering-path" => &mut options.rendering_path,
            "-p" | "--plugins-path" => &mut options.plugins_path,
            "-d" | "--display" => &mut options.display,
            _ if flag.starts_with('-') => return Err(CliError::UnknownOption(flag.clone())),
            _ => return Err(CliError::UnexpectedArgument(flag.clone())),
        };
        let value = inline
            .or_else(|| args.next())
            .ok_or_else(|| CliError::MissingArgument(flag.clone()))?;
        if value.is_empty() {
            return Err(CliError::EmptyArgument(flag));
        }
        *slot = Some(PathBuf::from(value));
    }
    Ok(Command::Run(options))
}

impl Options {
    /// Socket of the display server: the flag, else [`DISPLAY_ENV`].
    pub fn display_socket(&self) -> Option<PathBuf> {
        self.display.clone().or_else(|| {
            std::env::var_os(DISPLAY_ENV)
                .filter(|value| !value.is_empty())
                .map(PathBuf::from)
        })
    }
}
