use std::{io::IsTerminal as _, path::PathBuf};

use clap::{ColorChoice, Parser};
use dsconverge_core::Version;

#[derive(Parser, Debug, Clone)]
pub struct Options {
    #[arg(short, long, global = true, default_value = "false")]
    pub verbose: bool,

    #[arg(long, global = true, default_value_t = ColorChoice::Auto)]
    pub color: ColorChoice,

    /// The server document to configure
    #[arg(long, global = true, default_value = "dsconverge-server.json")]
    pub server: PathBuf,

    /// Where to record the objects under management
    #[arg(long, global = true, default_value = "dsconverge-state.json")]
    pub state: PathBuf,

    /// Validate against this server version instead of the one the server
    /// reports
    #[arg(long, global = true, value_name = "VERSION")]
    pub server_version: Option<Version>,
}

impl Options {
    pub fn use_color(&self) -> bool {
        match self.color {
            ColorChoice::Always => true,
            ColorChoice::Never => false,
            ColorChoice::Auto => std::io::stderr().is_terminal(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Parser, Debug)]
    #[command(no_binary_name = true)]
    struct Wrapper {
        #[command(flatten)]
        options: Options,
    }

    #[test]
    fn test_defaults() {
        let options = Wrapper::try_parse_from(Vec::<String>::new()).unwrap().options;
        assert!(!options.verbose);
        assert_eq!(options.server, PathBuf::from("dsconverge-server.json"));
        assert_eq!(options.state, PathBuf::from("dsconverge-state.json"));
        assert_eq!(options.server_version, None);
    }

    #[test]
    fn test_server_version() {
        let options = Wrapper::try_parse_from(["--server-version", "9.2.0.1"])
            .unwrap()
            .options;
        assert_eq!(options.server_version, Some(Version::new(9, 2, 0, 1)));
        assert!(Wrapper::try_parse_from(["--server-version", "nine"]).is_err());
    }
}
