use clap::{Parser, Subcommand, ValueEnum, ValueHint};
use rao_algo::ParametersFormat;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Set the logging level
    #[arg(long, default_value = "info")]
    pub log_level: tracing::Level,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Optimise the remedial actions of a case
    Optimize {
        /// Case file holding the catalog and the linearised grid (JSON)
        #[arg(long, value_hint = ValueHint::FilePath)]
        case: PathBuf,
        /// Parameters file (.toml or .json); defaults apply when omitted
        #[arg(long, value_hint = ValueHint::FilePath)]
        params: Option<PathBuf>,
        /// Where to write the JSON report
        #[arg(long, value_hint = ValueHint::FilePath)]
        out: PathBuf,
        /// Upper bound on parallel scenarios and leaves ("auto" = every core)
        #[arg(long, default_value = "auto")]
        threads: String,
    },
    /// Print or write the default parameters
    Params {
        /// Output file; stdout when omitted
        #[arg(long, value_hint = ValueHint::FilePath)]
        out: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = ParamsFormatArg::Toml)]
        format: ParamsFormatArg,
    },
    /// Check a case and its parameters without optimising
    Validate {
        #[arg(long, value_hint = ValueHint::FilePath)]
        case: PathBuf,
        #[arg(long, value_hint = ValueHint::FilePath)]
        params: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ParamsFormatArg {
    Toml,
    Json,
}

impl From<ParamsFormatArg> for ParametersFormat {
    fn from(value: ParamsFormatArg) -> Self {
        match value {
            ParamsFormatArg::Toml => ParametersFormat::Toml,
            ParamsFormatArg::Json => ParametersFormat::Json,
        }
    }
}
