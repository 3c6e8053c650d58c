//! Command-line Error Types

use derive_more::{Display, Error};
use std::path::PathBuf;

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("could not load configuration")]
    Config,
    #[display("could not open comparison records")]
    Records,
    #[display("could not open file cache")]
    Cache,
    #[display("could not stage {} for comparison", _0.display())]
    Stage(#[error(not(source))] PathBuf),
    #[display("comparison failed")]
    Compare,
    #[display("could not write output")]
    Output,
}
