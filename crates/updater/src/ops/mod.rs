use clap::Subcommand;

pub mod update;
pub mod validate;

pub use update::Update;
pub use validate::Validate;

use crate::command_enum;

command_enum!((Update, Update), (Validate, Validate));
