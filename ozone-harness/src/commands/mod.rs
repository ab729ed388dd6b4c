//! Command handlers -- one module per subcommand

pub mod apps;
pub mod check;
pub mod files;
pub mod up;
