/// Assessment subcommands: plant, hazard, translate, species.
pub mod assess;
/// `config check`.
pub mod config;
