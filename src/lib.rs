pub mod analyze;
pub mod cli;
pub mod coverage;
pub mod detect;
pub mod diff;
pub mod error;
pub mod github;
pub mod ingest;
pub mod logging;
pub mod methods;
pub mod model;
pub mod parsers;
pub mod range;
pub mod report;
