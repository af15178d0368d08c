pub mod accounts;
pub mod cli;
pub mod runtime;
pub mod setup;
pub mod submitter;
pub mod surety;

pub use runtime::demo::{run_demo, DemoReport};
pub use submitter::{LocalSubmitter, Treasury};
pub use surety::FlightSurety;
