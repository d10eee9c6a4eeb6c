mod ledger;
mod service;

pub use ledger::Adjusted;
