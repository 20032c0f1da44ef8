pub mod handlers;
pub mod ledger;
pub mod trend;
