pub mod import;
pub mod ledger;
pub mod lives;
pub mod repository;
