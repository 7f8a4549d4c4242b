pub mod checkouts;
pub mod gamification;
pub mod ledger;
pub mod transactions;
