pub mod checkouts;
pub mod gamification;
pub mod statements;
pub mod transactions;
