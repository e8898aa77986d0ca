pub mod helpers;

mod market_tests;
mod oracle_tests;
mod scheduler_tests;
mod tests;
