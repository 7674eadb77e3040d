pub mod fixtures;
pub mod postgres;

#[allow(unused_imports)]
pub use fixtures::{PLACES_SQL, seeded_database};
#[allow(unused_imports)]
pub use postgres::postgres_or_skip;
